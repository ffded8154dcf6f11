//! Song search: request text in, one candidate track out.
//!
//! The [`SearchProvider`] trait is the seam the dispatcher depends on.
//! [`PlayerSearchProvider`] asks the player's own search endpoint and picks a
//! result from its shelf-structured response.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::player::client::{PlayerClient, PlayerError};
use crate::player::types::TrackInfo;
use crate::utils::parse_clock_duration;

// ─────────────────────────────────────────────────────────────────────────────
// Query parsing
// ─────────────────────────────────────────────────────────────────────────────

const REQUEST_PREFIX: &str = "!sr";

/// Turns request text into a search query.
///
/// Strips the request prefix and reduces watch links (`youtu.be/<id>`,
/// `...youtube.com/watch?v=<id>`) to the bare video id.
pub fn parse_search_query(text: &str) -> String {
    let text = text.trim();
    let query = text.strip_prefix(REQUEST_PREFIX).unwrap_or(text).trim();

    if let Some((_, rest)) = query.split_once("youtu.be/") {
        return take_id(rest);
    }
    if query.contains("youtube.com/") {
        if let Some((_, rest)) = query.split_once("v=") {
            return take_id(rest);
        }
    }
    query.to_string()
}

fn take_id(rest: &str) -> String {
    rest.split(|c: char| matches!(c, '?' | '&' | '#' | '/') || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider seam
// ─────────────────────────────────────────────────────────────────────────────

/// Why a search produced no usable track.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No results for \"{0}\"")]
    NotFound(String),

    #[error("Song duration {seconds}s is outside {min}..{max}s")]
    DurationOutOfBounds { seconds: u64, min: u64, max: u64 },

    #[error("Search backend failed: {0}")]
    Backend(#[from] PlayerError),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<TrackInfo, SearchError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Player search response schema
// ─────────────────────────────────────────────────────────────────────────────

const VIDEO_TYPE_ATV: &str = "MUSIC_VIDEO_TYPE_ATV";
const VIDEO_TYPE_OMV: &str = "MUSIC_VIDEO_TYPE_OMV";
const VIDEO_TYPE_UGC: &str = "MUSIC_VIDEO_TYPE_UGC";
const PAGE_TYPE_ARTIST: &str = "MUSIC_PAGE_TYPE_ARTIST";
const PAGE_TYPE_USER_CHANNEL: &str = "MUSIC_PAGE_TYPE_USER_CHANNEL";

fn is_playable_video_type(kind: &str) -> bool {
    matches!(kind, VIDEO_TYPE_ATV | VIDEO_TYPE_OMV | VIDEO_TYPE_UGC)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchResponse {
    contents: ResponseContents,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ResponseContents {
    tabbed_search_results_renderer: TabbedResults,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TabbedResults {
    tabs: Vec<Tab>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Tab {
    tab_renderer: TabRenderer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TabRenderer {
    content: TabContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TabContent {
    section_list_renderer: SectionList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SectionList {
    contents: Vec<Section>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Section {
    music_card_shelf_renderer: Option<CardShelf>,
    music_shelf_renderer: Option<Shelf>,
}

/// The promoted top result.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CardShelf {
    thumbnail: Thumbnail,
    title: Runs,
    subtitle: Runs,
}

/// The plain result list below the promoted result.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Shelf {
    contents: Vec<ShelfItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ShelfItem {
    music_responsive_list_item_renderer: ListItem,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListItem {
    thumbnail: Thumbnail,
    flex_columns: Vec<FlexColumn>,
    overlay: Option<Overlay>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FlexColumn {
    music_responsive_list_item_flex_column_renderer: FlexColumnRenderer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FlexColumnRenderer {
    text: Runs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Overlay {
    music_item_thumbnail_overlay_renderer: OverlayRenderer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OverlayRenderer {
    content: OverlayContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OverlayContent {
    music_play_button_renderer: PlayButton,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayButton {
    play_navigation_endpoint: NavigationEndpoint,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Thumbnail {
    music_thumbnail_renderer: ThumbnailRenderer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbnailRenderer {
    thumbnail: ThumbnailList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbnailList {
    thumbnails: Vec<ThumbnailUrl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbnailUrl {
    url: String,
}

impl Thumbnail {
    fn first_url(&self) -> String {
        self.music_thumbnail_renderer
            .thumbnail
            .thumbnails
            .first()
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Runs {
    runs: Vec<Run>,
}

impl Runs {
    fn last_text(&self) -> String {
        self.runs.last().map(|r| r.text.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Run {
    text: String,
    navigation_endpoint: Option<NavigationEndpoint>,
}

impl Run {
    fn watch(&self) -> Option<&WatchEndpoint> {
        self.navigation_endpoint.as_ref()?.watch_endpoint.as_ref()
    }

    fn page_type(&self) -> Option<&str> {
        self.navigation_endpoint.as_ref()?.page_type()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NavigationEndpoint {
    browse_endpoint: Option<BrowseEndpoint>,
    watch_endpoint: Option<WatchEndpoint>,
}

impl NavigationEndpoint {
    fn page_type(&self) -> Option<&str> {
        let config = self
            .browse_endpoint
            .as_ref()?
            .browse_endpoint_context_supported_configs
            .as_ref()?
            .browse_endpoint_context_music_config
            .as_ref()?;
        Some(config.page_type.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BrowseEndpoint {
    browse_endpoint_context_supported_configs: Option<BrowseConfigs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BrowseConfigs {
    browse_endpoint_context_music_config: Option<BrowseMusicConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BrowseMusicConfig {
    page_type: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WatchEndpoint {
    video_id: String,
    watch_endpoint_music_supported_configs: Option<WatchConfigs>,
}

impl WatchEndpoint {
    fn video_type(&self) -> Option<&str> {
        let config = self
            .watch_endpoint_music_supported_configs
            .as_ref()?
            .watch_endpoint_music_config
            .as_ref()?;
        Some(config.music_video_type.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WatchConfigs {
    watch_endpoint_music_config: Option<WatchMusicConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WatchMusicConfig {
    music_video_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Result extraction
// ─────────────────────────────────────────────────────────────────────────────

/// A search hit with its raw duration text (`"3:45"`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    track: TrackInfo,
    time_text: String,
}

impl Candidate {
    fn new(id: String, title: String, artist: String, image_url: String, time_text: String) -> Self {
        Self {
            track: TrackInfo {
                id,
                title,
                artist,
                duration_seconds: parse_clock_duration(&time_text).unwrap_or(0),
                image_url,
            },
            time_text,
        }
    }
}

fn from_card(card: &CardShelf) -> Option<Candidate> {
    let title_run = card.title.runs.iter().find(|run| run.watch().is_some())?;
    let video_id = title_run.watch()?.video_id.clone();
    let artist = card
        .subtitle
        .runs
        .iter()
        .find(|run| {
            matches!(
                run.page_type(),
                Some(PAGE_TYPE_ARTIST) | Some(PAGE_TYPE_USER_CHANNEL)
            )
        })
        .map(|run| run.text.clone())
        .unwrap_or_default();
    Some(Candidate::new(
        video_id,
        title_run.text.clone(),
        artist,
        card.thumbnail.first_url(),
        card.subtitle.last_text(),
    ))
}

fn from_list_item(item: &ListItem) -> Option<Candidate> {
    let media_type = item
        .overlay
        .as_ref()?
        .music_item_thumbnail_overlay_renderer
        .content
        .music_play_button_renderer
        .play_navigation_endpoint
        .watch_endpoint
        .as_ref()?
        .video_type()?;
    if !is_playable_video_type(media_type) {
        return None;
    }
    let expected_page = if media_type == VIDEO_TYPE_UGC {
        PAGE_TYPE_USER_CHANNEL
    } else {
        PAGE_TYPE_ARTIST
    };

    let mut title = String::new();
    let mut video_id = String::new();
    let mut artist = String::new();
    let mut time_text = String::new();
    for column in &item.flex_columns {
        let runs = &column.music_responsive_list_item_flex_column_renderer.text;
        for run in &runs.runs {
            if let Some(watch) = run.watch() {
                if watch.video_type().is_some_and(is_playable_video_type) {
                    title = run.text.clone();
                    video_id = watch.video_id.clone();
                }
            }
            if run.page_type() == Some(expected_page) {
                artist = run.text.clone();
                time_text = runs.last_text();
            }
        }
    }
    if video_id.is_empty() {
        return None;
    }
    Some(Candidate::new(
        video_id,
        title,
        artist,
        item.thumbnail.first_url(),
        time_text,
    ))
}

fn extract_candidates(response: &SearchResponse) -> Vec<Candidate> {
    let sections = response
        .contents
        .tabbed_search_results_renderer
        .tabs
        .iter()
        .flat_map(|tab| tab.tab_renderer.content.section_list_renderer.contents.iter());

    let mut candidates = Vec::new();
    for section in sections {
        if let Some(card) = &section.music_card_shelf_renderer {
            candidates.extend(from_card(card));
        }
        if let Some(shelf) = &section.music_shelf_renderer {
            candidates.extend(
                shelf
                    .contents
                    .iter()
                    .filter_map(|item| from_list_item(&item.music_responsive_list_item_renderer)),
            );
        }
    }
    candidates
}

/// Picks the hit whose id equals the query (a pasted link), else the first
/// one, then enforces the duration bounds. Unparsable durations pass.
fn select_candidate(
    candidates: Vec<Candidate>,
    query: &str,
    min_secs: u64,
    max_secs: u64,
) -> Result<TrackInfo, SearchError> {
    let position = candidates
        .iter()
        .position(|c| c.track.id == query)
        .unwrap_or(0);
    let chosen = candidates
        .into_iter()
        .nth(position)
        .ok_or_else(|| SearchError::NotFound(query.to_string()))?;

    if let Some(seconds) = parse_clock_duration(&chosen.time_text) {
        if seconds < min_secs || seconds > max_secs {
            return Err(SearchError::DurationOutOfBounds {
                seconds,
                min: min_secs,
                max: max_secs,
            });
        }
    }
    Ok(chosen.track)
}

// ─────────────────────────────────────────────────────────────────────────────
// Player-backed provider
// ─────────────────────────────────────────────────────────────────────────────

/// Searches through the player's own search endpoint.
pub struct PlayerSearchProvider {
    player: PlayerClient,
    min_duration_secs: u64,
    max_duration_secs: u64,
}

impl PlayerSearchProvider {
    pub fn new(player: PlayerClient, min_duration_secs: u64, max_duration_secs: u64) -> Self {
        Self {
            player,
            min_duration_secs,
            max_duration_secs,
        }
    }
}

#[async_trait]
impl SearchProvider for PlayerSearchProvider {
    async fn search(&self, query: &str) -> Result<TrackInfo, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::NotFound(String::new()));
        }
        let response: SearchResponse = self.player.search(query).await?;
        let candidates = extract_candidates(&response);
        log::debug!("[Search] {} candidates for \"{}\"", candidates.len(), query);
        select_candidate(
            candidates,
            query,
            self.min_duration_secs,
            self.max_duration_secs,
        )
    }
}
