//! Access tokens and the accounts they authenticate.
//!
//! Obtaining and refreshing tokens happens outside this crate. The store is
//! the seam: something external puts tokens in, the event-stream supervisors
//! read them before each connect and record what validation returned.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Which chat account a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Identity {
    /// The broadcaster's own account.
    Main,
    /// Optional separate account that reads and replies in the broadcaster's chat.
    Bot,
}

impl Identity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Identity::Main => "main",
            Identity::Bot => "bot",
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub identity: Identity,
    pub login: String,
    pub user_id: String,
    /// When the token stops being valid, if the platform reported it.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccountInfo {
    /// `true` if the token expires within `days` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, days: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - now <= chrono::Duration::days(days))
    }
}

/// Supplies tokens and remembers validated accounts.
pub trait CredentialStore: Send + Sync {
    /// Current access token for `identity`, if one is configured.
    fn token(&self, identity: Identity) -> Option<String>;

    /// Records the account a token validated as.
    fn record_account(&self, account: AccountInfo);

    /// Forgets a previously validated account (token rejected).
    fn forget_account(&self, identity: Identity);

    /// Last validated account for `identity`.
    fn account(&self, identity: Identity) -> Option<AccountInfo>;

    /// All validated accounts, main first.
    fn accounts(&self) -> Vec<AccountInfo> {
        [Identity::Main, Identity::Bot]
            .into_iter()
            .filter_map(|identity| self.account(identity))
            .collect()
    }
}

/// Process-local store, seeded from configuration.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    tokens: DashMap<Identity, String>,
    accounts: DashMap<Identity, AccountInfo>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or replaces the token for `identity`. Empty tokens are ignored.
    pub fn set_token(&self, identity: Identity, token: impl Into<String>) {
        let token = token.into();
        let token = token.trim().trim_start_matches("oauth:").to_string();
        if token.is_empty() {
            return;
        }
        self.tokens.insert(identity, token);
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn token(&self, identity: Identity) -> Option<String> {
        self.tokens.get(&identity).map(|t| t.value().clone())
    }

    fn record_account(&self, account: AccountInfo) {
        self.accounts.insert(account.identity, account);
    }

    fn forget_account(&self, identity: Identity) {
        self.accounts.remove(&identity);
    }

    fn account(&self, identity: Identity) -> Option<AccountInfo> {
        self.accounts.get(&identity).map(|a| a.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(identity: Identity, expires_at: Option<DateTime<Utc>>) -> AccountInfo {
        AccountInfo {
            identity,
            login: "streamer".into(),
            user_id: "42".into(),
            expires_at,
        }
    }

    #[test]
    fn tokens_are_normalized() {
        let store = InMemoryCredentialStore::new();
        store.set_token(Identity::Main, " oauth:abc ");
        store.set_token(Identity::Bot, "   ");
        assert_eq!(store.token(Identity::Main).as_deref(), Some("abc"));
        assert_eq!(store.token(Identity::Bot), None);
    }

    #[test]
    fn accounts_listed_main_first() {
        let store = InMemoryCredentialStore::new();
        store.record_account(account(Identity::Bot, None));
        store.record_account(account(Identity::Main, None));
        let identities: Vec<Identity> = store.accounts().iter().map(|a| a.identity).collect();
        assert_eq!(identities, vec![Identity::Main, Identity::Bot]);

        store.forget_account(Identity::Bot);
        assert_eq!(store.accounts().len(), 1);
    }

    #[test]
    fn expiry_window() {
        let now = Utc::now();
        let soon = account(Identity::Main, Some(now + chrono::Duration::days(3)));
        let later = account(Identity::Main, Some(now + chrono::Duration::days(40)));
        let never = account(Identity::Main, None);
        assert!(soon.expires_within(now, 15));
        assert!(!later.expires_within(now, 15));
        assert!(!never.expires_within(now, 15));
    }
}
