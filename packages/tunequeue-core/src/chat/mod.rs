//! Chat platform integration: the event stream that delivers chat messages
//! and stream status, the REST client used to subscribe and reply, and the
//! credential seam.

pub mod credentials;
pub mod event_stream;
pub mod helix;
pub mod replier;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use credentials::{AccountInfo, CredentialStore, Identity, InMemoryCredentialStore};
pub use event_stream::{EventStreamClient, EventStreamError, SubscriptionStatus};
pub use helix::{HelixClient, HelixError};
pub use replier::{ChatReplier, HelixReplier, ReplyTarget};
pub use supervisor::ChatSupervisor;
pub use types::{ChatEvent, ChatMessage};
