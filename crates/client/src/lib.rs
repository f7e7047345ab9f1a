//! Loners client
//!
//! Everything a Loners front end needs below the UI: an owned session store,
//! an HTTP client that refreshes expired access tokens once per call, the
//! per-room unread ledger, and the Socket.IO push connection that feeds it.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod notifications;
pub mod push;
pub mod session;
pub mod storage;

pub use chat::{should_alert, ChatRoom};
pub use config::{ClientConfig, ConfigOverrides};
pub use error::{ApiError, ConfigError, StorageError};
pub use http::{ApiClient, ApiRequest};
pub use notifications::UnreadLedger;
pub use push::{ConnectionState, PushClient, Subscription};
pub use session::{LogoutReason, Session, SessionEvent, SessionStore};
pub use storage::LocalStore;
