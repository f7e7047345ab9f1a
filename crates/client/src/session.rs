//! Session store
//!
//! One owned instance per client. The current [`Session`] is an immutable
//! snapshot behind an `ArcSwap`; every mutator builds a complete new snapshot
//! and swaps it in, so readers never see tokens and user out of step.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use loners_protocol::User;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::storage::{LocalStore, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    /// The refresh exchange failed; the UI should route to login
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    Refreshed,
    UserUpdated { user_id: String },
    LoggedOut { reason: LogoutReason },
}

pub struct SessionStore {
    current: ArcSwap<Session>,
    storage: Arc<LocalStore>,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes writers; readers go through `current` without locking
    write: Mutex<()>,
}

impl SessionStore {
    /// Restore whatever the previous run left in `storage`
    pub fn restore(storage: Arc<LocalStore>) -> Self {
        let user = storage
            .get(USER_KEY)
            .and_then(|raw| match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(
                        component = "session",
                        event = "session.restore.bad_user",
                        error = %err,
                        "Ignoring unreadable stored user"
                    );
                    None
                }
            });
        let session = Session {
            user,
            access_token: storage.get(TOKEN_KEY),
            refresh_token: storage.get(REFRESH_TOKEN_KEY),
        };
        let (events, _) = broadcast::channel(32);
        Self {
            current: ArcSwap::from_pointee(session),
            storage,
            events,
            write: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<Session> {
        self.current.load_full()
    }

    pub fn storage(&self) -> &Arc<LocalStore> {
        &self.storage
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Install a fresh session after login, signup or third-party sign-in
    pub fn login(
        &self,
        user: User,
        access_token: String,
        refresh_token: String,
    ) -> Result<(), StorageError> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.set_many(&[
            (TOKEN_KEY, access_token.clone()),
            (REFRESH_TOKEN_KEY, refresh_token.clone()),
            (USER_KEY, serde_json::to_string(&user)?),
        ])?;
        let user_id = user.id.clone();
        self.current.store(Arc::new(Session {
            user: Some(user),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
        }));
        info!(
            component = "session",
            event = "session.logged_in",
            user_id = %user_id,
        );
        let _ = self.events.send(SessionEvent::LoggedIn { user_id });
        Ok(())
    }

    /// Swap in a refreshed access token.
    ///
    /// Applies only while the session still holds `refresh_token`; returns
    /// false if the session was replaced or cleared in the meantime.
    pub fn refresh_access(
        &self,
        refresh_token: &str,
        access_token: String,
    ) -> Result<bool, StorageError> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        if current.refresh_token.as_deref() != Some(refresh_token) {
            return Ok(false);
        }
        self.current.store(Arc::new(Session {
            user: current.user.clone(),
            access_token: Some(access_token.clone()),
            refresh_token: current.refresh_token.clone(),
        }));
        let _ = self.events.send(SessionEvent::Refreshed);
        self.storage.set(TOKEN_KEY, access_token)?;
        Ok(true)
    }

    /// Replace the user after a profile edit, keeping both tokens
    pub fn update_user(&self, user: User) -> Result<(), StorageError> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        let user_id = user.id.clone();
        self.storage.set(USER_KEY, serde_json::to_string(&user)?)?;
        self.current.store(Arc::new(Session {
            user: Some(user),
            access_token: current.access_token.clone(),
            refresh_token: current.refresh_token.clone(),
        }));
        let _ = self.events.send(SessionEvent::UserUpdated { user_id });
        Ok(())
    }

    /// Clear user and both tokens, in memory first, then on disk
    pub fn logout(&self, reason: LogoutReason) -> Result<(), StorageError> {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.current.store(Arc::new(Session::default()));
        info!(
            component = "session",
            event = "session.logged_out",
            reason = ?reason,
        );
        let _ = self.events.send(SessionEvent::LoggedOut { reason });
        self.storage
            .remove_many(&[TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])
    }
}
