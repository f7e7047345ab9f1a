mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{user, FakeServer, FRESH_ACCESS, INITIAL_ACCESS, VALID_REFRESH};
use loners_client::storage::TOKEN_KEY;
use loners_client::{
    ApiClient, ApiError, LocalStore, LogoutReason, SessionEvent, SessionStore, UnreadLedger,
};
use reqwest::StatusCode;

#[tokio::test]
async fn expired_access_token_is_refreshed_once_and_retried() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), "a-stale".into(), VALID_REFRESH.into())
        .unwrap();

    let unread = api.unread_notifications().await.unwrap();
    assert_eq!(unread.len(), 3);
    assert_eq!(server.state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.state.unread_calls.load(Ordering::SeqCst), 2);

    let current = session.current();
    assert_eq!(current.access_token.as_deref(), Some(FRESH_ACCESS));
    assert_eq!(current.refresh_token.as_deref(), Some(VALID_REFRESH));
    assert_eq!(current.user_id(), Some("u1"));
    assert_eq!(
        session.storage().get(TOKEN_KEY).as_deref(),
        Some(FRESH_ACCESS)
    );
}

#[tokio::test]
async fn failed_refresh_clears_session_and_surfaces_refresh_error() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), "a-stale".into(), "r-revoked".into())
        .unwrap();
    let mut events = session.subscribe();

    let err = api.unread_notifications().await.unwrap_err();
    match &err {
        ApiError::Status {
            status,
            path,
            message,
        } => {
            assert_eq!(*status, StatusCode::UNAUTHORIZED);
            assert_eq!(path, "/auth/refresh");
            assert_eq!(message.as_deref(), Some("Invalid refresh token"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!session.current().is_authenticated());
    assert!(session.current().user.is_none());
    assert!(session.storage().get(TOKEN_KEY).is_none());
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedOut {
            reason: LogoutReason::RefreshFailed
        }
    );
}

#[tokio::test]
async fn second_unauthorized_is_returned_without_another_refresh() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), INITIAL_ACCESS.into(), VALID_REFRESH.into())
        .unwrap();

    let err = api.chat_rooms().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(server.state.rooms_calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.state.refresh_calls.load(Ordering::SeqCst), 1);
    // the refresh itself succeeded, so the session survives
    assert!(session.current().is_authenticated());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_is_returned_as_is() {
    let server = FakeServer::start().await;
    let storage = Arc::new(LocalStore::in_memory());
    storage.set(TOKEN_KEY, "a-stale").unwrap();
    let session = Arc::new(SessionStore::restore(storage));
    let api = ApiClient::new(&server.config(), session.clone()).unwrap();

    let err = api.unread_notifications().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(server.state.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(server.state.unread_calls.load(Ordering::SeqCst), 1);
    assert!(session.current().is_authenticated());
}

#[tokio::test]
async fn anonymous_calls_carry_no_authorization_header() {
    let server = FakeServer::start().await;
    let (_session, api) = server.client();

    let events = api.nearby_events(48.85, 2.35).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(*server.state.seen_auth.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn login_installs_session_and_bearer() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();

    let bad = api.login("ana@example.com", "nope").await.unwrap_err();
    assert_eq!(bad.user_message(), "Identifiants invalides");
    assert!(!session.current().is_authenticated());

    let user = api.login("ana@example.com", "secret").await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(session.current().access_token.as_deref(), Some(INITIAL_ACCESS));

    api.nearby_events(0.0, 0.0).await.unwrap();
    assert_eq!(
        server.state.seen_auth.lock().unwrap().last().cloned().flatten(),
        Some(INITIAL_ACCESS.to_string())
    );

    api.logout().unwrap();
    assert!(!session.current().is_authenticated());
}

#[tokio::test]
async fn concurrent_stale_calls_each_refresh() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), "a-stale".into(), VALID_REFRESH.into())
        .unwrap();

    let (a, b) = tokio::join!(api.unread_notifications(), api.unread_notifications());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(server.state.refresh_calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.current().access_token.as_deref(), Some(FRESH_ACCESS));
}

#[tokio::test]
async fn profile_update_replaces_stored_user() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), INITIAL_ACCESS.into(), VALID_REFRESH.into())
        .unwrap();

    let changes = loners_protocol::UpdateProfileRequest {
        username: Some("ana2".into()),
        avatar_url: None,
    };
    let updated = api.update_profile(&changes).await.unwrap();
    assert_eq!(updated.username, "ana2");
    assert_eq!(
        session.current().user.as_ref().map(|u| u.username.as_str()),
        Some("ana2")
    );
    assert_eq!(session.current().access_token.as_deref(), Some(INITIAL_ACCESS));
}

#[tokio::test]
async fn ledger_snapshot_and_mark_read_against_server() {
    let server = FakeServer::start().await;
    let (session, api) = server.client();
    session
        .login(user("u1", "ana"), INITIAL_ACCESS.into(), VALID_REFRESH.into())
        .unwrap();

    let ledger = UnreadLedger::new(api);
    ledger.refresh().await.unwrap();
    assert_eq!(ledger.count("A"), 2);
    assert_eq!(ledger.count("B"), 1);
    assert_eq!(ledger.total(), 3);

    ledger.mark_read("A").await;
    assert_eq!(ledger.total(), 1);
    assert_eq!(*server.state.mark_read.lock().unwrap(), vec!["A".to_string()]);
}

#[tokio::test]
async fn direct_mark_read_reports_server_rejection() {
    let server = FakeServer::start().await;
    let storage = Arc::new(LocalStore::in_memory());
    storage.set(TOKEN_KEY, "a-stale").unwrap();
    let session = Arc::new(SessionStore::restore(storage));
    let api = ApiClient::new(&server.config(), session).unwrap();

    let err = api.mark_room_read("A").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(server.state.mark_read.lock().unwrap().is_empty());
}
