mod support;

use std::time::Duration;

use assert_matches::assert_matches;
use chat_sync::{AuthCredentials, ErrorKind, MirrorConfig, MirrorStore, PartialSnapshot};
use data_service_mock::{MockDataService, MockOp};
use pretty_assertions::assert_eq;
use sync_protocol::{CredentialState, ServiceError, Space};

use support::{loaded, wait_for_state, Harness};

#[tokio::test]
async fn mirror_loads_the_initial_snapshot() {
    let harness = Harness::signed_in();
    let mirror = harness.mirror();

    let state = loaded(&mirror).await;

    assert!(state.snapshot.initial_data_loaded);
    assert_eq!(state.snapshot.revision, 1);
    assert_eq!(state.snapshot.spaces.len(), 2);
    assert_eq!(
        state.snapshot.active_space.map(|space| space.id),
        Some("space-personal".to_string())
    );
    assert_eq!(state.snapshot.credentials.access_token.as_deref(), Some("access"));
    assert_eq!(state.snapshot.credentials.refresh_token, None);
    assert_eq!(state.error, None);
    assert!(!mirror.sign_in_required());
}

#[tokio::test]
async fn concurrent_get_state_from_two_mirrors_fetches_once() {
    let harness = Harness::with_data(
        MockDataService::fixture().with_delay(MockOp::FetchSpaces, Duration::from_millis(50)),
        CredentialState::new("access", "refresh", 4_000_000_000),
    );
    let first = harness.mirror();
    let second = harness.mirror();

    let (first_state, second_state) = tokio::join!(loaded(&first), loaded(&second));

    assert_eq!(harness.data.calls(MockOp::FetchSpaces), 1);
    assert_eq!(harness.coordinator.router().fetches_started(), 1);
    assert_eq!(first_state.snapshot, second_state.snapshot);
}

#[tokio::test]
async fn sync_state_reaches_every_mirror() {
    let harness = Harness::signed_in();
    let writer = harness.mirror();
    let observer = harness.mirror();
    loaded(&writer).await;
    loaded(&observer).await;

    let spaces = vec![Space::new("space-new", "Reading list")];
    writer
        .sync_state(PartialSnapshot::default().with_spaces(spaces.clone()))
        .await
        .expect("sync-state succeeds");

    let observed = wait_for_state(&observer, |state| state.snapshot.spaces == spaces).await;
    assert!(observed.snapshot.initial_data_loaded);
    assert_eq!(harness.coordinator.store().snapshot().spaces, spaces);
    assert_eq!(
        wait_for_state(&writer, |state| state.snapshot.spaces == spaces)
            .await
            .snapshot
            .revision,
        observed.snapshot.revision
    );
}

#[tokio::test]
async fn refresh_waits_for_the_pushed_snapshot() {
    let harness = Harness::signed_in();
    let mirror = harness.mirror();
    loaded(&mirror).await;

    harness.data.update(|data| data.spaces.push(Space::new("space-late", "Late")));
    mirror.refresh().await.expect("refresh succeeds");

    let snapshot = mirror.snapshot();
    assert_eq!(snapshot.spaces.len(), 3);
    assert_eq!(snapshot.revision, 2);
    assert!(!mirror.is_loading());
    assert_eq!(harness.data.calls(MockOp::FetchSpaces), 2);
}

#[tokio::test]
async fn refresh_failure_surfaces_as_mirror_error() {
    let harness = Harness::signed_in();
    let mirror = harness.mirror();
    loaded(&mirror).await;
    harness.data.fail_next(
        MockOp::FetchConversations,
        ServiceError::Network("connection reset".to_string()),
    );

    let error = mirror.refresh().await.expect_err("refresh fails");

    assert_eq!(error.kind, ErrorKind::TransientNetworkError);
    assert_eq!(mirror.error().map(|error| error.kind), Some(ErrorKind::TransientNetworkError));
    assert!(!mirror.sign_in_required());
    assert_eq!(mirror.snapshot().spaces.len(), 2, "previous snapshot is kept");
}

#[tokio::test]
async fn unauthenticated_fetch_requires_sign_in() {
    let harness = Harness::signed_in();
    harness.data.fail_next(
        MockOp::FetchUser,
        ServiceError::Unauthenticated("session revoked".to_string()),
    );
    let mirror = harness.mirror();

    let state = wait_for_state(&mirror, |state| state.sign_in_required).await;

    assert!(!state.is_loading);
    assert_eq!(harness.coordinator.vault().get(), CredentialState::default());
    assert!(!harness.coordinator.store().snapshot().initial_data_loaded);
}

#[tokio::test]
async fn sign_in_through_a_mirror_updates_every_mirror() {
    let harness = Harness::signed_out();
    let mirror = harness.mirror();
    let observer = harness.mirror();
    loaded(&mirror).await;
    loaded(&observer).await;

    let credentials = mirror
        .sign_in(AuthCredentials::new("ada@example.com", "correct horse"))
        .await
        .expect("sign-in succeeds")
        .expect("credentials returned");

    assert_eq!(credentials.access_token.as_deref(), Some("access-1"));
    assert_eq!(credentials.refresh_token, None);
    let observed = wait_for_state(&observer, |state| {
        state.snapshot.credentials.access_token.as_deref() == Some("access-1")
    })
    .await;
    assert_eq!(
        observed.snapshot.user.and_then(|user| user.email),
        Some("ada@example.com".to_string())
    );
}

#[tokio::test]
async fn wrong_password_is_a_validation_error() {
    let harness = Harness::signed_out();
    let mirror = harness.mirror();
    loaded(&mirror).await;

    let error = mirror
        .sign_in(AuthCredentials::new("ada@example.com", "battery staple"))
        .await
        .expect_err("sign-in rejected");

    assert_eq!(error.kind, ErrorKind::ValidationError);
    assert_eq!(mirror.error().map(|error| error.kind), Some(ErrorKind::ValidationError));
}

#[tokio::test]
async fn sign_out_resets_every_mirror() {
    let harness = Harness::signed_in();
    let mirror = harness.mirror();
    let observer = harness.mirror();
    loaded(&mirror).await;
    loaded(&observer).await;

    mirror.sign_out().await.expect("sign-out succeeds");

    let observed = wait_for_state(&observer, |state| !state.snapshot.initial_data_loaded).await;
    assert!(observed.snapshot.spaces.is_empty());
    assert_eq!(observed.snapshot.credentials, CredentialState::default());
    assert_eq!(harness.auth.revoked_tokens(), vec!["access".to_string()]);
}

#[tokio::test]
async fn sign_out_during_refresh_leaves_every_mirror_signed_out() {
    let harness = Harness::with_data(
        MockDataService::fixture().with_delay(MockOp::FetchSpaces, Duration::from_millis(300)),
        CredentialState::new("access", "refresh", 4_000_000_000),
    );
    let refresher = harness.mirror();
    let other = harness.mirror();
    loaded(&refresher).await;
    loaded(&other).await;

    let (refreshed, signed_out) = tokio::join!(refresher.refresh(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        other.sign_out().await
    });
    refreshed.expect("refresh settles");
    signed_out.expect("sign-out succeeds");

    let store_snapshot = harness.coordinator.store().snapshot();
    assert!(!store_snapshot.initial_data_loaded);
    assert!(store_snapshot.spaces.is_empty());
    assert_eq!(store_snapshot.user, None);
    let observed = wait_for_state(&refresher, |state| {
        state.snapshot.revision == store_snapshot.revision
    })
    .await;
    assert!(observed.snapshot.spaces.is_empty());
    assert_eq!(observed.snapshot.credentials, CredentialState::default());
}

#[tokio::test]
async fn reset_password_round_trips() {
    let harness = Harness::signed_out();
    let mirror = harness.mirror();

    mirror
        .reset_password("ada@example.com")
        .await
        .expect("reset accepted");

    assert_eq!(harness.auth.reset_requests(), vec!["ada@example.com".to_string()]);
}

#[tokio::test]
async fn closed_channel_fails_requests() {
    let (presentation, coordinator_side) = tokio::io::duplex(1024);
    drop(coordinator_side);
    let mirror = MirrorStore::connect(presentation);

    let error = mirror.sync_state(PartialSnapshot::default()).await.expect_err("channel is gone");

    assert_eq!(error.kind, ErrorKind::TransientNetworkError);
    let state = wait_for_state(&mirror, |state| !state.is_loading).await;
    assert_matches!(state.error, Some(_));
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (presentation, _silent_coordinator) = tokio::io::duplex(64 * 1024);
    let mirror = MirrorStore::connect_with_config(
        presentation,
        MirrorConfig::default().with_request_timeout(Duration::from_secs(5)),
    );

    let error = mirror.sign_out().await.expect_err("no reply arrives");

    assert_eq!(error.kind, ErrorKind::TransientNetworkError);
    assert!(error.message.contains("5000 ms"), "{}", error.message);
}

#[tokio::test]
async fn closing_the_mirror_fails_pending_and_later_requests() {
    let harness = Harness::signed_in();
    let mirror = harness.mirror();
    loaded(&mirror).await;

    mirror.close();

    let error = mirror.refresh().await.expect_err("mirror closed");
    assert_eq!(error.kind, ErrorKind::TransientNetworkError);
}
