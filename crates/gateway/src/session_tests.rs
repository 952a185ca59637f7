// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::credential::AccessCredential;
use crate::test_support::{jwt_expiring_in, pair, wait_until, Harness, MockApi, RenewalBehavior};

fn issue(token: &str) -> RenewalBehavior {
    RenewalBehavior::Issue { token: token.to_owned(), refresh_token: "r1".to_owned() }
}

#[tokio::test]
async fn driver_ignores_signal_for_credential_no_longer_due() -> anyhow::Result<()> {
    let mock = MockApi::start(None, issue(&jwt_expiring_in(3600, "n")), false).await?;
    let h = Harness::against(&mock, Some(pair(&jwt_expiring_in(3600, "fresh"), Some("r0"))))?;
    let shutdown = CancellationToken::new();
    spawn_renewal_driver(
        Arc::clone(&h.coordinator),
        Arc::clone(&h.scheduler),
        h.signals,
        shutdown.clone(),
    );

    // A signal computed from a credential that has since been replaced.
    h.scheduler.schedule(&AccessCredential::new(jwt_expiring_in(-1, "replaced")));
    wait_until(|| h.scheduler.is_armed()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(mock.renewals(), 0);
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn driver_collapses_signals_queued_during_renewal() -> anyhow::Result<()> {
    let fresh = jwt_expiring_in(3600, "fresh");
    let mock = MockApi::start(None, issue(&fresh), true).await?;
    let h = Harness::against(&mock, Some(pair(&jwt_expiring_in(-5, "stale"), Some("r0"))))?;
    let mut events = h.events.subscribe();
    let shutdown = CancellationToken::new();
    spawn_renewal_driver(
        Arc::clone(&h.coordinator),
        Arc::clone(&h.scheduler),
        h.signals,
        shutdown.clone(),
    );

    h.scheduler.on_resume();
    wait_until(|| mock.renewals() == 1).await?;
    // Still the stale credential in the store: queues a second request.
    h.scheduler.on_resume();
    mock.release_renewals(2);

    assert!(matches!(events.recv().await?, GatewayEvent::Renewed { .. }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(mock.renewals(), 1);
    assert_eq!(h.store.access_token(), Some(fresh));
    assert!(h.scheduler.is_armed());
    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn driver_stops_on_shutdown() -> anyhow::Result<()> {
    let mock = MockApi::start(None, issue(&jwt_expiring_in(3600, "n")), false).await?;
    let h = Harness::against(&mock, Some(pair(&jwt_expiring_in(-5, "stale"), Some("r0"))))?;
    let shutdown = CancellationToken::new();
    let driver = spawn_renewal_driver(
        Arc::clone(&h.coordinator),
        Arc::clone(&h.scheduler),
        h.signals,
        shutdown.clone(),
    );

    shutdown.cancel();
    driver.await?;
    h.scheduler.on_resume();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(mock.renewals(), 0);
    Ok(())
}
