mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Fixture;

use matter_onboard::core::clusters::{access_control, ROOT_ENDPOINT};
use matter_onboard::core::{AttributePath, CommissioningError, ControllerError, NodeId};
use matter_onboard::sim::SimDevice;

fn acl_path() -> AttributePath {
    AttributePath::new(ROOT_ENDPOINT, access_control::CLUSTER_ID, access_control::ATTR_ACL)
}

#[tokio::test]
async fn test_concurrent_resolve_shares_one_session() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    fixture
        .controller
        .set_connect_delay(Duration::from_millis(50));
    let registry = Arc::new(fixture.registry());

    let (a, b) = tokio::join!(
        {
            let registry = registry.clone();
            async move { registry.resolve(node_id).await }
        },
        {
            let registry = registry.clone();
            async move { registry.resolve(node_id).await }
        }
    );
    let (a, b) = (a.expect("First resolve failed"), b.expect("Second resolve failed"));

    assert_eq!(a.generation(), b.generation());
    assert_eq!(fixture.controller.connect_count(), 1);
    assert_eq!(fixture.controller.live_sessions(), 1);
}

#[tokio::test]
async fn test_concurrent_resolve_across_tasks() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    fixture
        .controller
        .set_connect_delay(Duration::from_millis(20));
    let registry = Arc::new(fixture.registry());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.resolve(node_id).await.map(|h| h.generation()) })
        })
        .collect();
    let mut generations = Vec::new();
    for task in tasks {
        generations.push(task.await.unwrap().unwrap());
    }

    assert!(generations.iter().all(|g| *g == generations[0]));
    assert_eq!(fixture.controller.connect_count(), 1);
}

#[tokio::test]
async fn test_unreachable_node_is_connection_unavailable() {
    let fixture = Fixture::new(SimDevice::new());
    let registry = fixture.registry();

    let err = registry.resolve(NodeId(0x99)).await.unwrap_err();

    assert!(matches!(
        err,
        CommissioningError::ConnectionUnavailable {
            node_id: NodeId(0x99),
            source: ControllerError::Unreachable(_),
        }
    ));
    assert!(registry.current(NodeId(0x99)).await.is_none());
}

#[tokio::test]
async fn test_failed_resolve_is_not_retried() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    fixture.controller.fail_next_connects(1);
    let registry = fixture.registry();

    assert!(registry.resolve(node_id).await.is_err());
    assert_eq!(fixture.controller.connect_count(), 0);

    // The caller decides to try again
    registry
        .resolve(node_id)
        .await
        .expect("Second resolve failed");
    assert_eq!(fixture.controller.connect_count(), 1);
}

#[tokio::test]
async fn test_lost_session_makes_handle_stale() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    let registry = fixture.registry();
    let client = fixture.client();
    let handle = registry.resolve(node_id).await.unwrap();
    client.read(&handle, acl_path()).await.expect("Read failed");

    fixture.controller.disconnect(node_id);
    let err = client.read(&handle, acl_path()).await.unwrap_err();

    assert!(matches!(err, CommissioningError::StaleHandle { node_id: n } if n == node_id));
    assert!(!handle.is_live());
    // Stale clones fail without reaching the controller
    assert!(matches!(
        client.read(&handle.clone(), acl_path()).await,
        Err(CommissioningError::StaleHandle { .. })
    ));

    let fresh = registry.resolve(node_id).await.expect("Re-resolve failed");
    assert!(fresh.is_live());
    assert!(fresh.generation() > handle.generation());
    assert_eq!(fixture.controller.connect_count(), 2);
    client.read(&fresh, acl_path()).await.expect("Read on fresh handle failed");
}

#[tokio::test]
async fn test_invalidate_releases_session() {
    let fixture = Fixture::new(SimDevice::new());
    let node_id = fixture.join().await;
    let registry = fixture.registry();
    let handle = registry.resolve(node_id).await.unwrap();

    assert_eq!(registry.tracked_nodes(), 1);
    registry.invalidate(node_id).await;

    assert!(!handle.is_live());
    assert_eq!(registry.tracked_nodes(), 0);
    assert!(registry.current(node_id).await.is_none());
    assert!(matches!(
        fixture.client().read(&handle, acl_path()).await,
        Err(CommissioningError::StaleHandle { .. })
    ));

    // Commands are handled in order, so the release precedes this connect
    registry.resolve(node_id).await.unwrap();
    assert_eq!(fixture.controller.live_sessions(), 1);
    assert_eq!(registry.tracked_nodes(), 1);
}
