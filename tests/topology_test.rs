mod common;

use common::{Fixture, JOINED_NODE_ID};

use matter_onboard::core::{
    has_bridge, CommissioningError, ControllerError, TopologyDiscoverer, WalkAbort,
    DEFAULT_MAX_DEPTH,
};
use matter_onboard::sim::SimDevice;

async fn walk(
    device: SimDevice,
    max_depth: usize,
) -> Result<Vec<matter_onboard::core::DeviceMatterInfo>, CommissioningError> {
    let fixture = Fixture::new(device);
    let node_id = fixture.join().await;
    assert_eq!(node_id, JOINED_NODE_ID);
    let handle = fixture
        .registry()
        .resolve(node_id)
        .await
        .expect("Failed to resolve session");
    TopologyDiscoverer::new(fixture.client(), max_depth)
        .discover(&handle)
        .await
}

#[tokio::test]
async fn test_two_endpoint_device_yields_two_records() {
    let infos = walk(SimDevice::light(), DEFAULT_MAX_DEPTH)
        .await
        .expect("Topology walk failed");

    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].endpoint_id, 0);
    assert_eq!(infos[0].parts, vec![1]);
    assert_eq!(infos[1].endpoint_id, 1);
    assert!(infos[1].parts.is_empty());
    assert_eq!(infos[1].device_types, vec![0x0100]);
    assert!(infos[1].server_clusters.contains(&0x0006));
    assert!(!has_bridge(&infos));
}

#[tokio::test]
async fn test_endpoint_listing_itself_aborts_walk() {
    let err = walk(SimDevice::new().with_parts(0, vec![0]), DEFAULT_MAX_DEPTH)
        .await
        .unwrap_err();

    match err {
        CommissioningError::TopologyWalkAborted {
            endpoint: 0,
            reason: WalkAbort::Cycle { ancestor, path },
        } => {
            assert_eq!(ancestor, 0);
            assert_eq!(path, vec![0]);
        }
        other => panic!("Expected a cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_indirect_cycle_aborts_walk() {
    let device = SimDevice::new()
        .with_parts(0, vec![1])
        .with_parts(1, vec![2])
        .with_parts(2, vec![1]);
    let err = walk(device, DEFAULT_MAX_DEPTH).await.unwrap_err();

    assert!(matches!(
        err,
        CommissioningError::TopologyWalkAborted {
            endpoint: 2,
            reason: WalkAbort::Cycle { ancestor: 1, .. },
        }
    ));
}

#[tokio::test]
async fn test_depth_bound_triggers() {
    let device = SimDevice::new()
        .with_parts(0, vec![1])
        .with_parts(1, vec![2])
        .with_parts(2, vec![3])
        .with_parts(3, vec![4])
        .with_parts(4, vec![]);

    let err = walk(device.clone(), 2).await.unwrap_err();
    assert!(matches!(
        err,
        CommissioningError::TopologyWalkAborted {
            endpoint: 3,
            reason: WalkAbort::DepthExceeded { max_depth: 2 },
        }
    ));

    let infos = walk(device, 4).await.expect("Walk within bound failed");
    assert_eq!(infos.len(), 5);
}

#[tokio::test]
async fn test_endpoints_reached_twice_are_described_once() {
    let infos = walk(SimDevice::bridge(), DEFAULT_MAX_DEPTH)
        .await
        .expect("Topology walk failed");

    let ids: Vec<u16> = infos.iter().map(|info| info.endpoint_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert!(has_bridge(&infos));
}

#[tokio::test]
async fn test_read_failure_aborts_whole_walk() {
    let fixture = Fixture::new(SimDevice::bridge());
    let node_id = fixture.join().await;
    fixture.controller.fail_reads_on(3);
    let handle = fixture.registry().resolve(node_id).await.unwrap();

    let err = TopologyDiscoverer::new(fixture.client(), DEFAULT_MAX_DEPTH)
        .discover(&handle)
        .await
        .unwrap_err();

    match err {
        CommissioningError::TopologyWalkAborted {
            endpoint: 3,
            reason: WalkAbort::Read(inner),
        } => assert!(matches!(
            *inner,
            CommissioningError::AttributeIOError {
                source: ControllerError::Timeout,
                ..
            }
        )),
        other => panic!("Expected a read abort, got {other:?}"),
    }
}
