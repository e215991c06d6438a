//! Commissions a simulated bridge end to end and watches one of its lights.
//!
//! Configuration comes from `MATTER_*` environment variables, logging from
//! `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credential_service::MemoryCredentialService;
use fabric_crypto::{CategoryId, CertificateChain, MemoryKeyStore, SecureKeyStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use matter_onboard::app::{
    Commissioner, CommissionerConfig, CommissioningEventHandler, CommissioningReport,
    CommissioningRequest, CommissioningState, DeviceTarget,
};
use matter_onboard::core::{AttributePath, CommissioningError, FabricIdentity, TlvValue};
use matter_onboard::logging::init_logging;
use matter_onboard::sim::{SimDevice, SimulatedController, DEFAULT_DISCRIMINATOR, DEFAULT_PASSCODE};

const FABRIC_ID: u64 = 0x0000_0000_0000_0001;
const GROUP_ID: &str = "demo-group";
const FIRST_NODE_ID: u64 = 0x0000_0000_0001_0001;
const ADMIN_CATEGORY: &str = "00010001";
const OPERATE_CATEGORY: &str = "00030001";
const ON_OFF_CLUSTER: u32 = 0x0006;

struct LogEvents;

#[async_trait]
impl CommissioningEventHandler for LogEvents {
    async fn on_state_changed(&self, attempt_id: Uuid, state: CommissioningState) {
        info!("[demo]: {attempt_id} -> {state}");
    }

    async fn on_complete(&self, report: &CommissioningReport) {
        info!(
            "[demo]: {} commissioned as node {} (rainmaker node: {})",
            report.device_name, report.node_id, report.is_rainmaker_node
        );
    }

    async fn on_failed(&self, attempt_id: Uuid, error: &CommissioningError) {
        error!("[demo]: {attempt_id} failed: {error}");
    }
}

/// Create the fabric's controller key and a self-signed root for it.
fn setup_fabric(keystore: &MemoryKeyStore) -> anyhow::Result<Arc<FabricIdentity>> {
    let public_key = keystore.generate_keypair(FABRIC_ID)?;
    let mut root_certificate = public_key.clone();
    root_certificate.extend(keystore.signer(FABRIC_ID)?.sign(&public_key)?);
    keystore.store_certificate_chain(
        FABRIC_ID,
        CertificateChain {
            root_certificate: root_certificate.clone(),
            intermediate_certificate: None,
            operational_certificate: None,
        },
    )?;

    Ok(Arc::new(FabricIdentity::new(
        FABRIC_ID,
        GROUP_ID,
        root_certificate,
        rand::random::<[u8; 16]>().to_vec(),
        CategoryId::from_code(ADMIN_CATEGORY)?,
        CategoryId::from_code(OPERATE_CATEGORY)?,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = init_logging("info");
    let config = CommissionerConfig::from_env()?;
    info!("[demo]: log filter {filter}, {config:?}");

    let keystore = Arc::new(MemoryKeyStore::new());
    let fabric = setup_fabric(&keystore)?;
    let credentials = Arc::new(MemoryCredentialService::new(FIRST_NODE_ID)?);
    let controller = Arc::new(SimulatedController::new(SimDevice::bridge())?);
    let commissioner = Commissioner::new(
        controller.clone(),
        credentials,
        keystore,
        Arc::new(LogEvents),
        config,
    );

    let report = commissioner
        .commission(
            CommissioningRequest {
                target: DeviceTarget::Discriminator(DEFAULT_DISCRIMINATOR),
                passcode: DEFAULT_PASSCODE,
                device_name: None,
                fabric,
            },
            CancellationToken::new(),
        )
        .await?;
    info!(
        "[demo]: endpoints {}",
        serde_json::to_string(&report.endpoints)?
    );
    info!(
        "[demo]: ACL now has {} entries (fabric index {})",
        report.acl.entries_written, report.acl.fabric_index
    );

    let on_off = AttributePath::new(2, ON_OFF_CLUSTER, 0x0000);
    let mut subscription = commissioner.subscribe(report.node_id, vec![on_off]).await?;
    let subscription_id = subscription.subscription_id();
    controller.push_report(on_off, TlvValue::Bool(true));
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(200), subscription.next_event()).await
    {
        info!("[demo]: subscription {subscription_id}: {event:?}");
    }

    commissioner.shutdown().await;
    Ok(())
}
