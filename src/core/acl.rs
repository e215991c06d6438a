//! Access control reconciliation.
//!
//! After the device joins the fabric its ACL holds the admin entry installed
//! with the NOC. Reconciliation reads that list, takes the admin entry's
//! fabric index and auth mode, appends an Operate entry for the installer's
//! category id and writes the whole list back in a single attribute write.
//! Existing entries are never modified or dropped.

use fabric_crypto::CategoryId;
use tracing::{info, warn};

use crate::core::cluster_client::ClusterClient;
use crate::core::clusters::{self, access_control};
use crate::core::controller::DeviceController;
use crate::core::error::CommissioningError;
use crate::core::session::DeviceSessionHandle;
use crate::core::types::{AccessControlEntry, AttributePath, AuthMode, EndpointId, Privilege};

/// What reconciliation did to the device ACL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclOutcome {
    pub fabric_index: u8,
    pub auth_mode: AuthMode,
    /// False when no admin entry existed and defaults were used.
    pub admin_entry_found: bool,
    /// False when an equivalent Operate entry was already present.
    pub appended: bool,
    pub entries_written: usize,
}

pub struct AccessControlReconciler<C: DeviceController> {
    client: ClusterClient<C>,
    require_admin_entry: bool,
}

impl<C: DeviceController> AccessControlReconciler<C> {
    /// With `require_admin_entry`, a missing admin entry fails reconciliation
    /// instead of writing a degraded entry.
    pub fn new(client: ClusterClient<C>, require_admin_entry: bool) -> Self {
        Self {
            client,
            require_admin_entry,
        }
    }

    pub async fn reconcile(
        &self,
        handle: &DeviceSessionHandle,
        endpoint: EndpointId,
        installer: CategoryId,
    ) -> Result<AclOutcome, CommissioningError> {
        let path = AttributePath::new(endpoint, access_control::CLUSTER_ID, access_control::ATTR_ACL);
        let mut entries = self.client.read_as(handle, path, clusters::decode_acl).await?;

        let admin = entries
            .iter()
            .find(|entry| entry.privilege == Privilege::ADMINISTER)
            .map(|entry| (entry.fabric_index, entry.auth_mode));

        let (fabric_index, auth_mode, admin_entry_found) = match admin {
            Some((fabric_index, auth_mode)) => (fabric_index, auth_mode, true),
            None if self.require_admin_entry => {
                return Err(CommissioningError::AdminEntryMissing);
            }
            None => {
                warn!(
                    "[reconcile]: Node {} has no admin ACL entry, falling back to fabric index 0 / auth mode 0",
                    handle.node_id()
                );
                (0, AuthMode(0), false)
            }
        };

        let subject = installer.subject();
        let already_present = entries.iter().any(|entry| {
            entry.privilege == Privilege::OPERATE
                && entry.fabric_index == fabric_index
                && entry.has_subject(subject)
        });
        if already_present {
            info!(
                "[reconcile]: Node {} already grants Operate to {installer}",
                handle.node_id()
            );
            return Ok(AclOutcome {
                fabric_index,
                auth_mode,
                admin_entry_found,
                appended: false,
                entries_written: 0,
            });
        }

        entries.push(AccessControlEntry {
            privilege: Privilege::OPERATE,
            auth_mode,
            subjects: Some(vec![subject]),
            targets: None,
            fabric_index,
        });
        self.client
            .write(handle, path, clusters::encode_acl(&entries))
            .await?;

        info!(
            "[reconcile]: Granted Operate to {installer} on node {} (fabric index {fabric_index}, {} entries)",
            handle.node_id(),
            entries.len()
        );
        Ok(AclOutcome {
            fabric_index,
            auth_mode,
            admin_entry_found,
            appended: true,
            entries_written: entries.len(),
        })
    }
}
