//! Cluster, attribute and command ids used during commissioning, plus the
//! TLV shapes of the structures the pipeline reads and writes.

use crate::core::tlv::{TlvError, TlvValue};
use crate::core::types::{
    AccessControlEntry, AccessControlTarget, AuthMode, EndpointId, Privilege,
};

pub const ROOT_ENDPOINT: EndpointId = 0;

pub mod descriptor {
    use crate::core::types::{AttributeId, ClusterId};

    pub const CLUSTER_ID: ClusterId = 0x001D;
    pub const ATTR_DEVICE_TYPE_LIST: AttributeId = 0x0000;
    pub const ATTR_SERVER_LIST: AttributeId = 0x0001;
    pub const ATTR_CLIENT_LIST: AttributeId = 0x0002;
    pub const ATTR_PARTS_LIST: AttributeId = 0x0003;
}

pub mod access_control {
    use crate::core::types::{AttributeId, ClusterId};

    pub const CLUSTER_ID: ClusterId = 0x001F;
    pub const ATTR_ACL: AttributeId = 0x0000;
}

pub mod basic_information {
    use crate::core::types::{AttributeId, ClusterId};

    pub const CLUSTER_ID: ClusterId = 0x0028;
    pub const ATTR_PRODUCT_NAME: AttributeId = 0x0003;
}

pub mod operational_credentials {
    use crate::core::types::{AttributeId, ClusterId, CommandId};

    pub const CLUSTER_ID: ClusterId = 0x003E;
    pub const ATTR_CURRENT_FABRIC_INDEX: AttributeId = 0x0005;
    pub const CMD_REMOVE_FABRIC: CommandId = 0x0A;
}

/// Vendor controller cluster carried by controller-capable devices.
pub mod controller {
    use crate::core::types::{ClusterId, CommandId};

    pub const CLUSTER_ID: ClusterId = 0x131B_FC01;
    pub const CMD_APPEND_REFRESH_TOKEN: CommandId = 0;
    pub const CMD_RESET_REFRESH_TOKEN: CommandId = 1;
    pub const CMD_AUTHORIZE_DEVICE: CommandId = 2;
    pub const CMD_UPDATE_USER_NOC: CommandId = 3;
    pub const CMD_UPDATE_DEVICE_LIST: CommandId = 4;
}

pub mod device_types {
    /// Aggregator: the endpoint bridges non-Matter devices.
    pub const AGGREGATOR: u32 = 0x000E;
    pub const ROOT_NODE: u32 = 0x0016;
}

// AccessControlEntryStruct field tags
const TAG_PRIVILEGE: u8 = 1;
const TAG_AUTH_MODE: u8 = 2;
const TAG_SUBJECTS: u8 = 3;
const TAG_TARGETS: u8 = 4;
const TAG_FABRIC_INDEX: u8 = 0xFE;

// AccessControlTargetStruct field tags
const TAG_TARGET_CLUSTER: u8 = 0;
const TAG_TARGET_ENDPOINT: u8 = 1;
const TAG_TARGET_DEVICE_TYPE: u8 = 2;

fn nullable<T>(
    value: Option<&TlvValue>,
    decode: impl Fn(&TlvValue) -> Result<T, TlvError>,
) -> Result<Option<T>, TlvError> {
    match value {
        None | Some(TlvValue::Null) => Ok(None),
        Some(v) => decode(v).map(Some),
    }
}

fn decode_target(value: &TlvValue) -> Result<AccessControlTarget, TlvError> {
    Ok(AccessControlTarget {
        cluster: nullable(value.field(TAG_TARGET_CLUSTER)?, TlvValue::as_u32)?,
        endpoint: nullable(value.field(TAG_TARGET_ENDPOINT)?, TlvValue::as_u16)?,
        device_type: nullable(value.field(TAG_TARGET_DEVICE_TYPE)?, TlvValue::as_u32)?,
    })
}

fn encode_target(target: &AccessControlTarget) -> TlvValue {
    let opt = |v: Option<u64>| v.map(TlvValue::UInt).unwrap_or(TlvValue::Null);
    TlvValue::Struct(vec![
        (TAG_TARGET_CLUSTER, opt(target.cluster.map(u64::from))),
        (TAG_TARGET_ENDPOINT, opt(target.endpoint.map(u64::from))),
        (TAG_TARGET_DEVICE_TYPE, opt(target.device_type.map(u64::from))),
    ])
}

pub fn decode_acl_entry(value: &TlvValue) -> Result<AccessControlEntry, TlvError> {
    Ok(AccessControlEntry {
        privilege: Privilege(value.required(TAG_PRIVILEGE)?.as_u8()?),
        auth_mode: AuthMode(value.required(TAG_AUTH_MODE)?.as_u8()?),
        subjects: nullable(value.field(TAG_SUBJECTS)?, TlvValue::as_u64_list)?,
        targets: nullable(value.field(TAG_TARGETS)?, |v| {
            v.as_list()?.iter().map(decode_target).collect::<Result<Vec<_>, _>>()
        })?,
        fabric_index: value.required(TAG_FABRIC_INDEX)?.as_u8()?,
    })
}

pub fn encode_acl_entry(entry: &AccessControlEntry) -> TlvValue {
    let subjects = match &entry.subjects {
        Some(subjects) => TlvValue::List(subjects.iter().copied().map(TlvValue::UInt).collect()),
        None => TlvValue::Null,
    };
    let targets = match &entry.targets {
        Some(targets) => TlvValue::List(targets.iter().map(encode_target).collect()),
        None => TlvValue::Null,
    };
    TlvValue::Struct(vec![
        (TAG_PRIVILEGE, TlvValue::UInt(entry.privilege.0.into())),
        (TAG_AUTH_MODE, TlvValue::UInt(entry.auth_mode.0.into())),
        (TAG_SUBJECTS, subjects),
        (TAG_TARGETS, targets),
        (TAG_FABRIC_INDEX, TlvValue::UInt(entry.fabric_index.into())),
    ])
}

pub fn decode_acl(value: &TlvValue) -> Result<Vec<AccessControlEntry>, TlvError> {
    value.as_list()?.iter().map(decode_acl_entry).collect()
}

pub fn encode_acl(entries: &[AccessControlEntry]) -> TlvValue {
    TlvValue::List(entries.iter().map(encode_acl_entry).collect())
}

/// DeviceTypeList entries are `{0: deviceType, 1: revision}`; only the type is kept.
pub fn decode_device_types(value: &TlvValue) -> Result<Vec<u32>, TlvError> {
    value
        .as_list()?
        .iter()
        .map(|item| item.required(0)?.as_u32())
        .collect()
}

pub fn decode_parts(value: &TlvValue) -> Result<Vec<EndpointId>, TlvError> {
    value.as_list()?.iter().map(TlvValue::as_u16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_entry_codec_preserves_unknown_values() {
        let entries = vec![
            AccessControlEntry {
                privilege: Privilege::ADMINISTER,
                auth_mode: AuthMode::CASE,
                subjects: Some(vec![0xFFFF_FFFD_0001_0001, 0x1122]),
                targets: None,
                fabric_index: 2,
            },
            AccessControlEntry {
                privilege: Privilege(9),
                auth_mode: AuthMode::GROUP,
                subjects: None,
                targets: Some(vec![AccessControlTarget {
                    cluster: Some(0x0006),
                    endpoint: None,
                    device_type: Some(0x0100),
                }]),
                fabric_index: 1,
            },
        ];
        let decoded = decode_acl(&encode_acl(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_acl_entry_requires_fabric_index() {
        let value = TlvValue::Struct(vec![
            (TAG_PRIVILEGE, TlvValue::UInt(5)),
            (TAG_AUTH_MODE, TlvValue::UInt(2)),
        ]);
        assert_eq!(
            decode_acl_entry(&value),
            Err(TlvError::MissingField(TAG_FABRIC_INDEX))
        );
    }

    #[test]
    fn test_descriptor_decoders() {
        let types = TlvValue::List(vec![TlvValue::Struct(vec![
            (0, TlvValue::UInt(device_types::AGGREGATOR.into())),
            (1, TlvValue::UInt(1)),
        ])]);
        assert_eq!(decode_device_types(&types).unwrap(), vec![0x000E]);

        let parts = TlvValue::List(vec![TlvValue::UInt(1), TlvValue::UInt(2)]);
        assert_eq!(decode_parts(&parts).unwrap(), vec![1, 2]);
        assert!(decode_parts(&TlvValue::List(vec![TlvValue::UInt(70_000)])).is_err());
    }
}
