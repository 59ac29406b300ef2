//! Legacy hardware export
//!
//! Older consumers read the whole record through a fixed projection rather
//! than a query. Only the fields below survive; anything else the backend
//! stores is dropped, and empty instance fields are omitted.

use hegel_common::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The exported shape of a hardware record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedHardware {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub arch: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub efi_boot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<ExportedInstance>,
    pub preinstalled_operating_system_version: Value,
    #[serde(deserialize_with = "null_as_default")]
    pub network_ports: Vec<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub plan_slug: String,
    #[serde(rename = "facility_code", deserialize_with = "null_as_default")]
    pub facility: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bonding_mode: i64,
}

/// The exported shape of the instance provisioned on a machine
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedInstance {
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_as_default")]
    pub allow_pxe: bool,
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_as_default")]
    pub rescue: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub ip_addresses: Vec<Value>,
    #[serde(
        rename = "operating_system_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub operating_system: Option<ExportedOperatingSystem>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub userdata: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub crypted_root_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "is_false", deserialize_with = "null_as_default")]
    pub network_ready: bool,
}

/// Operating system image installed on an instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportedOperatingSystem {
    #[serde(deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(deserialize_with = "null_as_default")]
    pub distro: String,
    #[serde(deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image_tag: String,
    #[serde(deserialize_with = "null_as_default")]
    pub os_slug: String,
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Project `record` through [`ExportedHardware`] and encode it as JSON
///
/// # Errors
/// Returns `Error::Query` if a known field has the wrong type.
pub fn export_hardware(record: &Value) -> Result<Vec<u8>> {
    let exported = ExportedHardware::deserialize(record)
        .map_err(|e| Error::query(format!("error in exporting hardware: {e}")))?;
    serde_json::to_vec(&exported).map_err(|e| Error::query(e.to_string()))
}
