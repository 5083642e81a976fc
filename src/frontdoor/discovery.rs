//! Multi-wallet discovery descriptor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RelayConfig;

pub const DESCRIPTOR_VERSION: u32 = 1;

/// Announced on attach and whenever a page asks for providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Stable for the lifetime of one front door.
    pub provider_id: Uuid,
    pub name: String,
    pub icon: String,
    pub rdns: String,
    pub descriptor_version: u32,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, rdns: impl Into<String>) -> Self {
        Self {
            provider_id: Uuid::new_v4(),
            name: name.into(),
            icon: icon.into(),
            rdns: rdns.into(),
            descriptor_version: DESCRIPTOR_VERSION,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.provider_name.clone(),
            config.provider_icon.clone(),
            config.provider_rdns.clone(),
        )
    }
}
