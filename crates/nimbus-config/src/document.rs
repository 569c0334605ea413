//! Spec document model
//!
//! ```yaml
//! cloud:
//!   cloud: devstack
//!   region: RegionOne
//!   default_floating_pool: public
//! server:
//!   name: web
//!   image: ubuntu-24.04
//!   flavor_ram: 1024
//! ```

use crate::error::{ConfigError, Result};
use nimbus_cloud::ServerSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_CLOUD: &str = "OS_CLOUD";
pub const ENV_REGION: &str = "OS_REGION_NAME";
pub const ENV_FLOATING_POOL: &str = "NIMBUS_FLOATING_POOL";

/// Which cloud to talk to. Credentials stay in clouds.yaml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Named cloud from clouds.yaml
    #[serde(default)]
    pub cloud: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// External network for auto-assigned floating IPs
    #[serde(default)]
    pub default_floating_pool: Option<String>,
}

impl CloudSettings {
    /// Environment variables take precedence over the document
    pub fn apply_env_overrides(&mut self) {
        if let Some(cloud) = non_empty_env(ENV_CLOUD) {
            self.cloud = Some(cloud);
        }
        if let Some(region) = non_empty_env(ENV_REGION) {
            self.region = Some(region);
        }
        if let Some(pool) = non_empty_env(ENV_FLOATING_POOL) {
            self.default_floating_pool = Some(pool);
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDocument {
    #[serde(default)]
    pub cloud: CloudSettings,

    pub server: ServerSpec,
}

impl SpecDocument {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Read a spec document and apply environment overrides
pub fn load_document(path: &Path) -> Result<SpecDocument> {
    tracing::debug!("Loading spec document {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let mut document: SpecDocument =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    document.cloud.apply_env_overrides();
    Ok(document)
}
