//! Compute control-plane client trait

use crate::error::Result;
use crate::model::{BootRequest, Flavor, Image, NamedResource, ServerRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Where a floating IP attach draws its address from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatingIpSource {
    /// The provider's default allocation path
    Auto,
    /// A specific pre-existing floating IP
    Address(String),
    /// A new floating IP from the named pool
    Pool(String),
}

impl std::fmt::Display for FloatingIpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FloatingIpSource::Auto => write!(f, "default pool"),
            FloatingIpSource::Address(ip) => write!(f, "{}", ip),
            FloatingIpSource::Pool(pool) => write!(f, "pool {}", pool),
        }
    }
}

/// Compute control-plane abstraction
///
/// Implementations are thin transports: they issue one request per call and report what the
/// cloud said. Filtering, ambiguity checks and every create/delete decision belong to the
/// reconciler.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Returns the client name (e.g., "openstack")
    fn name(&self) -> &str;

    /// Find a server by its exact name
    async fn get_server_by_name(&self, name: &str) -> Result<Option<ServerRecord>>;

    /// Boot a server; the returned record is usually still building
    async fn create_server(&self, request: &BootRequest) -> Result<ServerRecord>;

    /// Request deletion of the named server
    async fn delete_server(&self, name: &str) -> Result<()>;

    /// Every image whose ID equals `reference` or whose name contains it
    async fn find_images(&self, reference: &str) -> Result<Vec<Image>>;

    /// A flavor by exact ID or name
    async fn get_flavor(&self, reference: &str) -> Result<Option<Flavor>>;

    /// The whole flavor catalog
    async fn list_flavors(&self) -> Result<Vec<Flavor>>;

    /// Every network with this name
    async fn find_networks(&self, name: &str) -> Result<Vec<NamedResource>>;

    /// Every port with this name
    async fn find_ports(&self, name: &str) -> Result<Vec<NamedResource>>;

    /// Attach a floating IP to the server and return the attached address
    async fn attach_floating_ip(&self, server_id: &str, source: &FloatingIpSource)
    -> Result<String>;

    /// Detach a floating IP from the server
    async fn detach_floating_ip(&self, server_id: &str, address: &str) -> Result<()>;
}
