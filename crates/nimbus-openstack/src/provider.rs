//! OpenStack compute client implementation

use crate::cli::{ListedResource, OpenStackCli};
use crate::error::OpenStackError;
use async_trait::async_trait;
use nimbus_cloud::{
    BootRequest, CloudError, ComputeClient, Flavor, FloatingIpSource, Image, NamedResource,
    ResolvedAttachment, ResolvedBootSource, ServerRecord,
};
use std::collections::BTreeSet;
use std::io::Write;

type Result<T> = std::result::Result<T, CloudError>;

/// [`ComputeClient`] backed by the `openstack` CLI
pub struct OpenStackCompute {
    cli: OpenStackCli,
    default_pool: Option<String>,
}

impl OpenStackCompute {
    pub fn new(cloud: Option<String>, region: Option<String>) -> Self {
        Self {
            cli: OpenStackCli::new(cloud, region),
            default_pool: None,
        }
    }

    /// External network used for auto-assigned floating IPs
    pub fn with_default_pool(mut self, pool: Option<String>) -> Self {
        self.default_pool = pool;
        self
    }

    pub async fn check_installed(&self) -> Result<()> {
        Ok(self.cli.check_installed().await?)
    }

    async fn floating_addresses(&self, server_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .cli
            .floating_ips_of_server(server_id)
            .await?
            .into_iter()
            .map(|ip| ip.floating_ip_address)
            .collect())
    }

    /// Pool for auto-assign: the configured default, else the only external network
    async fn auto_pool(&self) -> Result<String> {
        if let Some(pool) = &self.default_pool {
            return Ok(pool.clone());
        }
        let networks = self.cli.list_external_networks().await?;
        let pool = pick_external_network(&networks)?;
        tracing::debug!("Auto-assigning from external network {}", pool);
        Ok(pool)
    }

    /// Reuse an unattached floating IP from `pool`, or allocate a new one
    async fn allocate_from(&self, pool: &str) -> Result<String> {
        if let Some(free) = self.cli.free_floating_ips(pool).await?.into_iter().next() {
            tracing::debug!("Reusing floating IP {} from {}", free.floating_ip_address, pool);
            return Ok(free.floating_ip_address);
        }
        let created = self.cli.create_floating_ip(pool).await?;
        tracing::debug!("Allocated floating IP {} from {}", created.floating_ip_address, pool);
        Ok(created.floating_ip_address)
    }
}

fn pick_external_network(networks: &[ListedResource]) -> crate::error::Result<String> {
    match networks {
        [only] => Ok(only.id.clone()),
        [] => Err(OpenStackError::NoExternalNetwork(
            "none is visible; set default_floating_pool".to_string(),
        )),
        many => {
            let names: Vec<&str> = many.iter().map(|n| n.name.as_str()).collect();
            Err(OpenStackError::NoExternalNetwork(format!(
                "several candidates ({}); set default_floating_pool",
                names.join(", ")
            )))
        }
    }
}

/// Arguments for `server create`, minus the command itself
pub fn boot_args(request: &BootRequest, userdata_path: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = vec!["--flavor".into(), request.flavor_id.clone()];

    match &request.source {
        ResolvedBootSource::Image { image_id } => {
            args.push("--image".into());
            args.push(image_id.clone());
        }
        ResolvedBootSource::Volume {
            volume_id,
            delete_on_termination,
        } => {
            args.push("--block-device".into());
            args.push(format!(
                "uuid={},source_type=volume,destination_type=volume,boot_index=0,delete_on_termination={}",
                volume_id, delete_on_termination
            ));
        }
    }

    for nic in &request.nics {
        args.push("--nic".into());
        args.push(match nic {
            ResolvedAttachment::NetId(id) => format!("net-id={}", id),
            ResolvedAttachment::PortId(id) => format!("port-id={}", id),
        });
    }

    if let Some(key) = &request.key_name {
        args.push("--key-name".into());
        args.push(key.clone());
    }
    for group in &request.security_groups {
        args.push("--security-group".into());
        args.push(group.clone());
    }
    for (key, value) in &request.metadata {
        args.push("--property".into());
        args.push(format!("{}={}", key, value));
    }
    if let Some(path) = userdata_path {
        args.push("--user-data".into());
        args.push(path.to_string());
    }
    if request.config_drive {
        args.push("--config-drive".into());
        args.push("True".into());
    }
    if let Some(zone) = &request.availability_zone {
        args.push("--availability-zone".into());
        args.push(zone.clone());
    }

    args.push(request.name.clone());
    args
}

#[async_trait]
impl ComputeClient for OpenStackCompute {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<ServerRecord>> {
        let matches = self.cli.list_servers_named(name).await?;
        let summary = match matches.as_slice() {
            [] => return Ok(None),
            [one] => one,
            _ => return Err(OpenStackError::DuplicateServer(name.to_string()).into()),
        };

        let detail = match self.cli.show_server(&summary.id).await {
            Ok(detail) => detail,
            // Deleted between list and show
            Err(OpenStackError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let floating = self.floating_addresses(&summary.id).await?;
        Ok(Some(detail.into_record(&floating)))
    }

    async fn create_server(&self, request: &BootRequest) -> Result<ServerRecord> {
        // Resolve a volume name to its ID; --block-device only accepts IDs
        let mut request = request.clone();
        if let ResolvedBootSource::Volume { volume_id, .. } = &mut request.source {
            *volume_id = self.cli.show_volume(volume_id).await?.id;
        }

        let userdata_file = match &request.userdata {
            Some(content) => {
                let mut file = tempfile::NamedTempFile::new()?;
                file.write_all(content.as_bytes())?;
                file.flush()?;
                Some(file)
            }
            None => None,
        };
        let userdata_path = userdata_file
            .as_ref()
            .map(|f| f.path().to_string_lossy().to_string());

        let args = boot_args(&request, userdata_path.as_deref());
        tracing::info!("Creating server '{}'", request.name);
        let detail = self.cli.create_server(&args).await?;
        Ok(detail.into_record(&BTreeSet::new()))
    }

    async fn delete_server(&self, name: &str) -> Result<()> {
        tracing::info!("Deleting server '{}'", name);
        Ok(self.cli.delete_server(name).await?)
    }

    async fn find_images(&self, reference: &str) -> Result<Vec<Image>> {
        Ok(self
            .cli
            .list_images()
            .await?
            .into_iter()
            .filter(|i| i.id == reference || i.name.contains(reference))
            .map(|i| Image {
                id: i.id,
                name: i.name,
            })
            .collect())
    }

    async fn get_flavor(&self, reference: &str) -> Result<Option<Flavor>> {
        Ok(self.cli.show_flavor(reference).await?.map(|f| Flavor {
            id: f.id,
            name: f.name,
            ram_mb: f.ram,
            vcpus: f.vcpus,
            disk_gb: f.disk,
        }))
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        Ok(self
            .cli
            .list_flavors()
            .await?
            .into_iter()
            .map(|f| Flavor {
                id: f.id,
                name: f.name,
                ram_mb: f.ram,
                vcpus: f.vcpus,
                disk_gb: f.disk,
            })
            .collect())
    }

    async fn find_networks(&self, name: &str) -> Result<Vec<NamedResource>> {
        Ok(self
            .cli
            .list_networks_named(name)
            .await?
            .into_iter()
            .map(|n| NamedResource {
                id: n.id,
                name: n.name,
            })
            .collect())
    }

    async fn find_ports(&self, name: &str) -> Result<Vec<NamedResource>> {
        Ok(self
            .cli
            .list_ports_named(name)
            .await?
            .into_iter()
            .map(|p| NamedResource {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    async fn attach_floating_ip(
        &self,
        server_id: &str,
        source: &FloatingIpSource,
    ) -> Result<String> {
        let address = match source {
            FloatingIpSource::Address(ip) => {
                let found = self
                    .cli
                    .find_floating_ip(ip)
                    .await?
                    .ok_or_else(|| OpenStackError::AddressUnavailable(ip.clone()))?;
                if found.port.is_some() {
                    return Err(OpenStackError::AddressUnavailable(ip.clone()).into());
                }
                found.floating_ip_address
            }
            FloatingIpSource::Pool(pool) => self.allocate_from(pool).await?,
            FloatingIpSource::Auto => {
                let pool = self.auto_pool().await?;
                self.allocate_from(&pool).await?
            }
        };

        tracing::info!("Attaching floating IP {} to {}", address, server_id);
        self.cli.add_floating_ip(server_id, &address).await?;
        Ok(address)
    }

    async fn detach_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        tracing::info!("Detaching floating IP {} from {}", address, server_id);
        Ok(self.cli.remove_floating_ip(server_id, address).await?)
    }
}
