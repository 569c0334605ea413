//! openstack CLI wrapper
//!
//! Wraps `python-openstackclient` commands with `-f json` output and parses the results.

use crate::error::{OpenStackError, Result};
use nimbus_cloud::{Address, ServerRecord, ServerStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::process::Stdio;
use tokio::process::Command;

/// openstack CLI wrapper
#[derive(Debug, Clone, Default)]
pub struct OpenStackCli {
    cloud: Option<String>,
    region: Option<String>,
}

impl OpenStackCli {
    pub fn new(cloud: Option<String>, region: Option<String>) -> Self {
        Self { cloud, region }
    }

    /// Check that the openstack CLI is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("openstack").output().await?;
        if !which.status.success() {
            return Err(OpenStackError::CliNotFound);
        }
        Ok(())
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(cloud) = &self.cloud {
            args.push("--os-cloud".to_string());
            args.push(cloud.clone());
        }
        if let Some(region) = &self.region {
            args.push("--os-region-name".to_string());
            args.push(region.clone());
        }
        args
    }

    /// Run an openstack command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let global = self.global_args();
        let mut cmd = Command::new("openstack");
        cmd.args(&global);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: openstack {} {}", global.join(" "), args.join(" "));

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpenStackError::CliNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OpenStackError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a command with `-f json` and parse its output
    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let mut args = args.to_vec();
        args.extend(["-f", "json"]);
        let output = self.run_command(&args).await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn run_json_list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let mut args = args.to_vec();
        args.extend(["-f", "json"]);
        let output = self.run_command(&args).await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// List servers whose name is exactly `name`
    pub async fn list_servers_named(&self, name: &str) -> Result<Vec<ServerSummary>> {
        let pattern = server_name_pattern(name);
        let servers: Vec<ServerSummary> = self
            .run_json_list(&["server", "list", "--name", pattern.as_str()])
            .await?;
        Ok(servers.into_iter().filter(|s| s.name == name).collect())
    }

    pub async fn show_server(&self, id: &str) -> Result<ServerDetail> {
        self.run_json(&["server", "show", id])
            .await
            .map_err(|e| not_found_as(e, format!("server {}", id)))
    }

    pub async fn create_server(&self, args: &[String]) -> Result<ServerDetail> {
        let mut full: Vec<&str> = vec!["server", "create"];
        full.extend(args.iter().map(String::as_str));
        self.run_json(&full).await
    }

    pub async fn delete_server(&self, name: &str) -> Result<()> {
        self.run_command(&["server", "delete", name])
            .await
            .map_err(|e| not_found_as(e, format!("server {}", name)))?;
        Ok(())
    }

    pub async fn show_volume(&self, reference: &str) -> Result<IdAndName> {
        self.run_json(&["volume", "show", reference])
            .await
            .map_err(|e| not_found_as(e, format!("volume {}", reference)))
    }

    pub async fn list_images(&self) -> Result<Vec<ListedImage>> {
        self.run_json_list(&["image", "list"]).await
    }

    pub async fn show_flavor(&self, reference: &str) -> Result<Option<FlavorDetail>> {
        match self.run_json(&["flavor", "show", reference]).await {
            Ok(flavor) => Ok(Some(flavor)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_flavors(&self) -> Result<Vec<ListedFlavor>> {
        self.run_json_list(&["flavor", "list", "--all"]).await
    }

    pub async fn list_networks_named(&self, name: &str) -> Result<Vec<ListedResource>> {
        self.run_json_list(&["network", "list", "--name", name])
            .await
    }

    /// Networks flagged as external, the candidates for floating IPs
    pub async fn list_external_networks(&self) -> Result<Vec<ListedResource>> {
        self.run_json_list(&["network", "list", "--external"]).await
    }

    pub async fn list_ports_named(&self, name: &str) -> Result<Vec<ListedResource>> {
        self.run_json_list(&["port", "list", "--name", name]).await
    }

    /// Floating IPs currently associated with the server
    pub async fn floating_ips_of_server(&self, server_id: &str) -> Result<Vec<ListedFloatingIp>> {
        // Filtering by port is the only server-side filter the CLI offers
        let all: Vec<ListedFloatingIp> = self.run_json_list(&["floating", "ip", "list"]).await?;
        let ports: Vec<ListedResource> = self
            .run_json_list(&["port", "list", "--server", server_id])
            .await?;
        let port_ids: BTreeSet<&str> = ports.iter().map(|p| p.id.as_str()).collect();
        Ok(all
            .into_iter()
            .filter(|ip| ip.port.as_deref().is_some_and(|p| port_ids.contains(p)))
            .collect())
    }

    pub async fn find_floating_ip(&self, address: &str) -> Result<Option<ListedFloatingIp>> {
        let found: Vec<ListedFloatingIp> = self
            .run_json_list(&["floating", "ip", "list", "--floating-ip-address", address])
            .await?;
        Ok(found.into_iter().next())
    }

    /// Unattached floating IPs already allocated from `pool`
    pub async fn free_floating_ips(&self, pool: &str) -> Result<Vec<ListedFloatingIp>> {
        let found: Vec<ListedFloatingIp> = self
            .run_json_list(&["floating", "ip", "list", "--network", pool])
            .await?;
        Ok(found.into_iter().filter(|ip| ip.port.is_none()).collect())
    }

    pub async fn create_floating_ip(&self, pool: &str) -> Result<CreatedFloatingIp> {
        self.run_json(&["floating", "ip", "create", pool])
            .await
            .map_err(|e| match e {
                OpenStackError::CommandFailed(stderr) if is_exhaustion(&stderr) => {
                    OpenStackError::PoolExhausted(pool.to_string())
                }
                other => not_found_as(other, format!("network {}", pool)),
            })
    }

    pub async fn add_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        self.run_command(&["server", "add", "floating", "ip", server_id, address])
            .await?;
        Ok(())
    }

    pub async fn remove_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        self.run_command(&["server", "remove", "floating", "ip", server_id, address])
            .await?;
        Ok(())
    }
}

/// `server list --name` takes a regular expression
fn server_name_pattern(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

fn is_not_found(err: &OpenStackError) -> bool {
    match err {
        OpenStackError::NotFound(_) => true,
        OpenStackError::CommandFailed(stderr) => {
            let lower = stderr.to_lowercase();
            lower.contains("no server with a name or id")
                || lower.contains("could not be found")
                || lower.contains("no flavor with a name or id")
                || lower.contains("no volume with a name or id")
                || lower.contains("not found")
        }
        _ => false,
    }
}

fn not_found_as(err: OpenStackError, what: String) -> OpenStackError {
    if is_not_found(&err) {
        OpenStackError::NotFound(what)
    } else {
        err
    }
}

fn is_exhaustion(stderr: &str) -> bool {
    stderr.contains("No more IP addresses available")
        || stderr.contains("IpAddressGenerationFailure")
        || stderr.contains("Quota exceeded for resources: ['floatingip']")
}

/// Row of `server list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Status")]
    pub status: String,
}

/// `server show` / `server create` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDetail {
    pub id: String,
    pub name: String,
    pub status: String,

    #[serde(default)]
    pub addresses: Option<AddressField>,

    #[serde(default)]
    pub properties: Option<PropertiesField>,

    #[serde(rename = "OS-EXT-AZ:availability_zone", default)]
    pub availability_zone: Option<String>,
}

/// `addresses` is a map in recent clients and `net=a, b; net2=c` text in older ones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressField {
    Map(BTreeMap<String, Vec<String>>),
    Text(String),
}

impl AddressField {
    pub fn by_network(&self) -> BTreeMap<String, Vec<String>> {
        match self {
            AddressField::Map(map) => map.clone(),
            AddressField::Text(text) => text
                .split(';')
                .filter_map(|entry| entry.split_once('='))
                .map(|(network, addrs)| {
                    (
                        network.trim().to_string(),
                        addrs
                            .split(',')
                            .map(str::trim)
                            .filter(|a| !a.is_empty())
                            .map(String::from)
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

/// `properties` is a map in recent clients and `k='v', k2='v2'` text in older ones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertiesField {
    Map(BTreeMap<String, String>),
    Text(String),
}

impl PropertiesField {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            PropertiesField::Map(map) => map.clone(),
            PropertiesField::Text(text) => text
                .split(", ")
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('\'').to_string()))
                .collect(),
        }
    }
}

impl ServerDetail {
    /// Build a record, marking the addresses in `floating` as floating
    pub fn into_record(self, floating: &BTreeSet<String>) -> ServerRecord {
        let mut record = ServerRecord::new(self.id, self.name, ServerStatus::from(self.status));
        if let Some(addresses) = &self.addresses {
            for (network, addrs) in addresses.by_network() {
                for addr in addrs {
                    let address = if floating.contains(&addr) {
                        Address::floating(addr)
                    } else {
                        Address::fixed(addr)
                    };
                    record = record.with_address(network.clone(), address);
                }
            }
        }
        if let Some(properties) = &self.properties {
            record.metadata = properties.to_map();
        }
        record.availability_zone = self.availability_zone.filter(|az| !az.is_empty());
        record
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdAndName {
    pub id: String,
    pub name: String,
}

/// Row of `image list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedImage {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

/// Row of `flavor list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedFlavor {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "RAM")]
    pub ram: u64,

    #[serde(rename = "VCPUs")]
    pub vcpus: u32,

    #[serde(rename = "Disk")]
    pub disk: u64,
}

/// `flavor show` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorDetail {
    pub id: String,
    pub name: String,
    pub ram: u64,
    pub vcpus: u32,
    pub disk: u64,
}

/// Row of `network list` / `port list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedResource {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,
}

/// Row of `floating ip list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListedFloatingIp {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Floating IP Address")]
    pub floating_ip_address: String,

    #[serde(rename = "Fixed IP Address", default)]
    pub fixed_ip_address: Option<String>,

    #[serde(rename = "Port", default)]
    pub port: Option<String>,

    #[serde(rename = "Floating Network", default)]
    pub floating_network: Option<String>,
}

/// `floating ip create` output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedFloatingIp {
    pub id: String,
    pub floating_ip_address: String,
}
