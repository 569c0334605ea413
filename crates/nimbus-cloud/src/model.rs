//! Desired and observed server models
//!
//! `ServerSpec` is the declarative input as written by the user. It is checked by
//! [`validate`](crate::validate::validate) into a `ValidatedSpec`, whose enums make the
//! mutually exclusive choices unrepresentable. `ServerRecord` is what the cloud reports back.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_IMAGE_EXCLUDE: &str = "(deprecated)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Target state of the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    #[default]
    Present,
    Absent,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetState::Present => write!(f, "present"),
            TargetState::Absent => write!(f, "absent"),
        }
    }
}

impl std::str::FromStr for TargetState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(format!("unknown state '{}' (expected present or absent)", other)),
        }
    }
}

/// One network interface of the server, in boot order
///
/// Written in documents as a single-key map: `- net-name: private`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NicEntry", into = "NicEntry")]
pub enum NetworkAttachment {
    NetId(String),
    NetName(String),
    PortId(String),
    PortName(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct NicEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    net_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    net_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port_name: Option<String>,
}

impl TryFrom<NicEntry> for NetworkAttachment {
    type Error = String;

    fn try_from(entry: NicEntry) -> Result<Self, Self::Error> {
        match (entry.net_id, entry.net_name, entry.port_id, entry.port_name) {
            (Some(id), None, None, None) => Ok(Self::NetId(id)),
            (None, Some(name), None, None) => Ok(Self::NetName(name)),
            (None, None, Some(id), None) => Ok(Self::PortId(id)),
            (None, None, None, Some(name)) => Ok(Self::PortName(name)),
            _ => Err(
                "a nic needs exactly one of net-id, net-name, port-id, port-name".to_string(),
            ),
        }
    }
}

impl From<NetworkAttachment> for NicEntry {
    fn from(attachment: NetworkAttachment) -> Self {
        match attachment {
            NetworkAttachment::NetId(id) => NicEntry {
                net_id: Some(id),
                ..Default::default()
            },
            NetworkAttachment::NetName(name) => NicEntry {
                net_name: Some(name),
                ..Default::default()
            },
            NetworkAttachment::PortId(id) => NicEntry {
                port_id: Some(id),
                ..Default::default()
            },
            NetworkAttachment::PortName(name) => NicEntry {
                port_name: Some(name),
                ..Default::default()
            },
        }
    }
}

/// Declared server configuration, deserialized from the `server` section of a spec document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSpec {
    /// Server name, unique within the project
    pub name: String,

    /// Image name or ID to boot from
    #[serde(default)]
    pub image: Option<String>,

    /// Images whose name contains this text are never selected
    #[serde(default = "default_image_exclude")]
    pub image_exclude: String,

    /// Existing volume to boot from instead of an image
    #[serde(default)]
    pub root_volume: Option<String>,

    /// Delete the root volume together with the server
    #[serde(default)]
    pub terminate_volume: bool,

    /// Flavor name or ID
    #[serde(default)]
    pub flavor: Option<String>,

    /// Minimum RAM (MB) when choosing a flavor by capacity
    #[serde(default)]
    pub flavor_ram: Option<u64>,

    /// Text that must appear in the flavor name when choosing by capacity
    #[serde(default)]
    pub flavor_include: Option<String>,

    #[serde(default)]
    pub key_name: Option<String>,

    /// Security group names; a comma-separated string is also accepted
    #[serde(
        default = "default_security_groups",
        deserialize_with = "deserialize_security_groups"
    )]
    pub security_groups: Vec<String>,

    #[serde(default)]
    pub nics: Vec<NetworkAttachment>,

    #[serde(default)]
    pub meta: BTreeMap<String, String>,

    #[serde(default)]
    pub userdata: Option<String>,

    #[serde(default)]
    pub config_drive: bool,

    #[serde(default)]
    pub availability_zone: Option<String>,

    /// Auto-assign a floating IP; unset means "on unless a list or pools are given"
    #[serde(default)]
    pub auto_floating_ip: Option<bool>,

    /// Pre-existing floating IPs the server must hold
    #[serde(default)]
    pub floating_ips: Vec<String>,

    /// Pools to draw a floating IP from, in preference order
    #[serde(default)]
    pub floating_ip_pools: Vec<String>,

    #[serde(default = "default_wait")]
    pub wait: bool,

    /// Seconds to wait for create/delete to settle
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub state: TargetState,
}

impl ServerSpec {
    /// A spec with only a name and every other field at its default
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            image_exclude: default_image_exclude(),
            root_volume: None,
            terminate_volume: false,
            flavor: None,
            flavor_ram: None,
            flavor_include: None,
            key_name: None,
            security_groups: default_security_groups(),
            nics: Vec::new(),
            meta: BTreeMap::new(),
            userdata: None,
            config_drive: false,
            availability_zone: None,
            auto_floating_ip: None,
            floating_ips: Vec::new(),
            floating_ip_pools: Vec::new(),
            wait: default_wait(),
            timeout: default_timeout(),
            state: TargetState::Present,
        }
    }
}

fn default_image_exclude() -> String {
    DEFAULT_IMAGE_EXCLUDE.to_string()
}

fn default_security_groups() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_wait() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn deserialize_security_groups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let groups = match StringOrList::deserialize(deserializer)? {
        StringOrList::One(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        StringOrList::Many(list) => list,
    };
    Ok(groups)
}

/// Image lookup: exact name or ID, minus names containing `exclude`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub reference: String,
    pub exclude: Option<String>,
}

/// Where the server boots from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootSource {
    Image(ImageQuery),
    Volume {
        volume: String,
        delete_on_termination: bool,
    },
}

/// Flavor lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlavorQuery {
    Exact(String),
    Capacity {
        min_ram_mb: u64,
        include: Option<String>,
    },
}

/// Desired floating IP exposure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloatingIpPolicy {
    /// Leave floating IPs alone
    Disabled,
    /// Hold at least one floating IP from the default pool
    AutoAssign,
    /// Hold exactly these floating IPs
    Explicit(Vec<String>),
    /// Hold at least one floating IP, drawn from the first pool with capacity
    Pools(Vec<String>),
}

/// A spec that passed validation; exclusive choices are resolved into enums
#[derive(Debug, Clone)]
pub struct ValidatedSpec {
    pub name: String,
    pub state: TargetState,
    /// Always `Some` when `state` is present
    pub boot_source: Option<BootSource>,
    /// Always `Some` when `state` is present
    pub flavor: Option<FlavorQuery>,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub nics: Vec<NetworkAttachment>,
    pub metadata: BTreeMap<String, String>,
    pub userdata: Option<String>,
    pub config_drive: bool,
    pub availability_zone: Option<String>,
    pub floating_ip: FloatingIpPolicy,
    pub wait: bool,
    pub timeout: Duration,
}

/// A network attachment with names already turned into IDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedAttachment {
    NetId(String),
    PortId(String),
}

/// Resolved boot source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBootSource {
    Image {
        image_id: String,
    },
    Volume {
        volume_id: String,
        delete_on_termination: bool,
    },
}

/// Fully resolved request passed to [`ComputeClient::create_server`](crate::ComputeClient::create_server)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootRequest {
    pub name: String,
    pub source: ResolvedBootSource,
    pub flavor_id: String,
    pub nics: Vec<ResolvedAttachment>,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub userdata: Option<String>,
    pub config_drive: bool,
    pub availability_zone: Option<String>,
}

/// Catalog image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

/// Catalog flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub ram_mb: u64,
    pub vcpus: u32,
    pub disk_gb: u64,
}

/// Network or port found by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: String,
    pub name: String,
}

/// Server status as reported by the compute service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServerStatus {
    Building,
    Active,
    Shutoff,
    Paused,
    Suspended,
    Error,
    Deleted,
    /// Any other provider status (REBOOT, RESIZE, MIGRATING, ...)
    Other(String),
}

impl ServerStatus {
    /// Statuses where floating IPs may be converged without touching the server
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ServerStatus::Active
                | ServerStatus::Shutoff
                | ServerStatus::Paused
                | ServerStatus::Suspended
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerStatus::Error)
    }

    /// Neither settled nor failed: the server is still moving between states
    pub fn is_transitional(&self) -> bool {
        !self.is_settled() && !self.is_error()
    }
}

impl From<&str> for ServerStatus {
    fn from(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "BUILD" | "BUILDING" => ServerStatus::Building,
            "ACTIVE" => ServerStatus::Active,
            "SHUTOFF" => ServerStatus::Shutoff,
            "PAUSED" => ServerStatus::Paused,
            "SUSPENDED" => ServerStatus::Suspended,
            "ERROR" => ServerStatus::Error,
            "DELETED" => ServerStatus::Deleted,
            other => ServerStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ServerStatus {
    fn from(value: String) -> Self {
        ServerStatus::from(value.as_str())
    }
}

impl From<ServerStatus> for String {
    fn from(value: ServerStatus) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Building => write!(f, "BUILDING"),
            ServerStatus::Active => write!(f, "ACTIVE"),
            ServerStatus::Shutoff => write!(f, "SHUTOFF"),
            ServerStatus::Paused => write!(f, "PAUSED"),
            ServerStatus::Suspended => write!(f, "SUSPENDED"),
            ServerStatus::Error => write!(f, "ERROR"),
            ServerStatus::Deleted => write!(f, "DELETED"),
            ServerStatus::Other(status) => write!(f, "{}", status),
        }
    }
}

/// Whether an address is the server's own or a floating one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Fixed,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
    #[serde(rename = "type")]
    pub kind: AddressKind,
}

impl Address {
    pub fn fixed(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            kind: AddressKind::Fixed,
        }
    }

    pub fn floating(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            kind: AddressKind::Floating,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_ipv6())
            .unwrap_or(false)
    }
}

/// Observed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,

    /// Network name to addresses on that network
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<Address>>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub availability_zone: Option<String>,
}

impl ServerRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ServerStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            addresses: BTreeMap::new(),
            metadata: BTreeMap::new(),
            availability_zone: None,
        }
    }

    pub fn with_address(mut self, network: impl Into<String>, address: Address) -> Self {
        self.addresses.entry(network.into()).or_default().push(address);
        self
    }

    /// Addresses of the given kind across all networks, in network order
    pub fn addresses_of(&self, kind: AddressKind) -> Vec<&str> {
        self.addresses
            .values()
            .flatten()
            .filter(|a| a.kind == kind)
            .map(|a| a.addr.as_str())
            .collect()
    }

    pub fn floating_ips(&self) -> Vec<&str> {
        self.addresses_of(AddressKind::Floating)
    }

    pub fn fixed_ips(&self) -> Vec<&str> {
        self.addresses_of(AddressKind::Fixed)
    }
}
