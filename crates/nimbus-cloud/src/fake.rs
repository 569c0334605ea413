//! In-memory compute client for tests

use crate::error::{CloudError, Result};
use crate::model::{
    Address, AddressKind, BootRequest, Flavor, Image, NamedResource, ServerRecord, ServerStatus,
};
use crate::provider::{ComputeClient, FloatingIpSource};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// A call received by [`FakeCompute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetServer(String),
    Create(BootRequest),
    Delete(String),
    FindImages(String),
    GetFlavor(String),
    ListFlavors,
    FindNetworks(String),
    FindPorts(String),
    Attach(String, FloatingIpSource),
    Detach(String, String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::Create(_) | Call::Delete(_) | Call::Attach(..) | Call::Detach(..)
        )
    }
}

#[derive(Default)]
struct State {
    servers: BTreeMap<String, ServerRecord>,
    images: Vec<Image>,
    flavors: Vec<Flavor>,
    networks: Vec<NamedResource>,
    ports: Vec<NamedResource>,
    free_floating: Vec<String>,
    pools: Vec<(String, VecDeque<String>)>,
    default_pool: Option<String>,
    /// Status applied to the server on each lookup, front first
    status_script: VecDeque<ServerStatus>,
    /// Lookups a deleted server stays visible for; `None` keeps it forever
    linger_after_delete: Option<u32>,
    deleting: BTreeMap<String, u32>,
    /// Lookups an existing server survives before it disappears on its own
    vanish_after: Option<u32>,
    /// Someone else deletes the server just before our delete call lands
    delete_races: bool,
    next_id: u32,
    calls: Vec<Call>,
}

pub struct FakeCompute {
    state: Mutex<State>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                linger_after_delete: Some(0),
                ..Default::default()
            }),
        }
    }

    pub fn with_images(self, images: Vec<Image>) -> Self {
        self.state.lock().unwrap().images = images;
        self
    }

    pub fn with_flavors(self, flavors: Vec<Flavor>) -> Self {
        self.state.lock().unwrap().flavors = flavors;
        self
    }

    pub fn with_network(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().networks.push(NamedResource {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_port(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().ports.push(NamedResource {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Pre-existing floating IPs owned by the project and not attached anywhere
    pub fn with_free_floating_ips(self, ips: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .free_floating
            .extend(ips.iter().map(|ip| ip.to_string()));
        self
    }

    pub fn with_pool(self, name: &str, available: &[&str]) -> Self {
        self.state.lock().unwrap().pools.push((
            name.to_string(),
            available.iter().map(|ip| ip.to_string()).collect(),
        ));
        self
    }

    /// A pool that also serves auto-assign requests
    pub fn with_default_pool(self, name: &str, available: &[&str]) -> Self {
        let this = self.with_pool(name, available);
        this.state.lock().unwrap().default_pool = Some(name.to_string());
        this
    }

    /// Statuses reported by successive server lookups
    pub fn with_status_script(self, statuses: Vec<ServerStatus>) -> Self {
        self.state.lock().unwrap().status_script = statuses.into();
        self
    }

    /// Keep deleted servers visible for `lookups` lookups (`None`: forever)
    pub fn with_delete_linger(self, lookups: Option<u32>) -> Self {
        self.state.lock().unwrap().linger_after_delete = lookups;
        self
    }

    /// Remove whichever server is looked up once it has been seen `lookups` times
    pub fn with_vanish_after(self, lookups: u32) -> Self {
        self.state.lock().unwrap().vanish_after = Some(lookups);
        self
    }

    /// Make `delete_server` find the server already gone
    pub fn with_delete_race(self) -> Self {
        self.state.lock().unwrap().delete_races = true;
        self
    }

    pub fn insert_server(&self, record: ServerRecord) {
        self.state
            .lock()
            .unwrap()
            .servers
            .insert(record.name.clone(), record);
    }

    pub fn server(&self, name: &str) -> Option<ServerRecord> {
        self.state.lock().unwrap().servers.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn attach_address(server: &mut ServerRecord, address: &str) {
    let network = server
        .addresses
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "public".to_string());
    server
        .addresses
        .entry(network)
        .or_default()
        .push(Address::floating(address));
}

#[async_trait]
impl ComputeClient for FakeCompute {
    fn name(&self) -> &str {
        "fake"
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<ServerRecord>> {
        self.record(Call::GetServer(name.to_string()));
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if let Some(remaining) = state.deleting.get_mut(name) {
            if *remaining == 0 {
                state.deleting.remove(name);
                state.servers.remove(name);
                return Ok(None);
            }
            *remaining -= 1;
        }

        if !state.servers.contains_key(name) {
            return Ok(None);
        }
        match state.vanish_after {
            Some(0) => {
                state.vanish_after = None;
                state.servers.remove(name);
                return Ok(None);
            }
            Some(remaining) => state.vanish_after = Some(remaining - 1),
            None => {}
        }
        let next_status = state.status_script.pop_front();
        let server = state.servers.get_mut(name).map(|server| {
            if let Some(status) = next_status {
                server.status = status;
            }
            server.clone()
        });
        Ok(server)
    }

    async fn create_server(&self, request: &BootRequest) -> Result<ServerRecord> {
        self.record(Call::Create(request.clone()));
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;

        let mut record = ServerRecord::new(
            format!("srv-{}", state.next_id),
            request.name.clone(),
            ServerStatus::Building,
        )
        .with_address(
            "private",
            Address::fixed(format!("10.0.0.{}", 10 + state.next_id)),
        );
        record.metadata = request.metadata.clone();
        record.availability_zone = request.availability_zone.clone();

        state.servers.insert(request.name.clone(), record.clone());
        Ok(record)
    }

    async fn delete_server(&self, name: &str) -> Result<()> {
        self.record(Call::Delete(name.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.delete_races {
            state.servers.remove(name);
        }
        if !state.servers.contains_key(name) {
            return Err(CloudError::ResourceNotFound(name.to_string()));
        }
        match state.linger_after_delete {
            Some(0) => {
                state.servers.remove(name);
            }
            Some(lookups) => {
                state.deleting.insert(name.to_string(), lookups);
            }
            None => {
                state.deleting.insert(name.to_string(), u32::MAX);
            }
        }
        Ok(())
    }

    async fn find_images(&self, reference: &str) -> Result<Vec<Image>> {
        self.record(Call::FindImages(reference.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .images
            .iter()
            .filter(|i| i.id == reference || i.name.contains(reference))
            .cloned()
            .collect())
    }

    async fn get_flavor(&self, reference: &str) -> Result<Option<Flavor>> {
        self.record(Call::GetFlavor(reference.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .flavors
            .iter()
            .find(|f| f.id == reference || f.name == reference)
            .cloned())
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        self.record(Call::ListFlavors);
        Ok(self.state.lock().unwrap().flavors.clone())
    }

    async fn find_networks(&self, name: &str) -> Result<Vec<NamedResource>> {
        self.record(Call::FindNetworks(name.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect())
    }

    async fn find_ports(&self, name: &str) -> Result<Vec<NamedResource>> {
        self.record(Call::FindPorts(name.to_string()));
        let state = self.state.lock().unwrap();
        Ok(state.ports.iter().filter(|p| p.name == name).cloned().collect())
    }

    async fn attach_floating_ip(
        &self,
        server_id: &str,
        source: &FloatingIpSource,
    ) -> Result<String> {
        self.record(Call::Attach(server_id.to_string(), source.clone()));
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let address = match source {
            FloatingIpSource::Address(ip) => {
                let position = state
                    .free_floating
                    .iter()
                    .position(|free| free == ip)
                    .ok_or_else(|| CloudError::AddressUnavailable(ip.clone()))?;
                state.free_floating.remove(position)
            }
            FloatingIpSource::Auto | FloatingIpSource::Pool(_) => {
                let pool_name = match source {
                    FloatingIpSource::Pool(name) => name.clone(),
                    _ => state
                        .default_pool
                        .clone()
                        .ok_or_else(|| {
                            CloudError::ResourceNotFound("no external network".to_string())
                        })?,
                };
                let pool = state
                    .pools
                    .iter_mut()
                    .find(|(name, _)| *name == pool_name)
                    .ok_or_else(|| CloudError::ResourceNotFound(pool_name.clone()))?;
                pool.1
                    .pop_front()
                    .ok_or_else(|| CloudError::PoolExhausted(pool_name.clone()))?
            }
        };

        let server = state
            .servers
            .values_mut()
            .find(|s| s.id == server_id)
            .ok_or_else(|| CloudError::ResourceNotFound(server_id.to_string()))?;
        attach_address(server, &address);
        Ok(address)
    }

    async fn detach_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        self.record(Call::Detach(server_id.to_string(), address.to_string()));
        let mut state = self.state.lock().unwrap();
        let server = state
            .servers
            .values_mut()
            .find(|s| s.id == server_id)
            .ok_or_else(|| CloudError::ResourceNotFound(server_id.to_string()))?;
        for addresses in server.addresses.values_mut() {
            addresses.retain(|a| !(a.kind == AddressKind::Floating && a.addr == address));
        }
        state.free_floating.push(address.to_string());
        Ok(())
    }
}
