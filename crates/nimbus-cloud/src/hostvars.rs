//! Host variables derived from an observed server
//!
//! A flat view of a [`ServerRecord`] for downstream tooling (inventory files, templating).

use crate::model::{AddressKind, ServerRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVars {
    pub id: String,
    pub name: String,
    pub status: String,
    pub public_v4: Option<String>,
    pub public_v6: Option<String>,
    pub private_v4: Option<String>,
    /// Address to reach the server on: public IPv4, else private IPv4
    pub interface_ip: Option<String>,
    pub networks: BTreeMap<String, Vec<String>>,
    pub metadata: BTreeMap<String, String>,
    pub region: Option<String>,
    pub availability_zone: Option<String>,
}

impl HostVars {
    pub fn from_record(record: &ServerRecord, region: Option<&str>) -> Self {
        let addresses: Vec<_> = record.addresses.values().flatten().collect();

        let public_v4 = addresses
            .iter()
            .find(|a| a.kind == AddressKind::Floating && !a.is_ipv6())
            .map(|a| a.addr.clone());
        let public_v6 = addresses
            .iter()
            .find(|a| a.is_ipv6())
            .map(|a| a.addr.clone());
        let private_v4 = addresses
            .iter()
            .find(|a| a.kind == AddressKind::Fixed && !a.is_ipv6())
            .map(|a| a.addr.clone());
        let interface_ip = public_v4.clone().or_else(|| private_v4.clone());

        let networks = record
            .addresses
            .iter()
            .map(|(network, addrs)| {
                (
                    network.clone(),
                    addrs.iter().map(|a| a.addr.clone()).collect(),
                )
            })
            .collect();

        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            status: record.status.to_string(),
            public_v4,
            public_v6,
            private_v4,
            interface_ip,
            networks,
            metadata: record.metadata.clone(),
            region: region.map(str::to_string),
            availability_zone: record.availability_zone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Address, ServerStatus};

    #[test]
    fn test_prefers_floating_address_for_interface() {
        let record = ServerRecord::new("srv-1", "web", ServerStatus::Active)
            .with_address("private", Address::fixed("10.0.0.5"))
            .with_address("private", Address::fixed("fd00::5"))
            .with_address("private", Address::floating("203.0.113.9"));

        let vars = HostVars::from_record(&record, Some("RegionOne"));

        assert_eq!(vars.public_v4.as_deref(), Some("203.0.113.9"));
        assert_eq!(vars.public_v6.as_deref(), Some("fd00::5"));
        assert_eq!(vars.private_v4.as_deref(), Some("10.0.0.5"));
        assert_eq!(vars.interface_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(vars.region.as_deref(), Some("RegionOne"));
        assert_eq!(vars.status, "ACTIVE");
        assert_eq!(vars.networks["private"].len(), 3);
    }

    #[test]
    fn test_falls_back_to_private_address() {
        let record = ServerRecord::new("srv-2", "db", ServerStatus::Shutoff)
            .with_address("internal", Address::fixed("192.168.10.4"));

        let vars = HostVars::from_record(&record, None);

        assert_eq!(vars.public_v4, None);
        assert_eq!(vars.interface_ip.as_deref(), Some("192.168.10.4"));
        assert_eq!(vars.region, None);
    }
}
