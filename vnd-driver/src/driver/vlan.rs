use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ipnet::IpNet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vnd_store::{KvObject, ObjectStore, private_copy};

use super::persist::{store_delete, store_update};
use super::restore::RestoreReport;
use super::{NetworkDriver, short_id};
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::flavor::Flavor;
use crate::mac::MacAddress;
use crate::options::{EndpointInterface, GenericOptions, IpamData, NetworkOptions};
use crate::record::{Endpoint, IpSubnet, NetworkConfig};

/// Linux interface names are limited to 15 bytes.
const IFNAME_MAX: usize = 15;

/// Characters of the network id kept in a dummy parent name.
const DUMMY_ID_LEN: usize = 12;

/// Characters of random suffix in a generated endpoint link name.
const LINK_SUFFIX_LEN: usize = 7;

/// A network and the endpoints attached to it.
#[derive(Debug)]
pub(super) struct Network {
    pub(super) config: NetworkConfig,
    pub(super) endpoints: HashMap<String, Endpoint>,
}

impl Network {
    pub(super) fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            endpoints: HashMap::new(),
        }
    }
}

pub(super) type NetworkIndex = HashMap<String, Network>;

/// Driver for one VLAN-style flavor (macvlan or ipvlan).
///
/// Every lifecycle operation holds the index lock for the whole
/// validate, mutate and persist sequence.
pub struct VlanDriver {
    pub(super) flavor: &'static Flavor,
    pub(super) store: Option<Arc<ObjectStore>>,
    pub(super) config: DriverConfig,
    pub(super) networks: Mutex<NetworkIndex>,
    last_restore: RestoreReport,
}

impl VlanDriver {
    /// Build a driver without touching the store.
    pub fn new(
        flavor: &'static Flavor,
        store: Option<Arc<ObjectStore>>,
        config: DriverConfig,
    ) -> Self {
        Self {
            flavor,
            store,
            config,
            networks: Mutex::new(HashMap::new()),
            last_restore: RestoreReport::default(),
        }
    }

    /// Build a driver and restore its persisted state.
    ///
    /// Fails only when the store cannot be listed. Individual bad records are
    /// logged and skipped.
    pub fn init(
        flavor: &'static Flavor,
        store: Option<Arc<ObjectStore>>,
        config: DriverConfig,
    ) -> Result<Self> {
        let mut driver = Self::new(flavor, store, config);
        driver.last_restore = driver.restore()?;
        Ok(driver)
    }

    pub fn flavor(&self) -> &'static Flavor {
        self.flavor
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Outcome of the restore run by [`VlanDriver::init`].
    pub fn restore_report(&self) -> &RestoreReport {
        &self.last_restore
    }

    pub(super) fn store(&self) -> Option<&ObjectStore> {
        self.store.as_deref()
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, NetworkIndex> {
        self.networks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Private copy of a network record.
    pub fn network(&self, id: &str) -> Result<NetworkConfig> {
        let networks = self.lock();
        let network = networks
            .get(id)
            .ok_or_else(|| DriverError::NetworkNotFound(id.to_string()))?;
        copy(&network.config)
    }

    /// Private copies of every network record, ordered by id.
    pub fn networks(&self) -> Result<Vec<NetworkConfig>> {
        let networks = self.lock();
        let mut copies = networks
            .values()
            .map(|network| copy(&network.config))
            .collect::<Result<Vec<_>>>()?;
        copies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(copies)
    }

    /// Private copy of an endpoint record.
    pub fn endpoint(&self, nid: &str, eid: &str) -> Result<Endpoint> {
        let networks = self.lock();
        let network = networks
            .get(nid)
            .ok_or_else(|| DriverError::NetworkNotFound(nid.to_string()))?;
        let endpoint = network
            .endpoints
            .get(eid)
            .ok_or_else(|| DriverError::EndpointNotFound {
                network_id: nid.to_string(),
                endpoint_id: eid.to_string(),
            })?;
        copy(endpoint)
    }

    /// Private copies of the endpoints of a network, ordered by id.
    pub fn endpoints(&self, nid: &str) -> Result<Vec<Endpoint>> {
        let networks = self.lock();
        let network = networks
            .get(nid)
            .ok_or_else(|| DriverError::NetworkNotFound(nid.to_string()))?;
        let mut copies = network
            .endpoints
            .values()
            .map(copy)
            .collect::<Result<Vec<_>>>()?;
        copies.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(copies)
    }

    /// Turn generic options and IPAM data into a validated network record.
    fn build_network(
        &self,
        networks: &NetworkIndex,
        id: &str,
        options: &GenericOptions,
        ipv4_data: &[IpamData],
        ipv6_data: &[IpamData],
    ) -> Result<NetworkConfig> {
        let opts = NetworkOptions::parse(self.flavor, options)?;

        let mut config = NetworkConfig::new(self.flavor, id);
        config.mtu = opts.mtu.unwrap_or(0);
        config.internal = opts.internal;
        config.mode = opts
            .mode
            .unwrap_or_else(|| self.flavor.default_mode().to_string());
        if let Some(spec) = &self.flavor.flag {
            config.flag = Some(opts.flag.unwrap_or_else(|| spec.baseline().to_string()));
        }

        match opts.parent {
            Some(parent) if !opts.internal => {
                validate_ifname(&parent)?;
                config.created_sub_iface = is_vlan_parent(&parent)?;
                config.parent = parent;
            }
            parent => {
                if let Some(parent) = parent {
                    debug!(network_id = %id, parent = %parent, "Ignoring parent of internal network");
                }
                config.parent = dummy_name(id);
                config.created_sub_iface = true;
            }
        }

        config.ipv4_subnets = subnets_from_ipam(ipv4_data, false)?;
        config.ipv6_subnets = subnets_from_ipam(ipv6_data, true)?;

        validate_network(self.flavor, networks, &config)?;
        Ok(config)
    }

    fn build_endpoint(
        &self,
        network: &NetworkConfig,
        eid: &str,
        iface: &EndpointInterface,
    ) -> Result<Endpoint> {
        if iface.addr.is_none() && iface.addrv6.is_none() {
            return Err(DriverError::invalid(
                "create endpoint was not passed an IP address",
            ));
        }
        if let Some(addr) = iface.addr {
            check_in_subnets(&network.ipv4_subnets, IpAddr::V4(addr.addr()))?;
        }
        if let Some(addr) = iface.addrv6 {
            check_in_subnets(&network.ipv6_subnets, IpAddr::V6(addr.addr()))?;
        }

        let mac = match (iface.mac, self.flavor.custom_mac) {
            (Some(_), false) => {
                return Err(DriverError::invalid(format!(
                    "{} interfaces do not support custom mac address assignment",
                    self.flavor.name
                )));
            }
            (Some(mac), true) => Some(mac),
            (None, true) => iface.addr.map(|addr| MacAddress::from_ipv4(addr.addr())),
            (None, false) => None,
        };

        let mut endpoint = Endpoint::new(self.flavor, eid, network.id.clone());
        endpoint.src_name = match &iface.src_name {
            Some(name) => {
                validate_ifname(name)?;
                name.clone()
            }
            None => link_name(self.flavor),
        };
        endpoint.mac = mac;
        endpoint.addr = iface.addr;
        endpoint.addrv6 = iface.addrv6;
        Ok(endpoint)
    }
}

impl NetworkDriver for VlanDriver {
    fn network_type(&self) -> &'static str {
        self.flavor.name
    }

    fn create_network(
        &self,
        id: &str,
        options: &GenericOptions,
        ipv4_data: &[IpamData],
        ipv6_data: &[IpamData],
    ) -> Result<()> {
        if id.is_empty() {
            return Err(DriverError::invalid("network id is required"));
        }

        let mut networks = self.lock();
        if networks.contains_key(id) {
            return Err(DriverError::NetworkExists(id.to_string()));
        }

        let config = self.build_network(&networks, id, options, ipv4_data, ipv6_data)?;
        let network = networks
            .entry(id.to_string())
            .or_insert_with(|| Network::new(config));

        if let Err(e) = store_update(self.store(), &self.config, &mut network.config) {
            networks.remove(id);
            warn!(network_id = %id, error = %e, "Failed to persist network, rolled back");
            return Err(e);
        }

        let network = &networks[id].config;
        info!(
            network_id = %id,
            driver = self.flavor.name,
            parent = %network.parent,
            mode = %network.mode,
            "Created network"
        );
        Ok(())
    }

    fn delete_network(&self, id: &str) -> Result<()> {
        let mut networks = self.lock();
        let network = networks
            .get(id)
            .ok_or_else(|| DriverError::NetworkNotFound(id.to_string()))?;

        store_delete(self.store(), &network.config)?;

        for endpoint in network.endpoints.values() {
            if let Err(e) = store_delete(self.store(), endpoint) {
                warn!(
                    network_id = %id,
                    endpoint_id = %endpoint.id,
                    error = %e,
                    "Failed to remove endpoint from store"
                );
            }
        }

        networks.remove(id);
        info!(network_id = %id, driver = self.flavor.name, "Deleted network");
        Ok(())
    }

    fn create_endpoint(&self, nid: &str, eid: &str, iface: &EndpointInterface) -> Result<()> {
        if eid.is_empty() {
            return Err(DriverError::invalid("endpoint id is required"));
        }

        let mut networks = self.lock();
        // Endpoint records are keyed by id alone, so an id is unique across
        // every network of the driver.
        if let Some(owner) = networks.values().find(|n| n.endpoints.contains_key(eid)) {
            return Err(DriverError::EndpointExists {
                network_id: owner.config.id.clone(),
                endpoint_id: eid.to_string(),
            });
        }
        let network = networks
            .get_mut(nid)
            .ok_or_else(|| DriverError::NetworkNotFound(nid.to_string()))?;

        let endpoint = self.build_endpoint(&network.config, eid, iface)?;
        let endpoint = network
            .endpoints
            .entry(eid.to_string())
            .or_insert(endpoint);

        if let Err(e) = store_update(self.store(), &self.config, endpoint) {
            network.endpoints.remove(eid);
            warn!(network_id = %nid, endpoint_id = %eid, error = %e, "Failed to persist endpoint, rolled back");
            return Err(e);
        }

        debug!(network_id = %nid, endpoint_id = %eid, "Created endpoint");
        Ok(())
    }

    fn delete_endpoint(&self, nid: &str, eid: &str) -> Result<()> {
        let mut networks = self.lock();
        let network = networks
            .get_mut(nid)
            .ok_or_else(|| DriverError::NetworkNotFound(nid.to_string()))?;
        let endpoint = network
            .endpoints
            .get(eid)
            .ok_or_else(|| DriverError::EndpointNotFound {
                network_id: nid.to_string(),
                endpoint_id: eid.to_string(),
            })?;

        store_delete(self.store(), endpoint)?;
        network.endpoints.remove(eid);

        debug!(network_id = %nid, endpoint_id = %eid, "Deleted endpoint");
        Ok(())
    }
}

fn copy<T: KvObject>(obj: &T) -> Result<T> {
    private_copy(obj).map_err(|e| DriverError::store("copy", obj.kind(), obj.key().join("/"), e))
}

/// Checks shared by network creation and restore.
pub(super) fn validate_network(
    flavor: &Flavor,
    networks: &NetworkIndex,
    config: &NetworkConfig,
) -> Result<()> {
    if config.id.is_empty() {
        return Err(DriverError::invalid("network id is required"));
    }
    if !flavor.supports_mode(&config.mode) {
        return Err(DriverError::invalid(format!(
            "requested {} mode '{}' is not valid, supported modes: {}",
            flavor.name,
            config.mode,
            flavor.modes.join(", ")
        )));
    }
    if let (Some(spec), Some(flag)) = (&flavor.flag, &config.flag)
        && !flavor.supports_flag(flag)
    {
        return Err(DriverError::invalid(format!(
            "requested {} flag '{}' is not valid, supported flags: {}",
            flavor.name,
            flag,
            spec.values.join(", ")
        )));
    }

    if let Some(other) = networks
        .values()
        .find(|n| n.config.id != config.id && n.config.parent == config.parent)
    {
        return Err(DriverError::ParentInUse {
            parent: config.parent.clone(),
            network_id: other.config.id.clone(),
        });
    }
    Ok(())
}

fn validate_ifname(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= IFNAME_MAX
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == ':' || c.is_whitespace());
    if !valid {
        return Err(DriverError::invalid(format!(
            "invalid interface name {name:?}"
        )));
    }
    Ok(())
}

/// A parent of the form `eth0.10` is a VLAN sub-interface the driver creates.
fn is_vlan_parent(parent: &str) -> Result<bool> {
    let Some((link, vid)) = parent.rsplit_once('.') else {
        return Ok(false);
    };
    if link.is_empty() || vid.is_empty() || !vid.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    match vid.parse::<u16>() {
        Ok(1..=4094) => Ok(true),
        _ => Err(DriverError::invalid(format!(
            "vlan id out of range in parent {parent:?}, valid range is 1-4094"
        ))),
    }
}

fn dummy_name(id: &str) -> String {
    let end = id.char_indices().nth(DUMMY_ID_LEN).map_or(id.len(), |(i, _)| i);
    format!("dm-{}", &id[..end])
}

fn link_name(flavor: &Flavor) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", flavor.link_prefix, &suffix[..LINK_SUFFIX_LEN])
}

fn subnets_from_ipam(data: &[IpamData], v6: bool) -> Result<Vec<IpSubnet>> {
    let family = if v6 { "IPv6" } else { "IPv4" };
    let same_family = |net: &IpNet| matches!(net, IpNet::V6(_)) == v6;

    data.iter()
        .map(|ipam| {
            if !same_family(&ipam.pool) {
                return Err(DriverError::invalid(format!(
                    "pool {} is not an {family} subnet",
                    ipam.pool
                )));
            }
            if let Some(gw) = &ipam.gateway
                && (!same_family(gw) || !ipam.pool.contains(&gw.addr()))
            {
                return Err(DriverError::invalid(format!(
                    "gateway {gw} is not inside pool {}",
                    ipam.pool
                )));
            }
            Ok(IpSubnet {
                subnet: ipam.pool.trunc(),
                gateway: ipam.gateway,
            })
        })
        .collect()
}

fn check_in_subnets(subnets: &[IpSubnet], addr: IpAddr) -> Result<()> {
    if subnets.is_empty() || subnets.iter().any(|s| s.contains(addr)) {
        return Ok(());
    }
    Err(DriverError::invalid(format!(
        "address {addr} is not in any subnet of the network"
    )))
}
