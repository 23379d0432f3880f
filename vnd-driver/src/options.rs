//! Parsing of the generic options and IPAM data handed to a driver.

use std::collections::BTreeMap;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::error::{DriverError, Result};
use crate::flavor::Flavor;
use crate::mac::MacAddress;

/// Parent interface option.
pub const PARENT: &str = "parent";

/// MTU option.
pub const MTU: &str = "com.docker.network.driver.mtu";

/// Internal (no external connectivity) option.
pub const INTERNAL: &str = "com.docker.network.internal";

/// Free-form key/value options supplied when a network is created.
pub type GenericOptions = BTreeMap<String, String>;

/// Options a VLAN-style driver understands. Unknown options are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkOptions {
    pub parent: Option<String>,
    pub mode: Option<String>,
    pub flag: Option<String>,
    pub mtu: Option<u32>,
    pub internal: bool,
}

impl NetworkOptions {
    pub fn parse(flavor: &Flavor, options: &GenericOptions) -> Result<Self> {
        let mut parsed = NetworkOptions::default();

        for (key, value) in options {
            match key.as_str() {
                PARENT => parsed.parent = non_empty(value),
                MTU => {
                    let mtu = value
                        .parse::<u32>()
                        .map_err(|_| DriverError::invalid(format!("invalid MTU {value:?}")))?;
                    parsed.mtu = Some(mtu);
                }
                INTERNAL => parsed.internal = parse_bool(INTERNAL, value)?,
                k if k == flavor.mode_option => parsed.mode = non_empty(value),
                k if flavor.flag.as_ref().is_some_and(|f| f.option == k) => {
                    parsed.flag = non_empty(value)
                }
                _ => {}
            }
        }

        Ok(parsed)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "" | "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(DriverError::invalid(format!(
            "invalid boolean {other:?} for option {key}"
        ))),
    }
}

/// One address pool assigned to a network by IPAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpamData {
    pub pool: IpNet,
    /// Gateway address with the pool's prefix length, e.g. `10.0.0.1/24`.
    pub gateway: Option<IpNet>,
}

impl IpamData {
    pub fn new(pool: IpNet, gateway: Option<IpNet>) -> Self {
        Self { pool, gateway }
    }
}

/// Interface description passed to endpoint creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInterface {
    pub mac: Option<MacAddress>,
    pub addr: Option<Ipv4Net>,
    pub addrv6: Option<Ipv6Net>,
    /// Name of the link inside the host; generated when absent.
    pub src_name: Option<String>,
}
