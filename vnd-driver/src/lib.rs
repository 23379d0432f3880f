//! vnd-driver: virtual network drivers that survive restarts.
//!
//! [`VlanDriver`] implements macvlan and ipvlan networks on top of a
//! [`vnd_store::ObjectStore`]. Every network and endpoint it creates is
//! persisted, and [`VlanDriver::init`] rebuilds the in-memory index from the
//! store, purging endpoints whose network is gone. [`HostDriver`] serves the
//! single host network and keeps no state on disk.

pub mod config;
pub mod driver;
pub mod error;
pub mod flavor;
pub mod mac;
pub mod options;
pub mod record;

pub use config::DriverConfig;
pub use driver::{
    HostDriver, HostState, NetworkDriver, RestoreReport, VlanDriver, store_delete, store_update,
};
pub use error::{DriverError, Result};
pub use flavor::{Flavor, IPVLAN, MACVLAN};
pub use mac::MacAddress;
pub use options::{EndpointInterface, GenericOptions, IpamData, NetworkOptions};
pub use record::{Endpoint, IpSubnet, NetworkConfig};
