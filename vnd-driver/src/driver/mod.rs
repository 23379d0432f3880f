//! Network drivers.

mod host;
mod persist;
mod restore;
mod vlan;

pub use host::{HostDriver, HostState};
pub use persist::{store_delete, store_update};
pub use restore::RestoreReport;
pub use vlan::VlanDriver;

use crate::error::Result;
use crate::options::{EndpointInterface, GenericOptions, IpamData};

/// Lifecycle operations every driver exposes to the network controller.
pub trait NetworkDriver: Send + Sync {
    /// Driver type name, e.g. `macvlan`.
    fn network_type(&self) -> &'static str;

    fn create_network(
        &self,
        id: &str,
        options: &GenericOptions,
        ipv4_data: &[IpamData],
        ipv6_data: &[IpamData],
    ) -> Result<()>;

    fn delete_network(&self, id: &str) -> Result<()>;

    fn create_endpoint(&self, nid: &str, eid: &str, iface: &EndpointInterface) -> Result<()>;

    fn delete_endpoint(&self, nid: &str, eid: &str) -> Result<()>;
}

/// First seven characters of an id, for log lines.
pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices().nth(7).map_or(id, |(i, _)| &id[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("3f2a9c1e8b7d"), "3f2a9c1");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }
}
