//! Rebuilding a driver's in-memory index from its persisted records.

use tracing::{debug, error, info, warn};
use vnd_store::{KvObject, ObjectStore};

use super::persist::store_delete;
use super::short_id;
use super::vlan::{Network, NetworkIndex, VlanDriver, validate_network};
use crate::error::{DriverError, Result};
use crate::record::{Endpoint, NetworkConfig};

/// Counters describing one restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub networks_restored: usize,
    /// Already present in memory, or rejected on reconstruction.
    pub networks_skipped: usize,
    pub endpoints_restored: usize,
    /// Endpoints whose network is gone, removed from the store.
    pub endpoints_purged: usize,
    /// Orphaned endpoints that could not be removed from the store.
    pub purge_failures: usize,
    /// Records of either kind that failed to decode.
    pub undecodable: usize,
}

impl VlanDriver {
    /// Load persisted networks, then persisted endpoints, into the index.
    ///
    /// Endpoints whose network did not survive are deleted from the store.
    /// Running it again is harmless: known networks are left alone.
    pub fn restore(&self) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let Some(store) = self.store() else {
            debug!(driver = self.flavor.name, "No store configured, nothing to restore");
            return Ok(report);
        };

        let mut networks = self.lock();
        self.populate_networks(store, &mut networks, &mut report)?;
        self.populate_endpoints(store, &mut networks, &mut report)?;

        info!(
            driver = self.flavor.name,
            networks_restored = report.networks_restored,
            networks_skipped = report.networks_skipped,
            endpoints_restored = report.endpoints_restored,
            endpoints_purged = report.endpoints_purged,
            purge_failures = report.purge_failures,
            undecodable = report.undecodable,
            "Restore complete"
        );
        Ok(report)
    }

    fn populate_networks(
        &self,
        store: &ObjectStore,
        networks: &mut NetworkIndex,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let proto = NetworkConfig::empty(self.flavor);
        let entries = match store.scan(&proto) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(driver = self.flavor.name, "No persisted networks");
                return Ok(());
            }
            Err(e) => {
                return Err(DriverError::store(
                    "list",
                    proto.kind(),
                    store.key_of(&proto.key_prefix()),
                    e,
                ));
            }
        };

        for entry in entries {
            let key = entry.key.clone();
            let config = match entry.downcast::<NetworkConfig>(proto.kind()) {
                Ok(config) => config,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable network record");
                    report.undecodable += 1;
                    continue;
                }
            };

            if networks.contains_key(&config.id) {
                debug!(network_id = %short_id(&config.id), "Network already restored");
                report.networks_skipped += 1;
                continue;
            }

            if let Err(e) = validate_network(self.flavor, networks, &config) {
                error!(
                    network_id = %config.id,
                    error = %e,
                    "Could not create {} network from persistent state",
                    self.flavor.name
                );
                report.networks_skipped += 1;
                continue;
            }

            debug!(network_id = %short_id(&config.id), "Network restored");
            networks.insert(config.id.clone(), Network::new(config));
            report.networks_restored += 1;
        }

        Ok(())
    }

    fn populate_endpoints(
        &self,
        store: &ObjectStore,
        networks: &mut NetworkIndex,
        report: &mut RestoreReport,
    ) -> Result<()> {
        let proto = Endpoint::empty(self.flavor);
        let entries = match store.scan(&proto) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => {
                debug!(driver = self.flavor.name, "No persisted endpoints");
                return Ok(());
            }
            Err(e) => {
                return Err(DriverError::store(
                    "list",
                    proto.kind(),
                    store.key_of(&proto.key_prefix()),
                    e,
                ));
            }
        };

        for entry in entries {
            let key = entry.key.clone();
            let endpoint = match entry.downcast::<Endpoint>(proto.kind()) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable endpoint record");
                    report.undecodable += 1;
                    continue;
                }
            };

            let Some(network) = networks.get_mut(&endpoint.nid) else {
                debug!(
                    network_id = %short_id(&endpoint.nid),
                    endpoint_id = %short_id(&endpoint.id),
                    "Network not found for restored endpoint"
                );
                debug!(
                    endpoint_id = %short_id(&endpoint.id),
                    "Deleting stale {} endpoint",
                    self.flavor.name
                );
                match store_delete(Some(store), &endpoint) {
                    Ok(()) => report.endpoints_purged += 1,
                    Err(e) => {
                        error!(endpoint_id = %endpoint.id, error = %e, "Failed to delete stale endpoint");
                        report.purge_failures += 1;
                    }
                }
                continue;
            };

            debug!(
                endpoint_id = %short_id(&endpoint.id),
                network_id = %short_id(&endpoint.nid),
                "Endpoint restored to network"
            );
            network.endpoints.insert(endpoint.id.clone(), endpoint);
            report.endpoints_restored += 1;
        }

        Ok(())
    }
}
