use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::NetworkDriver;
use crate::error::{DriverError, Result};
use crate::options::{EndpointInterface, GenericOptions, IpamData};

pub const HOST_NETWORK_TYPE: &str = "host";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostState {
    Empty,
    /// Bound to the one network it will ever serve.
    Bound(String),
}

/// Driver for the host network namespace. Exactly one network can exist and
/// it can never be deleted. Nothing is persisted.
#[derive(Debug)]
pub struct HostDriver {
    state: Mutex<HostState>,
}

impl Default for HostDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState::Empty),
        }
    }

    pub fn state(&self) -> HostState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NetworkDriver for HostDriver {
    fn network_type(&self) -> &'static str {
        HOST_NETWORK_TYPE
    }

    fn create_network(
        &self,
        id: &str,
        _options: &GenericOptions,
        _ipv4_data: &[IpamData],
        _ipv6_data: &[IpamData],
    ) -> Result<()> {
        let mut state = self.lock();
        if let HostState::Bound(existing) = &*state {
            debug!(network_id = %id, existing = %existing, "Rejecting second host network");
            return Err(DriverError::Forbidden(
                "only one instance of \"host\" network is allowed".to_string(),
            ));
        }
        *state = HostState::Bound(id.to_string());
        debug!(network_id = %id, "Host network bound");
        Ok(())
    }

    fn delete_network(&self, _id: &str) -> Result<()> {
        Err(DriverError::Forbidden(
            "network of type \"host\" cannot be deleted".to_string(),
        ))
    }

    fn create_endpoint(&self, _nid: &str, _eid: &str, _iface: &EndpointInterface) -> Result<()> {
        Ok(())
    }

    fn delete_endpoint(&self, _nid: &str, _eid: &str) -> Result<()> {
        Ok(())
    }
}
