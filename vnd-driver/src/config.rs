//! Driver configuration.

/// Default number of rebased retries after a version-stamp conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Tunables shared by the persistent drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// How many times a conflicting update is re-put on top of the stored
    /// version stamp before the conflict is returned. Zero disables retries.
    pub conflict_retries: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl DriverConfig {
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }
}
