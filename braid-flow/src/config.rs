//! Distributor configuration.

use crate::error::{FlowError, FlowResult};

/// Configuration for the weighted fair distributor.
#[derive(Debug, Clone, Copy)]
pub struct DistributorConfig {
    /// Minimum byte allotment per scheduling step.
    ///
    /// Amortizes per-write overhead and guarantees forward progress for
    /// low-weight streams. Must be positive.
    pub allocation_quantum: u32,

    /// Maximum number of closed or never-opened streams whose priority
    /// state is retained so late PRIORITY frames still take effect.
    ///
    /// `0` disables retention entirely: PRIORITY frames naming unknown
    /// streams are dropped.
    pub max_state_only_size: u32,
}

impl DistributorConfig {
    /// Creates a new distributor configuration.
    ///
    /// # Arguments
    ///
    /// * `allocation_quantum` - Minimum bytes allotted per scheduling step.
    /// * `max_state_only_size` - Retained priority-only stream capacity.
    #[must_use]
    pub const fn new(allocation_quantum: u32, max_state_only_size: u32) -> Self {
        Self {
            allocation_quantum,
            max_state_only_size,
        }
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            allocation_quantum: 100,
            max_state_only_size: 5,
        }
    }

    /// Validates that the configuration is usable.
    ///
    /// # Errors
    /// Returns [`FlowError::InvalidConfig`] if the allocation quantum is zero.
    pub fn validate(&self) -> FlowResult<()> {
        if self.allocation_quantum == 0 {
            return Err(FlowError::InvalidConfig {
                name: "allocation_quantum",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            allocation_quantum: 1024,
            max_state_only_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DistributorConfig::default().validate().is_ok());
        assert!(DistributorConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_zero_quantum_rejected() {
        let config = DistributorConfig::new(0, 5);
        assert!(matches!(
            config.validate(),
            Err(FlowError::InvalidConfig { name: "allocation_quantum", .. })
        ));
    }

    #[test]
    fn test_zero_retention_is_valid() {
        assert!(DistributorConfig::new(1024, 0).validate().is_ok());
    }
}
