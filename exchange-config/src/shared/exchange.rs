use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{DistributionConfig, ValidationError};

/// Top-level configuration of a process hosting result exchanges.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExchangeConfig {
    /// Flush thresholds and scheduling bounds for every distribution operation.
    #[serde(default)]
    pub distribution: DistributionConfig,
}

impl ExchangeConfig {
    /// Validates every nested section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.distribution.validate()
    }
}

impl Config for ExchangeConfig {}
