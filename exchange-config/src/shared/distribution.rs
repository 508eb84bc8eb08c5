use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Flush and scheduling configuration of a distribution operation.
///
/// A flush cycle is triggered as soon as either threshold is reached, so `page_size` bounds the
/// number of buffered rows and `max_bucket_bytes` bounds the worst-case memory held per cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DistributionConfig {
    /// Maximum number of rows accumulated before a flush cycle.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum estimated bytes accumulated before a flush cycle.
    #[serde(default = "default_max_bucket_bytes")]
    pub max_bucket_bytes: usize,
    /// Maximum number of consecutive cycles continued inline on the pulling task before the
    /// continuation is rescheduled onto the runtime.
    #[serde(default = "default_max_inline_cycles")]
    pub max_inline_cycles: usize,
}

impl DistributionConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 4096;

    pub const DEFAULT_MAX_BUCKET_BYTES: usize = 8 * 1024 * 1024;

    pub const DEFAULT_MAX_INLINE_CYCLES: usize = 16;

    /// Validates that every threshold is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("distribution.page_size", self.page_size),
            ("distribution.max_bucket_bytes", self.max_bucket_bytes),
            ("distribution.max_inline_cycles", self.max_inline_cycles),
        ];

        for (field, value) in fields {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_bucket_bytes: default_max_bucket_bytes(),
            max_inline_cycles: default_max_inline_cycles(),
        }
    }
}

fn default_page_size() -> usize {
    DistributionConfig::DEFAULT_PAGE_SIZE
}

fn default_max_bucket_bytes() -> usize {
    DistributionConfig::DEFAULT_MAX_BUCKET_BYTES
}

fn default_max_inline_cycles() -> usize {
    DistributionConfig::DEFAULT_MAX_INLINE_CYCLES
}
