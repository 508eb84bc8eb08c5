use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, ExchangeResult};

/// Evaluated right before the partitioner builds the buckets of a cycle.
pub const COORDINATOR_BEFORE_BUILD: &str = "coordinator.before_build";

/// Evaluated right before the coordinator awaits more upstream data.
pub const COORDINATOR_BEFORE_LOAD: &str = "coordinator.before_load";

/// Returns an injected error when the failpoint `name` is configured to return.
///
/// The optional failpoint parameter selects the error kind: `partition` for a partitioning
/// failure, anything else for an upstream failure.
pub fn exchange_fail_point(name: &str) -> ExchangeResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("partition") => ErrorKind::InjectedPartitionFault,
            _ => ErrorKind::InjectedUpstreamFault,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
