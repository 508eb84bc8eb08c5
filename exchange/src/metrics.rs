//! Metric names and labels recorded by distribution operations.

/// Label for the outcome of a finished operation.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the kind of an error.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Counter of flush cycles sent to downstream targets.
pub const EXCHANGE_FLUSH_CYCLES_TOTAL: &str = "exchange_flush_cycles_total";

/// Counter of rows pulled from upstream sources.
pub const EXCHANGE_ROWS_PULLED_TOTAL: &str = "exchange_rows_pulled_total";

/// Counter of pushes sent to downstream targets, data and failure notices alike.
pub const EXCHANGE_PUSHES_TOTAL: &str = "exchange_pushes_total";

/// Counter of pushes that resolved with an error.
pub const EXCHANGE_PUSH_FAILURES_TOTAL: &str = "exchange_push_failures_total";

/// Counter of failure notices sent to downstream targets.
pub const EXCHANGE_FAILURE_NOTICES_TOTAL: &str = "exchange_failure_notices_total";

/// Counter of finished operations, labeled by outcome.
pub const EXCHANGE_OPERATIONS_FINISHED_TOTAL: &str = "exchange_operations_finished_total";

/// Gauge of operations currently distributing rows.
pub const EXCHANGE_ACTIVE_OPERATIONS: &str = "exchange_active_operations";
