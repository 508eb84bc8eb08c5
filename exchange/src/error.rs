//! Error types and result definitions for exchange operations.
//!
//! Every error reaching a distribution operation is terminal for the whole operation. The first
//! one observed is recorded and later handed, by clone, to every downstream still waiting and to
//! the caller awaiting completion, so [`ExchangeError`] is cheap to clone and carries its source
//! behind an [`Arc`].

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use exchange_config::shared::ValidationError;
use tokio::sync::oneshot;

/// Convenient result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for exchange operations.
#[derive(Debug, Clone)]
pub struct ExchangeError {
    payload: Box<ErrorPayload>,
}

/// Classification of the failures a distribution operation can observe.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Upstream errors
    UpstreamFailed,
    PartitionFailed,

    // Downstream errors
    TransportFailed,
    TransportPanic,

    // Lifecycle errors
    OperationCanceled,
    InvalidState,

    // Configuration errors
    ConfigError,

    // Kinds raised only by fault injection in tests.
    #[cfg(feature = "failpoints")]
    InjectedUpstreamFault,
    #[cfg(feature = "failpoints")]
    InjectedPartitionFault,
}

impl ErrorKind {
    /// Returns a stable label for this kind, suitable for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::UpstreamFailed => "upstream_failed",
            ErrorKind::PartitionFailed => "partition_failed",
            ErrorKind::TransportFailed => "transport_failed",
            ErrorKind::TransportPanic => "transport_panic",
            ErrorKind::OperationCanceled => "operation_canceled",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::ConfigError => "config_error",
            #[cfg(feature = "failpoints")]
            ErrorKind::InjectedUpstreamFault => "injected_upstream_fault",
            #[cfg(feature = "failpoints")]
            ErrorKind::InjectedPartitionFault => "injected_partition_fault",
        }
    }
}

impl ExchangeError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Returns `true` when the error originates from an explicit cancellation.
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::OperationCanceled
    }

    /// Returns `true` when the error was raised while producing rows.
    ///
    /// Partitioning failures happen on the pulling side and are classified as upstream errors.
    pub fn is_upstream(&self) -> bool {
        match self.kind() {
            ErrorKind::UpstreamFailed | ErrorKind::PartitionFailed => true,
            #[cfg(feature = "failpoints")]
            ErrorKind::InjectedUpstreamFault | ErrorKind::InjectedPartitionFault => true,
            _ => false,
        }
    }

    /// Returns `true` when the error was raised by a downstream push.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransportFailed | ErrorKind::TransportPanic
        )
    }

    /// Attaches an originating error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        ExchangeError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
            }),
        }
    }
}

impl PartialEq for ExchangeError {
    /// Errors compare equal when their kind and description match.
    fn eq(&self, other: &ExchangeError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            payload.location.file(),
            payload.location.line(),
            payload.location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for ExchangeError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ExchangeError {
        ExchangeError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for ExchangeError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ExchangeError {
        ExchangeError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

impl From<ValidationError> for ExchangeError {
    #[track_caller]
    fn from(err: ValidationError) -> ExchangeError {
        let detail = err.to_string();
        ExchangeError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid distribution configuration"),
            Some(Cow::Owned(detail)),
        )
        .with_source(err)
    }
}

impl From<oneshot::error::RecvError> for ExchangeError {
    #[track_caller]
    fn from(err: oneshot::error::RecvError) -> ExchangeError {
        ExchangeError::from_components(
            ErrorKind::InvalidState,
            Cow::Borrowed("Distribution operation dropped before completing"),
            None,
        )
        .with_source(err)
    }
}
