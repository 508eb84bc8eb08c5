//! Macros for building and returning [`crate::error::ExchangeError`] values.

/// Creates an [`crate::error::ExchangeError`] from an error kind and static description.
///
/// An optional third argument adds dynamic detail (anything implementing `ToString`, or an owned
/// [`String`] moved with `detail =`), and a trailing `source:` attaches the originating error.
#[macro_export]
macro_rules! exchange_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ExchangeError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Creates an [`crate::error::ExchangeError`] and returns it from the current function.
///
/// Accepts the same arguments as [`exchange_error!`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)+) => {
        return ::core::result::Result::Err($crate::exchange_error!($($arg)+))
    };
}
