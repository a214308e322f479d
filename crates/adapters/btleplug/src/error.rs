//! btleplug adapter error types.

use blepoll_app::ports::RadioError;

/// Errors raised by the btleplug adapter.
#[derive(Debug, thiserror::Error)]
pub enum BtleplugError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A btleplug call failed.
    #[error("BLE operation failed: {0}")]
    Ble(#[from] btleplug::Error),
}

impl From<BtleplugError> for RadioError {
    fn from(err: BtleplugError) -> Self {
        match err {
            BtleplugError::NotAvailable => Self::NotAvailable,
            other @ BtleplugError::Ble(_) => Self::backend(other),
        }
    }
}

/// Shorthand for `map_err` on raw btleplug results.
pub(crate) fn radio(err: btleplug::Error) -> RadioError {
    BtleplugError::Ble(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_available() {
        let err = BtleplugError::NotAvailable;
        assert_eq!(err.to_string(), "no BLE adapter available");
    }

    #[test]
    fn should_include_cause_in_ble_error_message() {
        let err = BtleplugError::Ble(btleplug::Error::DeviceNotFound);
        assert!(err.to_string().starts_with("BLE operation failed: "));
    }

    #[test]
    fn should_map_not_available_to_radio_not_available() {
        let err: RadioError = BtleplugError::NotAvailable.into();
        assert!(matches!(err, RadioError::NotAvailable));
    }

    #[test]
    fn should_wrap_ble_failures_as_backend_errors() {
        let err = radio(btleplug::Error::NotConnected);
        assert!(matches!(err, RadioError::Backend(_)));
    }
}
