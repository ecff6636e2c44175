//! Display Data Channel helpers
//!
//! Address constants, EDID parsing and a checked byte channel on top of the
//! raw [`I2cService`](crate::service::I2cService). DDC/CI framing is left to
//! the caller.

/// checked transfers against a display
pub mod channel;

/// well known DDC and E-DDC addresses
pub mod eddc;

/// edid data parsing
pub mod edid;

use thiserror::Error;

use self::edid::EdidParseError;
use crate::service::{IoReturn, StatusCategory};

#[derive(Error, Debug)]
pub enum I2cError {
    #[error("transfer of {len} bytes exceeds the limit of {max} bytes")]
    TransferTooLarge { len: usize, max: usize },
    #[error("read of zero bytes requested")]
    EmptyRead,
    #[error("I2C read failed with status {0}")]
    ReadFailed(IoReturn),
    #[error("I2C write failed with status {0}")]
    WriteFailed(IoReturn),
    #[error("Error Parsing Edid Data {0}")]
    EdidParseError(#[from] EdidParseError),
}

impl I2cError {
    /// platform status of a failed transfer
    pub fn status(&self) -> Option<IoReturn> {
        match self {
            I2cError::ReadFailed(status) | I2cError::WriteFailed(status) => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<StatusCategory> {
        self.status().map(|status| status.category())
    }

    /// The channel is gone and the service handle should be dropped.
    pub fn is_permanent(&self) -> bool {
        self.category() == Some(StatusCategory::Permanent)
    }
}

#[cfg(test)]
mod test {
    use super::I2cError;
    use crate::service::{IoReturn, StatusCategory};

    #[test]
    fn status_of_transfer_errors() {
        let err = I2cError::ReadFailed(IoReturn::NO_DEVICE);
        assert_eq!(err.status(), Some(IoReturn::NO_DEVICE));
        assert!(err.is_permanent());

        let err = I2cError::WriteFailed(IoReturn::TIMEOUT);
        assert_eq!(err.category(), Some(StatusCategory::Transient));
        assert!(!err.is_permanent());

        let err = I2cError::TransferTooLarge { len: 200, max: 128 };
        assert_eq!(err.status(), None);
        assert_eq!(
            err.to_string(),
            "transfer of 200 bytes exceeds the limit of 128 bytes"
        );
    }
}
