use thiserror::Error;

/// Failures reported to the caller of a forward or backward operation.
///
/// Layout mismatches between a forward arena and its backward call are not
/// represented here; they panic.
#[derive(Debug, Error)]
pub enum LstmError {
    /// Shape, rank or dtype contract violated at entry. No work was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The device failed while executing the issued work.
    #[error("device failure: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, LstmError>;

/// Return early with [`LstmError::InvalidArgument`] unless `cond` holds.
macro_rules! ensure_arg {
    ($cond:expr, $($fmt:tt)+) => {
        if !$cond {
            return Err($crate::error::LstmError::InvalidArgument(format!($($fmt)+)));
        }
    };
}

pub(crate) use ensure_arg;
