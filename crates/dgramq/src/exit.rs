use std::fmt;

use dgramq_core::DatagramError;

// Process exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn queue_error(context: &str, err: DatagramError) -> CliError {
    let code = match &err {
        DatagramError::InvalidConfig(_) => USAGE,
        DatagramError::TooLarge { .. } => DATA_INVALID,
        DatagramError::DeadlineExceeded => TIMEOUT,
        DatagramError::Closed(_) | DatagramError::Expired | DatagramError::Rejected(_) => FAILURE,
        DatagramError::Cancelled => INTERRUPTED,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_config_errors_to_usage() {
        let err = queue_error(
            "bad flags",
            DatagramError::InvalidConfig("receive_capacity must be greater than zero".into()),
        );
        assert_eq!(err.code, USAGE);
        assert!(err.to_string().starts_with("bad flags: invalid queue config"));
    }

    #[test]
    fn maps_oversized_payload_to_data_invalid() {
        let err = queue_error("submit", DatagramError::TooLarge { size: 10, max: 5 });
        assert_eq!(err.code, DATA_INVALID);
    }
}
