// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments or profile contents
    InvalidArgs(String),
    /// Device profile file not found or unreadable
    ProfileNotFound(String),
    /// The codec framework refused an operation
    Codec(String),
    /// Operation timed out
    Timeout(String),
    /// Anything else
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::ProfileNotFound(msg) => write!(f, "Profile not found: {}", msg),
            CliError::Codec(msg) => write!(f, "Codec error: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::InvalidArgs(_) => ExitCode::from(2),
            CliError::ProfileNotFound(_) => ExitCode::from(3),
            CliError::Codec(_) => ExitCode::from(4),
            CliError::Timeout(_) => ExitCode::from(6),
            CliError::General(_) => ExitCode::from(1),
        }
    }
}

/// Map m2m_codec::Error to CliError with appropriate exit codes
impl From<m2m_codec::Error> for CliError {
    fn from(err: m2m_codec::Error) -> Self {
        use m2m_codec::Error;

        match err {
            // The user asked for something the profile does not offer
            Error::UnsupportedFormat(_) | Error::InvalidArgument(_) => {
                CliError::InvalidArgs(err.to_string())
            }

            // A broken profile cannot bring the codec up
            Error::InvalidConfiguration(msg) => {
                CliError::InvalidArgs(format!("profile rejected: {}", msg))
            }

            Error::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut => {
                    CliError::Timeout(format!("Operation timed out: {}", io_err))
                }
                _ => CliError::General(format!("I/O error: {}", io_err)),
            },

            Error::NotFound(_) | Error::Busy(_) | Error::ResourceExhausted(_) => {
                CliError::Codec(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::General(format!("Failed to serialize JSON: {}", err))
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m2m_codec::format::BufType;
    use m2m_codec::fourcc::FourCC;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            CliError::InvalidArgs("test".into()).exit_code(),
            ExitCode::from(2)
        );
        assert_eq!(
            CliError::ProfileNotFound("test".into()).exit_code(),
            ExitCode::from(3)
        );
        assert_eq!(CliError::Codec("test".into()).exit_code(), ExitCode::from(4));
        assert_eq!(
            CliError::Timeout("test".into()).exit_code(),
            ExitCode::from(6)
        );
        assert_eq!(
            CliError::General("test".into()).exit_code(),
            ExitCode::from(1)
        );
    }

    #[test]
    fn test_codec_error_mapping() {
        let err: CliError = m2m_codec::Error::UnsupportedFormat(FourCC::MJPEG).into();
        assert!(matches!(err, CliError::InvalidArgs(_)));

        let err: CliError = m2m_codec::Error::Busy(BufType::VideoCapture).into();
        assert_eq!(format!("{}", err), "Codec error: capture queue is busy");
    }
}
