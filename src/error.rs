//! Error types for avrecord

use thiserror::Error;

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Recorder error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Allocation of an internal buffer, frame or context failed
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// Encoder could not be found, opened, or rejected a frame
    #[error("Codec error: {0}")]
    NoCodec(String),

    /// Container open/header/packet/trailer write failed
    #[error("File write error: {0}")]
    FileWrite(String),

    #[error("Already recording")]
    AlreadyRecording,

    /// Destination extension does not map to a known container
    #[error("Cannot guess container format for {0}")]
    FormatGuess(String),

    /// Audio accumulation buffer would exceed its fixed capacity
    #[error("Audio buffer overflow: {needed} samples pushed, {available} free")]
    BufferOverflow { needed: usize, available: usize },

    /// Caller passed a buffer or parameter that does not match the session
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Result code for this error
    pub fn code(&self) -> ResultCode {
        match self {
            Error::NoMemory(_) => ResultCode::NoMemory,
            Error::NoCodec(_) => ResultCode::NoCodec,
            Error::FileWrite(_) => ResultCode::FileWriteError,
            Error::AlreadyRecording => ResultCode::AlreadyRecording,
            Error::FormatGuess(_) => ResultCode::FormatGuessFailed,
            Error::BufferOverflow { .. } => ResultCode::BufferOverflow,
            Error::InvalidInput(_) => ResultCode::InvalidInput,
        }
    }

    /// Fatal errors leave the session usable only for `stop`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoMemory(_) | Error::FileWrite(_) | Error::BufferOverflow { .. }
        )
    }

    /// The caller may retry with different parameters
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

/// Flat result code shared by all mutating recorder operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    NoMemory,
    NoCodec,
    FileWriteError,
    AlreadyRecording,
    FormatGuessFailed,
    BufferOverflow,
    InvalidInput,
}

impl ResultCode {
    /// Collapse an operation result into its code
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Ok,
            Err(e) => e.code(),
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == ResultCode::Ok
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Ok => "ok",
            ResultCode::NoMemory => "no memory",
            ResultCode::NoCodec => "no codec",
            ResultCode::FileWriteError => "file write error",
            ResultCode::AlreadyRecording => "already recording",
            ResultCode::FormatGuessFailed => "format guess failed",
            ResultCode::BufferOverflow => "buffer overflow",
            ResultCode::InvalidInput => "invalid input",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::NoMemory("frame".into()).is_fatal());
        assert!(Error::FileWrite("disk full".into()).is_fatal());
        assert!(Error::BufferOverflow { needed: 10, available: 2 }.is_fatal());

        assert!(Error::AlreadyRecording.is_recoverable());
        assert!(Error::FormatGuess("out.xyz".into()).is_recoverable());
        assert!(Error::NoCodec("mpeg4".into()).is_recoverable());
    }

    #[test]
    fn test_result_code_of() {
        let ok: Result<()> = Ok(());
        assert_eq!(ResultCode::of(&ok), ResultCode::Ok);

        let err: Result<()> = Err(Error::FormatGuess("capture".into()));
        assert_eq!(ResultCode::of(&err), ResultCode::FormatGuessFailed);
        assert!(!ResultCode::of(&err).is_ok());
    }
}
