use crate::codec::BuildResult;
use crate::decoder::DecodeState;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A text argument is longer than a single argument may be.
    #[error("string argument too long ({len} bytes, max {max})")]
    StringLengthOverflow { len: usize, max: usize },

    /// A byte-array argument is longer than a single argument may be.
    #[error("byte array argument too long ({len} bytes, max {max})")]
    ByteArrayLengthOverflow { len: usize, max: usize },

    /// Command plus encoded arguments exceed the text length limit.
    #[error("frame text too long ({len} bytes, max {max})")]
    DataTotalLengthOverflow { len: usize, max: usize },

    /// An argument has no wire encoding.
    #[error("no encoding for {0} arguments")]
    DataTypeNotImplemented(String),

    /// The command does not fit in one byte.
    #[error("command value {0} out of range (0..=255)")]
    CommandValueOverflow(i64),

    /// A message that failed to build was handed to a writer.
    #[error("message was not built successfully ({0:?})")]
    NotBuilt(BuildResult),

    /// A `kind:value` literal could not be parsed into a typed value.
    #[error("invalid value literal '{literal}': {reason}")]
    InvalidLiteral { literal: String, reason: String },

    /// The byte stream violates the frame layout.
    #[error("malformed frame in state {state:?}: {kind}")]
    Malformed {
        state: DecodeState,
        kind: ParseErrorKind,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was transferred.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// The build result code for an encoder-side failure.
    ///
    /// Returns `None` for decode and I/O errors.
    pub fn build_result(&self) -> Option<BuildResult> {
        match self {
            FrameError::StringLengthOverflow { .. } => Some(BuildResult::StringLengthOverflow),
            FrameError::ByteArrayLengthOverflow { .. } => {
                Some(BuildResult::ByteArrayLengthOverflow)
            }
            FrameError::DataTotalLengthOverflow { .. } => {
                Some(BuildResult::DataTotalLengthOverflow)
            }
            FrameError::DataTypeNotImplemented(_) => Some(BuildResult::DataTypeNotImplemented),
            FrameError::CommandValueOverflow(_) => Some(BuildResult::CommandValueOverflow),
            FrameError::NotBuilt(result) => Some(*result),
            _ => None,
        }
    }

    /// True for structural decode failures.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FrameError::Malformed { .. })
    }
}

/// What exactly was wrong with a malformed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("expected marker 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedMarker { expected: u8, found: u8 },

    #[error("unknown length tag 0x{0:02X}")]
    UnknownLengthTag(u8),

    #[error("declared text length {len} exceeds limit {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("declared text length is zero")]
    EmptyText,

    #[error("unknown value tag 0x{0:02X}")]
    UnknownValueTag(u8),

    #[error("argument runs past the end of the text region")]
    Truncated,

    #[error("text argument is not valid UTF-8")]
    InvalidText,

    #[error("checksum mismatch (computed 0x{expected:02X}, received 0x{found:02X})")]
    ChecksumMismatch { expected: u8, found: u8 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
