use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::value::{length_width, TypedValue};

/// Start of frame.
pub const SOH: u8 = 0x01;
/// Start of text region.
pub const STX: u8 = 0x02;
/// End of text region.
pub const ETX: u8 = 0x03;
/// End of frame.
pub const EOT: u8 = 0x04;

/// Length-field family (high nibble); the low nibble is the field width.
pub const LENGTH: u8 = 0x10;

/// Maximum text length (command byte plus encoded arguments).
pub const TEXT_MAX_LEN: usize = i32::MAX as usize - 10;

/// A decoded frame: one command byte plus ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: u8,
    pub args: Vec<TypedValue>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u8, args: impl Into<Vec<TypedValue>>) -> Self {
        Self {
            command,
            args: args.into(),
        }
    }

    /// Length of the text region (command byte plus encoded arguments).
    pub fn text_len(&self) -> usize {
        text_len(&self.args)
    }

    /// Total wire size of this frame, markers and checksum included.
    pub fn wire_size(&self) -> usize {
        let text_len = self.text_len();
        // SOH, length tag, length field, STX, text, ETX, checksum, EOT
        1 + 1 + length_width(text_len) + 1 + text_len + 1 + 1 + 1
    }
}

fn text_len(args: &[TypedValue]) -> usize {
    1 + args.iter().map(TypedValue::encoded_len).sum::<usize>()
}

/// XOR of every byte in the text region.
pub fn checksum(text: &[u8]) -> u8 {
    text.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────┬─────────┬───────────┬─────┬─────────┬────────┬─────┬──────────┬─────┐
/// │ SOH │ len tag │ length    │ STX │ command │ args…  │ ETX │ checksum │ EOT │
/// │ 01  │ 11/12/14│ 1/2/4B BE │ 02  │ 1B      │ tagged │ 03  │ XOR text │ 04  │
/// └─────┴─────────┴───────────┴─────┴─────────┴────────┴─────┴──────────┴─────┘
/// ```
///
/// All argument lengths are checked before anything is written, so on error
/// `dst` is left untouched.
pub fn encode_frame(command: u8, args: &[TypedValue], dst: &mut BytesMut) -> Result<()> {
    for arg in args {
        arg.check_len()?;
    }

    let text_len = text_len(args);
    if text_len > TEXT_MAX_LEN {
        return Err(FrameError::DataTotalLengthOverflow {
            len: text_len,
            max: TEXT_MAX_LEN,
        });
    }

    let width = length_width(text_len);
    dst.reserve(text_len + width + 6);
    dst.put_u8(SOH);
    dst.put_u8(LENGTH | width as u8);
    dst.put_uint(text_len as u64, width);
    dst.put_u8(STX);

    let text_start = dst.len();
    dst.put_u8(command);
    for arg in args {
        arg.encode_into(dst);
    }
    let sum = checksum(&dst[text_start..]);

    dst.put_u8(ETX);
    dst.put_u8(sum);
    dst.put_u8(EOT);
    Ok(())
}

/// Outcome of building an [`EncodedMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildResult {
    Successful,
    NoData,
    StringLengthOverflow,
    ByteArrayLengthOverflow,
    DataTotalLengthOverflow,
    DataTypeNotImplemented,
    CommandValueOverflow,
}

/// A fully built wire message, ready to be sent any number of times.
///
/// Building never fails loudly: check [`EncodedMessage::build_result`] (or
/// [`EncodedMessage::is_successful`]) before sending. A failed build carries
/// no bytes and no arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMessage {
    command: u8,
    args: Vec<TypedValue>,
    bytes: Bytes,
    result: BuildResult,
}

impl Default for EncodedMessage {
    fn default() -> Self {
        Self::failed(BuildResult::NoData)
    }
}

impl EncodedMessage {
    /// Build a message from a command byte and ordered arguments.
    pub fn build(command: u8, args: &[TypedValue]) -> Self {
        let mut buf = BytesMut::new();
        match encode_frame(command, args, &mut buf) {
            Ok(()) => Self {
                command,
                args: args.to_vec(),
                bytes: buf.freeze(),
                result: BuildResult::Successful,
            },
            Err(err) => Self::from_error(&err),
        }
    }

    /// Build from an unchecked command value.
    ///
    /// Values outside `0..=255` yield [`BuildResult::CommandValueOverflow`].
    pub fn build_raw(command: i64, args: &[TypedValue]) -> Self {
        match u8::try_from(command) {
            Ok(command) => Self::build(command, args),
            Err(_) => Self::from_error(&FrameError::CommandValueOverflow(command)),
        }
    }

    /// A failed message carrying the result code of an encoder error.
    pub fn from_error(err: &FrameError) -> Self {
        Self::failed(err.build_result().unwrap_or(BuildResult::NoData))
    }

    fn failed(result: BuildResult) -> Self {
        Self {
            command: 0,
            args: Vec::new(),
            bytes: Bytes::new(),
            result,
        }
    }

    pub fn command(&self) -> u8 {
        self.command
    }

    /// Arguments the message was built from, in wire order.
    pub fn args(&self) -> &[TypedValue] {
        &self.args
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn build_result(&self) -> BuildResult {
        self.result
    }

    pub fn is_successful(&self) -> bool {
        self.result == BuildResult::Successful
    }

    /// The wire bytes, or `FrameError::NotBuilt` if building failed.
    pub fn wire(&self) -> Result<&[u8]> {
        if self.is_successful() {
            Ok(&self.bytes)
        } else {
            Err(FrameError::NotBuilt(self.result))
        }
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest text length accepted by the decoder. Default: [`TEXT_MAX_LEN`].
    pub max_text_len: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_text_len: TEXT_MAX_LEN,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
