//! Tagged-value frame codec for netcomm.
//!
//! Wire format:
//! ```text
//! ┌─────┬─────────┬───────────┬─────┬─────────┬────────┬─────┬──────────┬─────┐
//! │ SOH │ len tag │ length    │ STX │ command │ args…  │ ETX │ checksum │ EOT │
//! │ 01  │ 11/12/14│ 1/2/4B BE │ 02  │ 1B      │ tagged │ 03  │ XOR text │ 04  │
//! └─────┴─────────┴───────────┴─────┴─────────┴────────┴─────┴──────────┴─────┘
//! ```
//!
//! Each argument is a tag byte (type family in the high nibble, field width in
//! the low nibble) followed by a big-endian value, or by a length field and
//! payload for text and byte arrays. See [`value`] for the tag table.
//!
//! - [`EncodedMessage`] builds a frame and reports a [`BuildResult`]
//! - [`FrameDecoder`] is the resumable state machine used by sockets
//! - [`FrameReader`]/[`FrameWriter`] do blocking framing over any stream
//! - `NetcommCodec` (feature `async`) plugs the decoder into `tokio_util`

pub mod codec;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod value;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    checksum, encode_frame, BuildResult, EncodedMessage, Frame, FrameConfig, EOT, ETX, SOH, STX,
    TEXT_MAX_LEN,
};
pub use decoder::{DecodeState, FrameDecoder, FrameParser, Step, StepResult};
pub use error::{FrameError, ParseErrorKind, Result};
pub use reader::{FrameReader, READ_CHUNK_SIZE};
pub use value::{TypedValue, ValueKind, ARG_MAX_LEN};
pub use writer::{write_fully, FrameWriter};

#[cfg(feature = "async")]
pub use async_codec::NetcommCodec;
