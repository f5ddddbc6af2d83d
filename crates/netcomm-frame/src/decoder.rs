//! Resumable frame decoder.
//!
//! Bytes arrive in arbitrary chunks; [`FrameDecoder::step`] advances a state
//! machine as far as the buffered bytes allow and reports whether a frame was
//! completed, more bytes are needed, or the buffer is empty. The state machine
//! mirrors the wire layout:
//!
//! ```text
//! AwaitStart → AwaitLengthTag → AwaitBodyStart → AwaitBodyEnd → AwaitChecksum → AwaitEnd
//!     ^                                                                         │
//!     └─────────────────────────────── frame completed ─────────────────────────┘
//! ```
//!
//! A structural violation is fatal: the decoder does not resynchronize and
//! keeps reporting the same error until it is dropped.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{checksum, Frame, FrameConfig, EOT, ETX, LENGTH, SOH, STX};
use crate::error::{FrameError, ParseErrorKind, Result};
use crate::value::{TypedValue, FAMILY_MASK, WIDTH_MASK};

/// Position of the decoder within the frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeState {
    AwaitStart,
    AwaitLengthTag,
    AwaitBodyStart,
    AwaitBodyEnd,
    AwaitChecksum,
    AwaitEnd,
}

/// Result code of the most recent decoder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepResult {
    Completed = 0,
    InProgress = 1,
    NoData = 2,
    ParsingError = 3,
}

impl StepResult {
    /// Inverse of `as u8`, for results published through an atomic.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(StepResult::Completed),
            1 => Some(StepResult::InProgress),
            2 => Some(StepResult::NoData),
            3 => Some(StepResult::ParsingError),
            _ => None,
        }
    }
}

/// Successful outcome of one decoder step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// One frame was extracted. More may be pipelined behind it.
    Completed(Frame),
    /// Bytes are buffered but do not yet form a complete frame.
    InProgress,
    /// The buffer is empty.
    NoData,
}

impl Step {
    pub fn result(&self) -> StepResult {
        match self {
            Step::Completed(_) => StepResult::Completed,
            Step::InProgress => StepResult::InProgress,
            Step::NoData => StepResult::NoData,
        }
    }
}

/// The state machine without its buffer.
///
/// Works on any caller-owned `BytesMut`; used directly by the async codec,
/// wrapped with a buffer by [`FrameDecoder`].
#[derive(Debug)]
pub struct FrameParser {
    pos: usize,
    state: DecodeState,
    text_len: usize,
    checksum: u8,
    pending: Option<Frame>,
    generation: u64,
    last: StepResult,
    failure: Option<ParseErrorKind>,
    max_text_len: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(FrameConfig::default().max_text_len)
    }
}

impl FrameParser {
    pub fn new(max_text_len: usize) -> Self {
        Self {
            pos: 0,
            state: DecodeState::AwaitStart,
            text_len: 0,
            checksum: 0,
            pending: None,
            generation: 0,
            last: StepResult::NoData,
            failure: None,
            max_text_len,
        }
    }

    /// Advance over `buf` as far as possible.
    ///
    /// On completion the frame's bytes are removed from the front of `buf`;
    /// anything behind them stays for the next call.
    pub fn advance(&mut self, buf: &mut BytesMut) -> Result<Step> {
        if let Some(kind) = &self.failure {
            return Err(FrameError::Malformed {
                state: self.state,
                kind: kind.clone(),
            });
        }

        match self.run(buf) {
            Ok(step) => {
                self.last = step.result();
                Ok(step)
            }
            Err(kind) => {
                self.last = StepResult::ParsingError;
                self.failure = Some(kind.clone());
                Err(FrameError::Malformed {
                    state: self.state,
                    kind,
                })
            }
        }
    }

    fn run(&mut self, buf: &mut BytesMut) -> std::result::Result<Step, ParseErrorKind> {
        loop {
            if self.pos >= buf.len() && self.state != DecodeState::AwaitBodyEnd {
                return Ok(self.idle(buf));
            }

            match self.state {
                DecodeState::AwaitStart => {
                    expect_marker(buf[self.pos], SOH)?;
                    self.pos += 1;
                    self.state = DecodeState::AwaitLengthTag;
                }
                DecodeState::AwaitLengthTag => {
                    let tag = buf[self.pos];
                    let width = match (tag & FAMILY_MASK, tag & WIDTH_MASK) {
                        (LENGTH, w @ (1 | 2 | 4)) => usize::from(w),
                        _ => return Err(ParseErrorKind::UnknownLengthTag(tag)),
                    };
                    if buf.len() < self.pos + 1 + width {
                        return Ok(Step::InProgress);
                    }
                    let mut field = &buf[self.pos + 1..self.pos + 1 + width];
                    let text_len = field.get_uint(width) as usize;
                    if text_len == 0 {
                        return Err(ParseErrorKind::EmptyText);
                    }
                    if text_len > self.max_text_len {
                        return Err(ParseErrorKind::TextTooLong {
                            len: text_len,
                            max: self.max_text_len,
                        });
                    }
                    self.text_len = text_len;
                    self.pos += 1 + width;
                    self.state = DecodeState::AwaitBodyStart;
                }
                DecodeState::AwaitBodyStart => {
                    expect_marker(buf[self.pos], STX)?;
                    self.pos += 1;
                    self.state = DecodeState::AwaitBodyEnd;
                }
                DecodeState::AwaitBodyEnd => {
                    let end = self.pos + self.text_len;
                    if buf.len() <= end {
                        return Ok(Step::InProgress);
                    }
                    expect_marker(buf[end], ETX)?;
                    let text = &buf[self.pos..end];
                    self.pending = Some(parse_text(text)?);
                    self.checksum = checksum(text);
                    self.pos = end + 1;
                    self.state = DecodeState::AwaitChecksum;
                }
                DecodeState::AwaitChecksum => {
                    let found = buf[self.pos];
                    if found != self.checksum {
                        return Err(ParseErrorKind::ChecksumMismatch {
                            expected: self.checksum,
                            found,
                        });
                    }
                    self.pos += 1;
                    self.state = DecodeState::AwaitEnd;
                }
                DecodeState::AwaitEnd => {
                    expect_marker(buf[self.pos], EOT)?;
                    buf.advance(self.pos + 1);
                    self.pos = 0;
                    self.state = DecodeState::AwaitStart;
                    self.generation += 1;
                    if let Some(frame) = self.pending.take() {
                        debug!(
                            command = frame.command,
                            args = frame.args.len(),
                            generation = self.generation,
                            "frame completed"
                        );
                        return Ok(Step::Completed(frame));
                    }
                }
            }
        }
    }

    fn idle(&self, buf: &BytesMut) -> Step {
        trace!(state = ?self.state, buffered = buf.len(), "decoder waiting for bytes");
        if buf.is_empty() {
            Step::NoData
        } else {
            Step::InProgress
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Result of the most recent call to [`FrameParser::advance`].
    pub fn last_result(&self) -> StepResult {
        self.last
    }

    /// Number of frames completed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once a structural error has been seen.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }
}

fn expect_marker(found: u8, expected: u8) -> std::result::Result<(), ParseErrorKind> {
    if found == expected {
        Ok(())
    } else {
        Err(ParseErrorKind::UnexpectedMarker { expected, found })
    }
}

fn parse_text(text: &[u8]) -> std::result::Result<Frame, ParseErrorKind> {
    let command = *text.first().ok_or(ParseErrorKind::EmptyText)?;
    let mut pos = 1;
    let mut args = Vec::new();
    while pos < text.len() {
        args.push(TypedValue::decode_from(text, &mut pos)?);
    }
    Ok(Frame { command, args })
}

/// Decoder owning its accumulation buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    parser: FrameParser,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            parser: FrameParser::new(config.max_text_len),
        }
    }

    /// Append received bytes to the accumulation buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Advance the state machine over the buffered bytes.
    ///
    /// Call repeatedly until it returns something other than
    /// [`Step::Completed`] to drain pipelined frames.
    pub fn step(&mut self) -> Result<Step> {
        self.parser.advance(&mut self.buf)
    }

    pub fn last_result(&self) -> StepResult {
        self.parser.last_result()
    }

    pub fn generation(&self) -> u64 {
        self.parser.generation()
    }

    pub fn state(&self) -> DecodeState {
        self.parser.state()
    }

    /// Bytes buffered but not yet part of a completed frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EncodedMessage;

    fn example() -> (u8, Vec<TypedValue>) {
        (
            0x88,
            vec![
                TypedValue::Integer(-256),
                TypedValue::Boolean(true),
                TypedValue::from("Hello"),
                TypedValue::Float(-1.1),
                TypedValue::from(vec![0x41, 0x42, 0x43]),
            ],
        )
    }

    fn wire(command: u8, args: &[TypedValue]) -> Vec<u8> {
        let msg = EncodedMessage::build(command, args);
        assert!(msg.is_successful());
        msg.bytes().to_vec()
    }

    fn expect_error(decoder: &mut FrameDecoder) -> ParseErrorKind {
        match decoder.step() {
            Err(FrameError::Malformed { kind, .. }) => kind,
            other => panic!("expected malformed frame, got {other:?}"),
        }
    }

    #[test]
    fn empty_decoder_reports_no_data() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.step().unwrap(), Step::NoData);
        assert_eq!(decoder.last_result(), StepResult::NoData);
    }

    #[test]
    fn decodes_example_frame() {
        let (command, args) = example();
        let mut decoder = FrameDecoder::new();
        decoder.append(&wire(command, &args));

        let Step::Completed(frame) = decoder.step().unwrap() else {
            panic!("expected completed frame");
        };
        assert_eq!(frame.command, 0x88);
        assert_eq!(frame.args[0], TypedValue::Integer(-256));
        assert_eq!(frame.args[1], TypedValue::Boolean(true));
        assert_eq!(frame.args[2], TypedValue::from("Hello"));
        assert_eq!(frame.args[3], TypedValue::Float(f64::from(-1.1f32)));
        assert_eq!(frame.args[4], TypedValue::from(vec![0x41, 0x42, 0x43]));
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.generation(), 1);
    }

    #[test]
    fn byte_at_a_time_reports_in_progress_until_last_byte() {
        let (command, args) = example();
        let bytes = wire(command, &args);
        let mut decoder = FrameDecoder::new();

        for (i, byte) in bytes.iter().enumerate() {
            decoder.append(&[*byte]);
            let step = decoder.step().unwrap();
            if i + 1 < bytes.len() {
                assert_eq!(step, Step::InProgress, "byte {i}");
                assert_eq!(decoder.generation(), 0);
            } else {
                assert!(matches!(step, Step::Completed(ref f) if f.command == 0x88));
            }
        }
        assert_eq!(decoder.step().unwrap(), Step::NoData);
    }

    #[test]
    fn length_field_split_across_reads() {
        let bytes = wire(3, &[TypedValue::from(vec![7u8; 300])]);
        assert_eq!(bytes[1], 0x12);

        let mut decoder = FrameDecoder::new();
        decoder.append(&bytes[..3]);
        assert_eq!(decoder.step().unwrap(), Step::InProgress);
        assert_eq!(decoder.state(), DecodeState::AwaitLengthTag);

        decoder.append(&bytes[3..]);
        assert!(matches!(decoder.step().unwrap(), Step::Completed(_)));
    }

    #[test]
    fn pipelined_frames_complete_in_order() {
        let mut bytes = wire(1, &[TypedValue::Integer(10)]);
        bytes.extend(wire(2, &[TypedValue::from("two")]));

        let mut decoder = FrameDecoder::new();
        decoder.append(&bytes);

        let Step::Completed(first) = decoder.step().unwrap() else {
            panic!("first frame missing");
        };
        let Step::Completed(second) = decoder.step().unwrap() else {
            panic!("second frame missing");
        };
        assert_eq!(first.command, 1);
        assert_eq!(second.command, 2);
        assert_eq!(second.args, vec![TypedValue::from("two")]);
        assert_eq!(decoder.step().unwrap(), Step::NoData);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.generation(), 2);
    }

    #[test]
    fn partial_second_frame_stays_buffered() {
        let mut bytes = wire(1, &[]);
        let second = wire(2, &[TypedValue::Boolean(false)]);
        bytes.extend_from_slice(&second[..4]);

        let mut decoder = FrameDecoder::new();
        decoder.append(&bytes);
        assert!(matches!(decoder.step().unwrap(), Step::Completed(_)));
        assert_eq!(decoder.step().unwrap(), Step::InProgress);
        assert_eq!(decoder.buffered(), 4);

        decoder.append(&second[4..]);
        assert!(matches!(decoder.step().unwrap(), Step::Completed(f) if f.command == 2));
    }

    #[test]
    fn flipping_any_text_byte_is_a_parsing_error() {
        let (command, args) = example();
        let bytes = wire(command, &args);
        // SOH, 0x11, len, STX; text follows
        let text_len = bytes[2] as usize;

        for i in 4..4 + text_len {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            let mut decoder = FrameDecoder::new();
            decoder.append(&corrupted);
            assert!(decoder.step().is_err(), "flip at offset {i} went unnoticed");
            assert_eq!(decoder.last_result(), StepResult::ParsingError);
        }
    }

    #[test]
    fn bad_start_marker() {
        let mut decoder = FrameDecoder::new();
        decoder.append(&[0x55]);
        assert_eq!(
            expect_error(&mut decoder),
            ParseErrorKind::UnexpectedMarker {
                expected: SOH,
                found: 0x55
            }
        );
    }

    #[test]
    fn bad_markers_in_each_position() {
        let bytes = wire(9, &[TypedValue::Integer(1)]);
        let eot = bytes.len() - 1;
        let etx = bytes.len() - 3;

        for (offset, expected) in [(3, STX), (etx, ETX), (eot, EOT)] {
            let mut corrupted = bytes.clone();
            corrupted[offset] = 0x7E;
            let mut decoder = FrameDecoder::new();
            decoder.append(&corrupted);
            assert_eq!(
                expect_error(&mut decoder),
                ParseErrorKind::UnexpectedMarker {
                    expected,
                    found: 0x7E
                }
            );
        }
    }

    #[test]
    fn checksum_mismatch() {
        let mut bytes = wire(9, &[TypedValue::Integer(1)]);
        let at = bytes.len() - 2;
        bytes[at] ^= 0xFF;

        let mut decoder = FrameDecoder::new();
        decoder.append(&bytes);
        assert!(matches!(
            expect_error(&mut decoder),
            ParseErrorKind::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn unknown_length_tag() {
        let mut decoder = FrameDecoder::new();
        decoder.append(&[SOH, 0x13]);
        assert_eq!(
            expect_error(&mut decoder),
            ParseErrorKind::UnknownLengthTag(0x13)
        );
    }

    #[test]
    fn zero_text_length_is_rejected() {
        let mut decoder = FrameDecoder::new();
        decoder.append(&[SOH, 0x11, 0x00, STX]);
        assert_eq!(expect_error(&mut decoder), ParseErrorKind::EmptyText);
    }

    #[test]
    fn text_longer_than_limit_is_rejected() {
        let config = FrameConfig {
            max_text_len: 16,
            ..FrameConfig::default()
        };
        let mut decoder = FrameDecoder::with_config(&config);
        decoder.append(&[SOH, 0x11, 0x11]);
        assert_eq!(
            expect_error(&mut decoder),
            ParseErrorKind::TextTooLong { len: 17, max: 16 }
        );
    }

    #[test]
    fn argument_overrunning_text_is_truncated() {
        // command 1, then a 4-byte integer tag with only two bytes of payload
        let text = [0x01, 0x34, 0x00, 0x00];
        let mut bytes = vec![SOH, 0x11, text.len() as u8, STX];
        bytes.extend_from_slice(&text);
        bytes.extend_from_slice(&[ETX, checksum(&text), EOT]);

        let mut decoder = FrameDecoder::new();
        decoder.append(&bytes);
        assert_eq!(expect_error(&mut decoder), ParseErrorKind::Truncated);
    }

    #[test]
    fn errors_are_sticky() {
        let mut decoder = FrameDecoder::new();
        decoder.append(&[0x00]);
        assert!(decoder.step().is_err());

        decoder.append(&wire(1, &[]));
        assert!(decoder.step().is_err());
        assert_eq!(decoder.generation(), 0);
    }
}
