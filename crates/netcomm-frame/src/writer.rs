use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use netcomm_transport::NetStream;

use crate::codec::{encode_frame, EncodedMessage, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;
use crate::value::TypedValue;

/// Write all of `bytes`, looping over partial writes.
///
/// A write that makes no progress means the peer is gone and yields
/// `FrameError::ConnectionClosed`. `Interrupted` is retried; every other
/// error (including `WouldBlock` on a non-blocking stream) is returned.
pub fn write_fully<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match writer.write(&bytes[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            config,
        }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.command, &frame.args)
    }

    /// Encode and send one frame.
    pub fn send(&mut self, command: u8, args: &[TypedValue]) -> Result<()> {
        self.buf.clear();
        encode_frame(command, args, &mut self.buf)?;
        write_fully(&mut self.inner, &self.buf)?;
        self.flush()
    }

    /// Send a prebuilt message; fails with `NotBuilt` if building failed.
    pub fn write_message(&mut self, message: &EncodedMessage) -> Result<()> {
        write_fully(&mut self.inner, message.wire()?)?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<NetStream> {
    /// Create a frame writer for a TCP stream and apply the configured write timeout.
    pub fn with_config_net(inner: NetStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::BuildResult;
    use crate::reader::FrameReader;
    use crate::value::ARG_MAX_LEN;

    #[test]
    fn send_matches_encoded_message() {
        let args = [TypedValue::Integer(-256), TypedValue::from("Hello")];
        let mut writer = FrameWriter::new(Vec::new());
        writer.send(0x88, &args).unwrap();

        let expected = EncodedMessage::build(0x88, &args);
        assert_eq!(writer.get_ref().as_slice(), expected.bytes());
    }

    #[test]
    fn write_then_read_back() {
        let mut writer = FrameWriter::new(Vec::new());
        writer
            .write_frame(&Frame::new(5, vec![TypedValue::Boolean(false)]))
            .unwrap();
        writer
            .write_message(&EncodedMessage::build(6, &[TypedValue::Integer(40_000)]))
            .unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        assert_eq!(reader.read_frame().unwrap().command, 5);
        let second = reader.read_frame().unwrap();
        assert_eq!(second.command, 6);
        assert_eq!(second.args[0].as_integer(), Some(40_000));
    }

    #[test]
    fn unbuilt_message_is_rejected() {
        let failed = EncodedMessage::build(1, &[TypedValue::from(vec![0u8; ARG_MAX_LEN + 1])]);
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer.write_message(&failed).unwrap_err();
        assert!(matches!(
            err,
            FrameError::NotBuilt(BuildResult::ByteArrayLengthOverflow)
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn oversized_argument_fails_send() {
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer
            .send(1, &[TypedValue::Text("x".repeat(ARG_MAX_LEN + 1))])
            .unwrap_err();
        assert!(matches!(err, FrameError::StringLengthOverflow { .. }));
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut sink = TrickleWriter {
            written: Vec::new(),
            interrupted: false,
        };
        write_fully(&mut sink, b"several bytes").unwrap();
        assert_eq!(sink.written, b"several bytes");
        assert!(sink.interrupted);
    }

    #[test]
    fn zero_progress_write_is_connection_closed() {
        let err = write_fully(&mut ZeroWriter, b"data").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_returned() {
        let err = write_fully(&mut BrokenWriter, b"data").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    // Accepts one byte per call, with one Interrupted thrown in.
    struct TrickleWriter {
        written: Vec<u8>,
        interrupted: bool,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted && self.written.len() == 3 {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
