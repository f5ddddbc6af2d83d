use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, EncodedMessage, Frame, FrameConfig};
use crate::decoder::{FrameParser, Step};
use crate::error::{FrameError, Result};

/// `tokio_util` codec over the same state machine as [`crate::FrameDecoder`].
///
/// Use with `FramedRead`/`FramedWrite`/`Framed` on any async stream.
#[derive(Debug, Default)]
pub struct NetcommCodec {
    parser: FrameParser,
}

impl NetcommCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            parser: FrameParser::new(config.max_text_len),
        }
    }

    /// Frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.parser.generation()
    }
}

impl Decoder for NetcommCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.parser.advance(src)? {
            Step::Completed(frame) => Ok(Some(frame)),
            Step::InProgress | Step::NoData => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for NetcommCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(frame.command, &frame.args, dst)
    }
}

impl Encoder<&EncodedMessage> for NetcommCodec {
    type Error = FrameError;

    fn encode(&mut self, message: &EncodedMessage, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(message.wire()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::value::TypedValue;

    #[tokio::test]
    async fn frames_cross_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, NetcommCodec::new());
        let mut stream = FramedRead::new(server, NetcommCodec::new());

        let sent = Frame::new(
            0x88,
            vec![TypedValue::Integer(-256), TypedValue::from("Hello")],
        );
        sink.send(sent.clone()).await.unwrap();
        sink.send(&EncodedMessage::build(2, &[TypedValue::Boolean(true)]))
            .await
            .unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), sent);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.command, 2);
        assert_eq!(stream.decoder().frames_decoded(), 2);
    }

    #[tokio::test]
    async fn truncated_stream_errors_at_eof() {
        let bytes = EncodedMessage::build(1, &[TypedValue::from("cut short")]);
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&bytes.bytes()[..6]).await.unwrap();
        drop(client);

        let mut stream = FramedRead::new(server, NetcommCodec::new());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn malformed_bytes_surface_as_errors() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0x7F, 0x00]).await.unwrap();
        drop(client);

        let mut stream = FramedRead::new(server, NetcommCodec::new());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn unbuilt_message_cannot_be_encoded() {
        let mut codec = NetcommCodec::new();
        let mut dst = BytesMut::new();
        let err = codec
            .encode(&EncodedMessage::build_raw(300, &[]), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::NotBuilt(_)));
        assert!(dst.is_empty());
    }
}
