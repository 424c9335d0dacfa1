//! Frame codec: discriminator-tagged, length-prefixed messages over a
//! byte stream.
//!
//! The codec owns the stream plus an accumulation buffer. A receive blocks
//! until the declared total length is buffered, then consumes exactly that
//! many bytes; anything beyond it stays buffered for the next call, so
//! coalesced frames (a stream terminator followed by its status outcome)
//! never desynchronize.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{self, ProtocolConfig};

const READ_CHUNK: usize = 64 * 1024;

/// Serialize one message as a wire frame. Pure; the inverse of
/// [`FrameCodec::recv_raw`].
pub fn encode(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    let total = protocol::HEADER_SIZE + payload.len();
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(protocol::DISCRIMINATOR);
    frame.extend_from_slice(format!("{:0width$}", total, width = protocol::LEN_WIDTH).as_bytes());
    frame.extend_from_slice(format!("{:0width$}", msg_type, width = protocol::TYPE_WIDTH).as_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub struct FrameCodec<S> {
    stream: S,
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl<S> FrameCodec<S> {
    pub fn new(stream: S, config: &ProtocolConfig) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            max_frame_size: config.max_frame_size,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn send(&mut self, msg_type: u8, payload: &[u8]) -> Result<()>
    where
        S: Write,
    {
        if protocol::HEADER_SIZE + payload.len() > self.max_frame_size {
            return Err(Error::Framing("payload too large"));
        }
        self.stream.write_all(&encode(msg_type, payload))?;
        self.stream.flush()?;
        Ok(())
    }

    /// Blocks until one complete frame has arrived, then returns its raw
    /// message-type code and payload. A zero-byte read is connection loss,
    /// never an empty frame.
    pub fn recv_raw(&mut self) -> Result<(u8, Vec<u8>)>
    where
        S: Read,
    {
        while self.buf.len() < protocol::HEADER_SIZE {
            self.fill()?;
        }
        if &self.buf[..2] != protocol::DISCRIMINATOR {
            return Err(Error::BadDiscriminator);
        }
        let total = parse_decimal(&self.buf[2..2 + protocol::LEN_WIDTH])
            .ok_or(Error::Framing("length field not decimal"))?;
        if total < protocol::HEADER_SIZE || total > self.max_frame_size {
            return Err(Error::Framing("declared length out of range"));
        }
        while self.buf.len() < total {
            self.fill()?;
        }
        let frame: Vec<u8> = self.buf.drain(..total).collect();
        let msg_type = parse_decimal(&frame[protocol::HEADER_OVERHEAD..protocol::HEADER_SIZE])
            .ok_or(Error::Framing("type field not decimal"))? as u8;
        Ok((msg_type, frame[protocol::HEADER_SIZE..].to_vec()))
    }

    fn fill(&mut self) -> Result<()>
    where
        S: Read,
    {
        let mut chunk = [0u8; READ_CHUNK];
        let n = match self.stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(Error::PeerUnresponsive)
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(Error::Disconnected);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

impl FrameCodec<TcpStream> {
    /// Applies or clears the read deadline. Protocol-phase reads run under
    /// a deadline; waits whose duration a human controls must pass `None`.
    pub fn set_deadline(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }
}

fn parse_decimal(field: &[u8]) -> Option<usize> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Fills `buf` from `reader`, short only at end of input. Keeps transfer
/// blocks at exactly the configured size except for the final one.
pub(crate) fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DEFAULT_TEST_BLOCK: usize = 1024;

    fn codec_over(bytes: Vec<u8>) -> FrameCodec<Cursor<Vec<u8>>> {
        FrameCodec::new(Cursor::new(bytes), &ProtocolConfig::default())
    }

    #[test]
    fn encode_produces_ascii_header() {
        let frame = encode(5, b"abc");
        assert_eq!(&frame, b"dg0000001505abc");
    }

    #[test]
    fn round_trip_various_payloads() {
        // include the discriminator embedded inside a payload, the empty
        // end-of-stream marker, and a payload spanning several blocks
        let payloads: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"hello".to_vec(),
            b"xxdgxxdgxx".to_vec(),
            vec![0xAB; 5 * DEFAULT_TEST_BLOCK + 3],
        ];
        // every message-type code of both vocabularies
        for msg_type in 1..=23u8 {
            for payload in &payloads {
                let mut codec = codec_over(encode(msg_type, payload));
                let (t, p) = codec.recv_raw().unwrap();
                assert_eq!(t, msg_type);
                assert_eq!(&p, payload);
            }
        }
    }

    #[test]
    fn coalesced_frames_stay_in_sync() {
        let mut bytes = encode(11, b"");
        bytes.extend_from_slice(&encode(12, b"done"));
        let mut codec = codec_over(bytes);
        assert_eq!(codec.recv_raw().unwrap(), (11, Vec::new()));
        assert_eq!(codec.recv_raw().unwrap(), (12, b"done".to_vec()));
    }

    #[test]
    fn bad_discriminator_is_fatal() {
        let mut frame = encode(5, b"abc");
        frame[0] = b'x';
        let mut codec = codec_over(frame);
        assert!(matches!(codec.recv_raw(), Err(Error::BadDiscriminator)));
    }

    #[test]
    fn truncated_stream_is_disconnect() {
        let mut frame = encode(5, b"abcdef");
        frame.truncate(frame.len() - 3);
        let mut codec = codec_over(frame);
        assert!(matches!(codec.recv_raw(), Err(Error::Disconnected)));
    }

    #[test]
    fn non_decimal_length_is_framing_error() {
        let mut frame = encode(5, b"abc");
        frame[4] = b'x';
        let mut codec = codec_over(frame);
        assert!(matches!(codec.recv_raw(), Err(Error::Framing(_))));
    }

    #[test]
    fn undersized_declared_length_is_framing_error() {
        let mut frame = encode(5, b"abc");
        frame[2..10].copy_from_slice(b"00000003");
        let mut codec = codec_over(frame);
        assert!(matches!(codec.recv_raw(), Err(Error::Framing(_))));
    }

    #[test]
    fn oversized_declared_length_is_framing_error() {
        let mut frame = encode(5, b"abc");
        frame[2..10].copy_from_slice(b"99999999");
        let mut codec = codec_over(frame);
        assert!(matches!(codec.recv_raw(), Err(Error::Framing(_))));
    }

    #[test]
    fn send_writes_the_encoded_frame() {
        let mut codec = FrameCodec::new(Vec::new(), &ProtocolConfig::default());
        codec.send(7, b"payload").unwrap();
        assert_eq!(codec.into_inner(), encode(7, b"payload"));
    }

    #[test]
    fn oversized_send_is_rejected() {
        let config = ProtocolConfig {
            max_frame_size: 64,
            ..ProtocolConfig::default()
        };
        let mut codec = FrameCodec::new(Vec::new(), &config);
        assert!(matches!(
            codec.send(7, &[0u8; 128]),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn read_block_fills_to_capacity() {
        let data = vec![7u8; 1000];
        let mut cursor = Cursor::new(data);
        let mut buf = [0u8; 256];
        assert_eq!(read_block(&mut cursor, &mut buf).unwrap(), 256);
        assert_eq!(read_block(&mut cursor, &mut buf).unwrap(), 256);
        assert_eq!(read_block(&mut cursor, &mut buf).unwrap(), 256);
        assert_eq!(read_block(&mut cursor, &mut buf).unwrap(), 232);
        assert_eq!(read_block(&mut cursor, &mut buf).unwrap(), 0);
    }
}
