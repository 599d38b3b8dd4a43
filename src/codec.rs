//! Line framing for the wire.
//!
//! Inbound bytes are split on CR, LF, or CRLF; any of the three terminates a
//! frame and empty frames are dropped. A frame payload is capped at 510
//! bytes (512 including the terminator): an overlong line yields its first
//! 510 bytes as a frame and the rest is discarded up to the next
//! terminator. Frames decode as UTF-8 with U+FFFD replacement.
//!
//! Outbound lines are truncated to 510 bytes on a UTF-8 boundary and CRLF
//! is appended.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ClientError;

/// Maximum frame payload in bytes, excluding the CRLF terminator.
pub const MAX_LINE_LEN: usize = 510;

/// Codec for CRLF-delimited protocol lines.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Set after an overlong frame was emitted; input is dropped until the
    /// next terminator.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with a clean framing state.
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

/// Truncate to at most `max_bytes` bytes without splitting a multi-byte
/// UTF-8 codepoint.
fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ClientError> {
        loop {
            match src.iter().position(|&b| is_terminator(b)) {
                Some(idx) => {
                    let frame = src.split_to(idx);
                    src.advance(1);
                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if frame.is_empty() {
                        continue;
                    }
                    let payload = &frame[..frame.len().min(MAX_LINE_LEN)];
                    return Ok(Some(String::from_utf8_lossy(payload).into_owned()));
                }
                None => {
                    if self.discarding {
                        src.clear();
                        return Ok(None);
                    }
                    if src.len() > MAX_LINE_LEN {
                        let frame = src.split_to(MAX_LINE_LEN);
                        self.discarding = true;
                        return Ok(Some(String::from_utf8_lossy(&frame).into_owned()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ClientError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Partial trailing line on close is dropped.
                src.clear();
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ClientError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ClientError> {
        // Embedded terminators would smuggle extra commands onto the wire.
        let line = line
            .split(|c| c == '\r' || c == '\n')
            .next()
            .unwrap_or_default();
        let payload = truncate_utf8_safe(line, MAX_LINE_LEN);
        dst.reserve(payload.len() + 2);
        dst.put_slice(payload.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, bytes: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_decode_crlf() {
        let mut codec = LineCodec::new();
        let frames = decode_all(&mut codec, b"PING :a\r\nPING :b\r\n");
        assert_eq!(frames, vec!["PING :a", "PING :b"]);
    }

    #[test]
    fn test_decode_bare_terminators() {
        let mut codec = LineCodec::new();
        assert_eq!(decode_all(&mut codec, b"one\rtwo\nthree\r\n"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_decode_drops_empty_frames() {
        let mut codec = LineCodec::new();
        assert_eq!(decode_all(&mut codec, b"\r\n\r\nhi\r\n"), vec!["hi"]);
    }

    #[test]
    fn test_decode_partial_then_rest() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIV"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"MSG #c :hi\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PRIVMSG #c :hi"));
    }

    #[test]
    fn test_decode_truncates_overlong_line() {
        let mut codec = LineCodec::new();
        let mut input = vec![b'x'; 700];
        input.extend_from_slice(b"\r\nnext\r\n");
        let frames = decode_all(&mut codec, input.as_slice());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), MAX_LINE_LEN);
        assert!(frames[0].bytes().all(|b| b == b'x'));
        assert_eq!(frames[1], "next");
    }

    #[test]
    fn test_decode_truncates_across_reads() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&vec![b'y'; 600][..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), MAX_LINE_LEN);
        // Remainder of the overlong line arrives later and is discarded.
        buf.extend_from_slice(b"tail\r\nok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_decode_invalid_utf8_replaced() {
        let mut codec = LineCodec::new();
        let frames = decode_all(&mut codec, b"hi \xff there\r\n");
        assert_eq!(frames, vec!["hi \u{FFFD} there"]);
    }

    #[test]
    fn test_decode_eof_drops_partial() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"no terminator"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("NICK kitten".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK kitten\r\n");
    }

    #[test]
    fn test_encode_strips_embedded_terminators() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("QUIT\r\nJOIN #evil".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"QUIT\r\n");
    }

    #[test]
    fn test_encode_truncates_on_char_boundary() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        // 508 ASCII bytes then a 3-byte char: must stop at 508, not split it.
        let line = format!("{}\u{20AC}", "a".repeat(508));
        codec.encode(line, &mut buf).unwrap();
        assert_eq!(buf.len(), 508 + 2);
        assert!(buf.ends_with(b"\r\n"));
    }

    #[test]
    fn test_round_trip() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        let line = "PRIVMSG #chan :caf\u{E9} au lait";
        codec.encode(line.to_string(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(line));
    }
}
