//! # RESP2 Connection Framer
//!
//! Purpose: Turn a connection's accumulating byte buffer into complete
//! command arrays, and serialize replies back out. Generalizes the
//! client's blocking `kvault_client::resp` reader (which can afford to
//! block on `read_exact` one frame at a time) into a framer that tolerates
//! partial reads arriving across multiple `TcpStream::read` calls, since a
//! server cannot block an async task waiting for bytes mid-command.
//!
//! Only the inline-command and multi-bulk-array subsets of RESP are
//! accepted as *input* (every real client, including `kvault-client`,
//! sends commands as `*N\r\n$len\r\n...`). Replies use the full RESP2 type
//! set (simple string, error, integer, bulk string, array, null).

use bytes::{Buf, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespError {
    Protocol,
}

/// Incrementally parses RESP command arrays out of `buf`.
///
/// `parse` consumes only as many bytes as make up one complete command;
/// leftover bytes (the start of the next command, or nothing yet) stay in
/// `buf` for the next call. Returns `Ok(None)` when `buf` holds an
/// incomplete frame — the caller should `read` more bytes and retry.
pub struct RespParser;

impl RespParser {
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }
        match buf[0] {
            b'*' => Self::parse_array(buf),
            _ => Self::parse_inline(buf),
        }
    }

    fn parse_array(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let mut cursor = 0usize;
        let count = match read_line_at(buf, cursor) {
            Some((line, next)) => {
                cursor = next;
                parse_i64(&line[1..])?
            }
            None => return Ok(None),
        };

        if count < 0 {
            buf.advance(cursor);
            return Ok(Some(Vec::new()));
        }
        let count = count as usize;

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let (tag_line, next) = match read_line_at(buf, cursor) {
                Some(pair) => pair,
                None => return Ok(None),
            };
            if tag_line.first() != Some(&b'$') {
                return Err(RespError::Protocol);
            }
            let len = parse_i64(&tag_line[1..])?;
            if len < 0 {
                return Err(RespError::Protocol);
            }
            let len = len as usize;
            cursor = next;

            if buf.len() < cursor + len + 2 {
                return Ok(None);
            }
            let data = buf[cursor..cursor + len].to_vec();
            if &buf[cursor + len..cursor + len + 2] != b"\r\n" {
                return Err(RespError::Protocol);
            }
            cursor += len + 2;
            args.push(data);
        }

        buf.advance(cursor);
        Ok(Some(args))
    }

    /// A line of whitespace-separated tokens, terminated by `\r\n`, with
    /// no `$len` framing. Supported for `PING\r\n`-style manual testing;
    /// real clients use the array form.
    fn parse_inline(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let (line, next) = match read_line_at(buf, 0) {
            Some(pair) => pair,
            None => return Ok(None),
        };
        let args = line
            .split(|b| *b == b' ')
            .filter(|tok| !tok.is_empty())
            .map(|tok| tok.to_vec())
            .collect();
        buf.advance(next);
        Ok(Some(args))
    }
}

/// Finds `\r\n` starting at `from`, returning the line contents (without
/// the terminator) and the offset just past it. `None` means the buffer
/// does not yet contain a complete line.
fn read_line_at(buf: &[u8], from: usize) -> Option<(Vec<u8>, usize)> {
    let rest = &buf[from..];
    let pos = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((rest[..pos].to_vec(), from + pos + 2))
}

fn parse_i64(data: &[u8]) -> Result<i64, RespError> {
    if data.is_empty() {
        return Err(RespError::Protocol);
    }
    let mut negative = false;
    let mut idx = 0;
    if data[0] == b'-' {
        negative = true;
        idx = 1;
    }
    if idx >= data.len() {
        return Err(RespError::Protocol);
    }
    let mut value: i64 = 0;
    while idx < data.len() {
        let b = data[idx];
        if !b.is_ascii_digit() {
            return Err(RespError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
        idx += 1;
    }
    Ok(if negative { -value } else { value })
}

/// Encodes a `+simple\r\n` reply.
pub fn resp_simple(out: &mut Vec<u8>, text: &str) {
    out.push(b'+');
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Encodes a `-ERR ...\r\n` reply.
pub fn resp_error(out: &mut Vec<u8>, text: &str) {
    out.push(b'-');
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Encodes a `:123\r\n` reply.
pub fn resp_integer(out: &mut Vec<u8>, value: i64) {
    out.push(b':');
    out.extend_from_slice(value.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Encodes a `$len\r\ndata\r\n` reply.
pub fn resp_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Encodes a `$-1\r\n` null bulk reply.
pub fn resp_null(out: &mut Vec<u8>) {
    out.extend_from_slice(b"$-1\r\n");
}

/// Encodes a `*-1\r\n` null array reply.
pub fn resp_null_array(out: &mut Vec<u8>) {
    out.extend_from_slice(b"*-1\r\n");
}

/// Encodes a `*len\r\n` array header; the caller writes `len` elements
/// immediately after with further `resp_*` calls.
pub fn resp_array_header(out: &mut Vec<u8>, len: usize) {
    out.push(b'*');
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Encodes a flat `Vec<Vec<u8>>` as a RESP array of bulk strings — the
/// shape the AOF writer re-serializes argv into, and `MONITOR` lines use.
pub fn resp_array_of_bulks(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    resp_array_header(out, items.len());
    for item in items {
        resp_bulk(out, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_array_command() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n"[..]);
        let args = RespParser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"GET".to_vec(), b"key".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_on_partial_frame() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nke"[..]);
        assert_eq!(RespParser::parse(&mut buf).unwrap(), None);
        // nothing consumed, since the command isn't complete yet
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nke");
    }

    #[test]
    fn leaves_next_command_bytes_untouched() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nPING\r\n"[..]);
        let first = RespParser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(first, vec![b"PING".to_vec()]);
        let second = RespParser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(second, vec![b"PING".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn parses_inline_command() {
        let mut buf = BytesMut::from(&b"PING\r\n"[..]);
        let args = RespParser::parse(&mut buf).unwrap().unwrap();
        assert_eq!(args, vec![b"PING".to_vec()]);
    }

    #[test]
    fn rejects_missing_bulk_terminator() {
        let mut buf = BytesMut::from(&b"*1\r\n$3\r\nabcXY"[..]);
        assert_eq!(RespParser::parse(&mut buf), Err(RespError::Protocol));
    }

    #[test]
    fn empty_buffer_yields_none() {
        let mut buf = BytesMut::new();
        assert_eq!(RespParser::parse(&mut buf).unwrap(), None);
    }
}
