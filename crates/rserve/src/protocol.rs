//! QAP1 message framing.
//!
//! Every message starts with a 16-byte little-endian header:
//! `[command, length_lo, offset, length_hi]`. Payloads are a sequence of
//! data items, each with a 4-byte header (`type | length << 8`), or an
//! 8-byte header when the `DT_LARGE` flag is set.

use bytes::{BufMut, BytesMut};

use crate::error::RserveError;

pub const GREETING_LEN: usize = 32;
pub const HEADER_LEN: usize = 16;

pub const CMD_EVAL: u32 = 0x003;

const CMD_RESP: u32 = 0x10000;
pub const RESP_OK: u32 = CMD_RESP | 0x0001;
pub const RESP_ERR: u32 = CMD_RESP | 0x0002;

pub const DT_STRING: u8 = 4;
pub const DT_SEXP: u8 = 10;
pub const DT_LARGE: u8 = 0x40;

/// Upper bound on a single response payload.
pub const MAX_PAYLOAD: u64 = 1 << 31;

/// Validate the 32-byte greeting an Rserve daemon sends on connect.
///
/// Returns the server's protocol version (e.g. `"0103"`).
pub fn parse_greeting(buf: &[u8; GREETING_LEN]) -> Result<String, RserveError> {
    if &buf[0..4] != b"Rsrv" {
        return Err(RserveError::Handshake(
            "peer is not an Rserve daemon".into(),
        ));
    }
    if &buf[8..12] != b"QAP1" {
        return Err(RserveError::Handshake(format!(
            "unsupported protocol '{}'",
            String::from_utf8_lossy(&buf[8..12])
        )));
    }

    for attr in buf[12..].chunks(4) {
        if attr.starts_with(b"AR") {
            return Err(RserveError::Handshake(
                "server requires authentication, which is not supported".into(),
            ));
        }
    }

    Ok(String::from_utf8_lossy(&buf[4..8]).into_owned())
}

/// Encode a `CMD_eval` request carrying `command` as a `DT_STRING` item.
pub fn encode_eval(command: &str) -> BytesMut {
    let raw = command.as_bytes();
    // NUL-terminated and padded to a multiple of 4.
    let padded = (raw.len() + 1).div_ceil(4) * 4;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + 4 + padded);
    let payload_len = (4 + padded) as u64;
    buf.put_u32_le(CMD_EVAL);
    buf.put_u32_le(payload_len as u32);
    buf.put_u32_le(0);
    buf.put_u32_le((payload_len >> 32) as u32);

    buf.put_u32_le(DT_STRING as u32 | ((padded as u32) << 8));
    buf.put_slice(raw);
    buf.put_bytes(0, padded - raw.len());
    buf
}

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub command: u32,
    pub length: u64,
}

impl ResponseHeader {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self, RserveError> {
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        let header = Self {
            command: word(0),
            length: word(4) as u64 | ((word(12) as u64) << 32),
        };
        if header.command & CMD_RESP == 0 {
            return Err(RserveError::Protocol(format!(
                "expected a response, got command {:#x}",
                header.command
            )));
        }
        if header.length > MAX_PAYLOAD {
            return Err(RserveError::Protocol(format!(
                "response of {} bytes exceeds limit",
                header.length
            )));
        }
        Ok(header)
    }

    pub fn is_error(&self) -> bool {
        self.command & 0xf == RESP_ERR & 0xf
    }

    /// Status code carried in the top byte of an error response.
    pub fn status(&self) -> u8 {
        ((self.command >> 24) & 0x7f) as u8
    }
}

/// Human-readable description of an Rserve status code.
pub fn describe_status(status: u8) -> &'static str {
    match status {
        0x02 => "invalid expression",
        0x03 => "parse error",
        0x7f => "unknown variable/method",
        0x41 => "authentication failed",
        0x42 => "connection broken",
        0x43 => "invalid command",
        0x44 => "invalid parameter",
        0x45 => "R error",
        0x46 => "I/O error",
        0x47 => "file not open",
        0x48 => "access denied",
        0x49 => "unsupported command",
        0x4a => "unknown command",
        0x4b => "data overflow",
        0x4c => "object too big",
        0x4d => "out of memory",
        0x4e => "control pipe closed",
        0x50 => "session busy",
        0x51 => "unable to detach session",
        _ => "command failed",
    }
}

/// Split the first data item off a payload, returning its type (flags
/// stripped) and body.
pub fn data_item(payload: &[u8]) -> Result<(u8, &[u8]), RserveError> {
    if payload.len() < 4 {
        return Err(RserveError::Protocol("truncated data item header".into()));
    }
    let kind = payload[0];
    let (len, offset) = if kind & DT_LARGE != 0 {
        if payload.len() < 8 {
            return Err(RserveError::Protocol("truncated large data item header".into()));
        }
        let mut len = [0u8; 8];
        len[..7].copy_from_slice(&payload[1..8]);
        (u64::from_le_bytes(len) as usize, 8usize)
    } else {
        let len = u32::from_le_bytes([payload[1], payload[2], payload[3], 0]) as usize;
        (len, 4usize)
    };
    let body = payload
        .get(offset..offset.saturating_add(len))
        .ok_or_else(|| RserveError::Protocol("data item overruns payload".into()))?;
    Ok((kind & !DT_LARGE, body))
}

/// Extract the optional message from an error response's payload.
pub fn error_message(payload: &[u8]) -> Option<String> {
    match data_item(payload) {
        Ok((DT_STRING, body)) => {
            let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
            let msg = String::from_utf8_lossy(&body[..end]).trim().to_string();
            (!msg.is_empty()).then_some(msg)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting(attrs: &[u8]) -> [u8; GREETING_LEN] {
        let mut g = [b'-'; GREETING_LEN];
        g[..12].copy_from_slice(b"Rsrv0103QAP1");
        g[12..12 + attrs.len()].copy_from_slice(attrs);
        g
    }

    #[test]
    fn accepts_plain_greeting() {
        assert_eq!(parse_greeting(&greeting(b"\r\n\r\n")).unwrap(), "0103");
    }

    #[test]
    fn rejects_foreign_peer_and_auth() {
        let mut g = greeting(b"");
        g[..4].copy_from_slice(b"HTTP");
        assert!(matches!(parse_greeting(&g), Err(RserveError::Handshake(_))));

        let g = greeting(b"ARpt");
        assert!(matches!(parse_greeting(&g), Err(RserveError::Handshake(_))));
    }

    #[test]
    fn eval_request_layout() {
        let buf = encode_eval("1+1");
        // "1+1\0" is already 4 bytes.
        assert_eq!(buf.len(), HEADER_LEN + 8);
        assert_eq!(&buf[0..4], &CMD_EVAL.to_le_bytes());
        assert_eq!(&buf[4..8], &8u32.to_le_bytes());
        assert_eq!(buf[16], DT_STRING);
        assert_eq!(&buf[17..20], &[4, 0, 0]);
        assert_eq!(&buf[20..24], b"1+1\0");
    }

    #[test]
    fn eval_request_is_padded() {
        let buf = encode_eval("ab");
        assert_eq!(buf.len(), HEADER_LEN + 8);
        assert_eq!(&buf[20..24], b"ab\0\0");

        let buf = encode_eval("abcd");
        assert_eq!(buf.len(), HEADER_LEN + 12);
        assert_eq!(buf[17], 8);
    }

    #[test]
    fn error_header_exposes_status() {
        let mut raw = [0u8; HEADER_LEN];
        raw[0..4].copy_from_slice(&(RESP_ERR | (0x7f << 24)).to_le_bytes());
        let h = ResponseHeader::parse(&raw).unwrap();
        assert!(h.is_error());
        assert_eq!(h.status(), 0x7f);
        assert_eq!(describe_status(h.status()), "unknown variable/method");
    }

    #[test]
    fn header_rejects_non_responses() {
        let mut raw = [0u8; HEADER_LEN];
        raw[0..4].copy_from_slice(&CMD_EVAL.to_le_bytes());
        assert!(matches!(
            ResponseHeader::parse(&raw),
            Err(RserveError::Protocol(_))
        ));
    }

    #[test]
    fn data_item_bounds_are_checked() {
        assert!(data_item(&[DT_SEXP, 8, 0, 0, 1, 2]).is_err());
        let (kind, body) = data_item(&[DT_SEXP, 2, 0, 0, 9, 9]).unwrap();
        assert_eq!(kind, DT_SEXP);
        assert_eq!(body, &[9u8, 9]);
    }

    #[test]
    fn large_data_item_uses_eight_byte_header() {
        let mut payload = vec![DT_SEXP | DT_LARGE, 3, 0, 0, 0, 0, 0, 0];
        payload.extend_from_slice(&[7, 8, 9, 0]);
        let (kind, body) = data_item(&payload).unwrap();
        assert_eq!(kind, DT_SEXP);
        assert_eq!(body, &[7u8, 8, 9]);

        assert!(data_item(&[DT_SEXP | DT_LARGE, 9, 0, 0, 0, 0, 0, 0, 1]).is_err());
        assert!(data_item(&[DT_SEXP | DT_LARGE, 1, 0, 0]).is_err());
    }

    #[test]
    fn error_message_reads_string_item() {
        let mut payload = vec![DT_STRING, 8, 0, 0];
        payload.extend_from_slice(b"boom\0\0\0\0");
        assert_eq!(error_message(&payload).as_deref(), Some("boom"));
        assert_eq!(error_message(&[]), None);
    }
}
