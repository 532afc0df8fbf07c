//! Decoding of QAP1 SEXP payloads into [`RValue`].
//!
//! A SEXP is a header byte (`type | XT_LARGE | XT_HAS_ATTR`), a 24-bit (or
//! 56-bit when large) little-endian length, an optional attribute SEXP and
//! then the type-specific body.

use crate::error::RserveError;
use crate::value::{RValue, NA_INTEGER};

pub const XT_NULL: u8 = 0;
pub const XT_INT: u8 = 1;
pub const XT_DOUBLE: u8 = 2;
pub const XT_STR: u8 = 3;
pub const XT_LANG: u8 = 4;
pub const XT_SYM: u8 = 5;
pub const XT_BOOL: u8 = 6;
pub const XT_S4: u8 = 7;
pub const XT_VECTOR: u8 = 16;
pub const XT_LIST: u8 = 17;
pub const XT_CLOS: u8 = 18;
pub const XT_SYMNAME: u8 = 19;
pub const XT_LIST_NOTAG: u8 = 20;
pub const XT_LIST_TAG: u8 = 21;
pub const XT_LANG_NOTAG: u8 = 22;
pub const XT_LANG_TAG: u8 = 23;
pub const XT_VECTOR_EXP: u8 = 26;
pub const XT_VECTOR_STR: u8 = 27;
pub const XT_ARRAY_INT: u8 = 32;
pub const XT_ARRAY_DOUBLE: u8 = 33;
pub const XT_ARRAY_STR: u8 = 34;
pub const XT_ARRAY_BOOL_UA: u8 = 35;
pub const XT_ARRAY_BOOL: u8 = 36;
pub const XT_RAW: u8 = 37;
pub const XT_ARRAY_CPLX: u8 = 38;
pub const XT_UNKNOWN: u8 = 48;

pub const XT_LARGE: u8 = 0x40;
pub const XT_HAS_ATTR: u8 = 0x80;

const MAX_DEPTH: usize = 128;

/// Decode a single SEXP occupying `buf`.
pub fn parse(buf: &[u8]) -> Result<RValue, RserveError> {
    let (value, _) = parse_sexp(buf, 0)?;
    Ok(value)
}

fn protocol(msg: impl Into<String>) -> RserveError {
    RserveError::Protocol(msg.into())
}

/// Parse one SEXP at the start of `buf`, returning it and the number of
/// bytes consumed.
fn parse_sexp(buf: &[u8], depth: usize) -> Result<(RValue, usize), RserveError> {
    if depth > MAX_DEPTH {
        return Err(protocol("SEXP nesting too deep"));
    }
    if buf.len() < 4 {
        return Err(protocol("truncated SEXP header"));
    }

    let head = buf[0];
    let xt = head & 0x3f;
    let (len, offset) = if head & XT_LARGE != 0 {
        if buf.len() < 8 {
            return Err(protocol("truncated large SEXP header"));
        }
        let mut raw = [0u8; 8];
        raw[..7].copy_from_slice(&buf[1..8]);
        (u64::from_le_bytes(raw) as usize, 8usize)
    } else {
        (u32::from_le_bytes([buf[1], buf[2], buf[3], 0]) as usize, 4usize)
    };
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| protocol(format!("SEXP type {xt} overruns its container")))?;
    let content = &buf[offset..end];

    let (attr, body) = if head & XT_HAS_ATTR != 0 {
        let (attr, used) = parse_sexp(content, depth + 1)?;
        (Some(attr), &content[used..])
    } else {
        (None, content)
    };

    let value = match xt {
        XT_NULL => RValue::Null,
        XT_INT | XT_ARRAY_INT => RValue::Ints(ints(body)?),
        XT_DOUBLE | XT_ARRAY_DOUBLE => RValue::Doubles(doubles(body)?),
        XT_STR => RValue::Strings(vec![Some(c_string(body))]),
        XT_SYMNAME => RValue::Symbol(c_string(body)),
        XT_SYM => match parse_sexp(body, depth + 1) {
            Ok((RValue::Symbol(s), _)) => RValue::Symbol(s),
            Ok((RValue::Strings(mut v), _)) if v.len() == 1 => {
                RValue::Symbol(v.pop().flatten().unwrap_or_default())
            }
            _ => RValue::Symbol(c_string(body)),
        },
        XT_BOOL => RValue::Logicals(body.first().map(|&b| logical(b)).into_iter().collect()),
        XT_ARRAY_BOOL | XT_ARRAY_BOOL_UA => RValue::Logicals(logicals(body)?),
        XT_ARRAY_STR => RValue::Strings(strings(body)),
        XT_RAW => RValue::Raw(raw(body)?),
        XT_VECTOR | XT_VECTOR_EXP | XT_VECTOR_STR | XT_LIST_NOTAG | XT_LANG_NOTAG => {
            RValue::List {
                values: sequence(body, depth)?,
                names: attr.as_ref().and_then(names_attr),
            }
        }
        XT_LIST_TAG | XT_LANG_TAG => tagged(body, depth)?,
        XT_LANG | XT_S4 | XT_LIST | XT_CLOS | XT_ARRAY_CPLX | XT_UNKNOWN => RValue::Unsupported(xt),
        other => RValue::Unsupported(other),
    };

    Ok((value, end))
}

/// Extract the `names` attribute, if present.
fn names_attr(attr: &RValue) -> Option<Vec<String>> {
    match attr.get("names")? {
        RValue::Strings(names) => Some(names.iter().map(|n| n.clone().unwrap_or_default()).collect()),
        RValue::Symbol(name) => Some(vec![name.clone()]),
        _ => None,
    }
}

fn ints(body: &[u8]) -> Result<Vec<Option<i32>>, RserveError> {
    if body.len() % 4 != 0 {
        return Err(protocol("integer array length is not a multiple of 4"));
    }
    Ok(body
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .map(|v| (v != NA_INTEGER).then_some(v))
        .collect())
}

fn doubles(body: &[u8]) -> Result<Vec<f64>, RserveError> {
    if body.len() % 8 != 0 {
        return Err(protocol("double array length is not a multiple of 8"));
    }
    Ok(body
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

/// NUL-terminated string, ignoring padding.
fn c_string(body: &[u8]) -> String {
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Sequence of NUL-terminated strings padded with `\x01`. A lone `\xff`
/// marks `NA`.
fn strings(body: &[u8]) -> Vec<Option<String>> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(nul) = rest.iter().position(|&b| b == 0) {
        let s = &rest[..nul];
        out.push(if s == [0xff] {
            None
        } else {
            Some(String::from_utf8_lossy(s).into_owned())
        });
        rest = &rest[nul + 1..];
    }
    out
}

fn logical(b: u8) -> Option<bool> {
    match b {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// Count-prefixed byte array; shared by logical and raw vectors.
fn counted(body: &[u8]) -> Result<&[u8], RserveError> {
    if body.len() < 4 {
        return Err(protocol("truncated vector length"));
    }
    let n = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    body.get(4..4 + n)
        .ok_or_else(|| protocol("vector length exceeds its SEXP"))
}

fn logicals(body: &[u8]) -> Result<Vec<Option<bool>>, RserveError> {
    Ok(counted(body)?.iter().map(|&b| logical(b)).collect())
}

fn raw(body: &[u8]) -> Result<Vec<u8>, RserveError> {
    Ok(counted(body)?.to_vec())
}

fn sequence(mut body: &[u8], depth: usize) -> Result<Vec<RValue>, RserveError> {
    let mut values = Vec::new();
    while !body.is_empty() {
        let (value, used) = parse_sexp(body, depth + 1)?;
        values.push(value);
        body = &body[used..];
    }
    Ok(values)
}

/// Pairlist of `(value, tag)` SEXPs.
fn tagged(mut body: &[u8], depth: usize) -> Result<RValue, RserveError> {
    let mut values = Vec::new();
    let mut names = Vec::new();
    while !body.is_empty() {
        let (value, used) = parse_sexp(body, depth + 1)?;
        body = &body[used..];
        let (tag, used) = parse_sexp(body, depth + 1)?;
        body = &body[used..];

        names.push(match tag {
            RValue::Symbol(s) => s,
            RValue::Strings(mut v) if v.len() == 1 => v.pop().flatten().unwrap_or_default(),
            _ => String::new(),
        });
        values.push(value);
    }
    Ok(RValue::List {
        values,
        names: Some(names),
    })
}

/// Encoders used by tests here and by the fake daemon in integration tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod encode {
    use super::*;

    fn header(xt: u8, len: usize) -> Vec<u8> {
        if len > 0x00ff_ffff {
            let mut h = vec![xt | XT_LARGE];
            h.extend_from_slice(&(len as u64).to_le_bytes()[..7]);
            h
        } else {
            let l = (len as u32).to_le_bytes();
            vec![xt, l[0], l[1], l[2]]
        }
    }

    fn pad4(mut body: Vec<u8>, fill: u8) -> Vec<u8> {
        while body.len() % 4 != 0 {
            body.push(fill);
        }
        body
    }

    fn with_attr(xt: u8, attr: Option<Vec<u8>>, body: Vec<u8>) -> Vec<u8> {
        let (xt, content) = match attr {
            Some(mut a) => {
                a.extend(body);
                (xt | XT_HAS_ATTR, a)
            }
            None => (xt, body),
        };
        let mut out = header(xt, content.len());
        out.extend(content);
        out
    }

    pub fn null() -> Vec<u8> {
        header(XT_NULL, 0)
    }

    pub fn ints(values: &[i32]) -> Vec<u8> {
        let body = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        with_attr(XT_ARRAY_INT, None, body)
    }

    pub fn doubles(values: &[f64]) -> Vec<u8> {
        let body = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        with_attr(XT_ARRAY_DOUBLE, None, body)
    }

    pub fn strings(values: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for v in values {
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        with_attr(XT_ARRAY_STR, None, pad4(body, 1))
    }

    pub fn raw(bytes: &[u8]) -> Vec<u8> {
        let mut body = (bytes.len() as u32).to_le_bytes().to_vec();
        body.extend_from_slice(bytes);
        with_attr(XT_RAW, None, pad4(body, 0))
    }

    pub fn symname(name: &str) -> Vec<u8> {
        let mut body = name.as_bytes().to_vec();
        body.push(0);
        with_attr(XT_SYMNAME, None, pad4(body, 0))
    }

    /// Generic vector with a `names` attribute, as R sends a named list or
    /// data frame.
    pub fn named_list(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let names: Vec<&str> = entries.iter().map(|(n, _)| *n).collect();
        let mut attr_body = strings(&names);
        attr_body.extend(symname("names"));
        let attr = with_attr(XT_LIST_TAG, None, attr_body);

        let body = entries.iter().flat_map(|(_, v)| v.clone()).collect();
        with_attr(XT_VECTOR, Some(attr), body)
    }

    /// Wrap a SEXP in a `DT_SEXP` data item, as it appears in a response.
    pub fn dt_sexp(sexp: &[u8]) -> Vec<u8> {
        let l = (sexp.len() as u32).to_le_bytes();
        let mut out = vec![crate::protocol::DT_SEXP, l[0], l[1], l[2]];
        out.extend_from_slice(sexp);
        out
    }
}
