//! Stream filter pipeline (§4.H), grounded on `original_source/src/filter.c`'s
//! `pdf_apply_filter` dispatch and `original_source/src/codec/ascii_hex.c`.
//! `FlateDecode` delegates to [`crate::deflate::inflate`]; any filter name
//! not in spec.md's required set is rejected rather than silently passed
//! through, matching the source's `default: return PDF_ERR_FILTER_UNKNOWN`
//! branch.

use crate::deflate::inflate;
use crate::error::{Error, FilterError, Result};

/// One entry of a `/Filter` array (possibly length 1), paired by position
/// with the matching `/DecodeParms` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    AsciiHexDecode,
    FlateDecode,
}

impl Filter {
    pub fn from_name(name: &[u8]) -> Result<Filter> {
        match name {
            b"ASCIIHexDecode" => Ok(Filter::AsciiHexDecode),
            b"FlateDecode" => Ok(Filter::FlateDecode),
            _ => Err(Error::Filter(FilterError::InvalidFilter)),
        }
    }
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decodes an `ASCIIHexDecode` stream body. Whitespace between digit pairs
/// is ignored; the terminating `>` is optional (some producers omit it);
/// an odd trailing digit is right-padded with a zero nibble per PDF
/// 32000-1 7.4.2.
pub fn ascii_hex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut high_nibble: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let digit = hex_digit(byte).ok_or(Error::Filter(FilterError::AsciiHexInvalid))?;
        match high_nibble.take() {
            Some(high) => out.push((high << 4) | digit),
            None => high_nibble = Some(digit),
        }
    }

    if let Some(high) = high_nibble {
        out.push(high << 4);
    }

    Ok(out)
}

/// Applies a single filter to a stream body.
pub fn decode(filter: Filter, data: &[u8]) -> Result<Vec<u8>> {
    match filter {
        Filter::AsciiHexDecode => ascii_hex_decode(data),
        Filter::FlateDecode => inflate(data),
    }
}

/// Applies a chain of filters in order, the way a `/Filter` array is
/// applied left to right.
pub fn decode_chain(filters: &[Filter], data: &[u8]) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for &filter in filters {
        current = decode(filter, &current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii_hex_with_terminator() {
        assert_eq!(ascii_hex_decode(b"48656c6c6f>").unwrap(), b"Hello");
    }

    #[test]
    fn decodes_ascii_hex_ignoring_whitespace() {
        assert_eq!(ascii_hex_decode(b"48 65 6c 6c 6f").unwrap(), b"Hello");
    }

    #[test]
    fn odd_digit_count_pads_final_nibble() {
        assert_eq!(ascii_hex_decode(b"1").unwrap(), vec![0x10]);
    }

    #[test]
    fn rejects_non_hex_digit() {
        assert_eq!(
            ascii_hex_decode(b"zz"),
            Err(Error::Filter(FilterError::AsciiHexInvalid))
        );
    }

    #[test]
    fn unknown_filter_name_is_rejected() {
        assert_eq!(
            Filter::from_name(b"LZWDecode"),
            Err(Error::Filter(FilterError::InvalidFilter))
        );
    }

    #[test]
    fn decode_chain_applies_ascii_hex_then_flate() {
        // "014a1ecf033f" hex-decodes to an uncompressed DEFLATE block
        // holding the three bytes 0x4a 0x1e 0xcf.
        let hex = b"010300fcff4a1ecf>";
        let out = decode_chain(&[Filter::AsciiHexDecode, Filter::FlateDecode], hex).unwrap();
        assert_eq!(out, vec![0x4a, 0x1e, 0xcf]);
    }
}
