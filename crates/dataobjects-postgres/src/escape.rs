//! Literal quoting for inline SQL.
//!
//! These follow the server's client library rules: escaping depends on the
//! negotiated client encoding and on `standard_conforming_strings`.

use dataobjects_core::{ArgumentError, ArgumentErrorKind, Error, Result};

/// Byte-length rules for the client encodings the server can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEncoding {
    /// Every byte is one character (LATIN*, WIN*, SQL_ASCII, KOI8...)
    SingleByte,
    Utf8,
    EucJp,
    EucTw,
    /// EUC_KR, EUC_CN, JOHAB: high-bit lead byte starts a 2-byte character
    EucTwoByte,
    Sjis,
    /// BIG5, GBK, UHC
    DoubleByte,
    Gb18030,
}

impl ClientEncoding {
    /// Classify a server encoding name (`UTF8`, `SJIS`, `euc_jp`...).
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "UTF8" | "UNICODE" => ClientEncoding::Utf8,
            "EUCJP" | "EUCJIS2004" => ClientEncoding::EucJp,
            "EUCTW" => ClientEncoding::EucTw,
            "EUCKR" | "EUCCN" | "JOHAB" => ClientEncoding::EucTwoByte,
            "SJIS" | "SHIFTJIS" | "SHIFTJIS2004" | "MSKANJI" | "WIN932" | "WINDOWS932" => {
                ClientEncoding::Sjis
            }
            "BIG5" | "WIN950" | "WINDOWS950" | "GBK" | "WIN936" | "WINDOWS936" | "UHC"
            | "WIN949" | "WINDOWS949" => ClientEncoding::DoubleByte,
            "GB18030" => ClientEncoding::Gb18030,
            _ => ClientEncoding::SingleByte,
        }
    }

    /// Length in bytes of the character starting at `s[0]`.
    fn char_len(self, s: &[u8]) -> usize {
        let Some(&lead) = s.first() else {
            return 0;
        };
        if lead < 0x80 {
            return 1;
        }
        match self {
            ClientEncoding::SingleByte => 1,
            ClientEncoding::Utf8 => {
                if lead & 0xe0 == 0xc0 {
                    2
                } else if lead & 0xf0 == 0xe0 {
                    3
                } else if lead & 0xf8 == 0xf0 {
                    4
                } else {
                    1
                }
            }
            ClientEncoding::EucJp => match lead {
                0x8e => 2,
                0x8f => 3,
                _ => 2,
            },
            ClientEncoding::EucTw => match lead {
                0x8e => 4,
                0x8f => 3,
                _ => 2,
            },
            ClientEncoding::EucTwoByte | ClientEncoding::DoubleByte => 2,
            ClientEncoding::Sjis => {
                // Half-width katakana are single bytes
                if (0xa1..=0xdf).contains(&lead) { 1 } else { 2 }
            }
            ClientEncoding::Gb18030 => match s.get(1) {
                Some(b) if (0x30..=0x39).contains(b) => 4,
                _ => 2,
            },
        }
    }
}

/// Quote `input` as a string literal.
///
/// `'` is doubled, `\` is doubled unless standard-conforming strings are
/// on, and multibyte characters are copied whole so a trail byte equal to
/// `\` or `'` is never mistaken for one.
pub fn quote_string(
    input: &[u8],
    encoding: ClientEncoding,
    standard_conforming_strings: bool,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() + 2 + input.len() / 8);
    out.push(b'\'');

    let mut i = 0;
    while i < input.len() {
        let c = input[i];
        if c == 0 {
            return Err(invalid_input("string literal cannot contain a NUL byte"));
        }
        if c == b'\'' {
            out.extend_from_slice(b"''");
            i += 1;
        } else if c == b'\\' && !standard_conforming_strings {
            out.extend_from_slice(b"\\\\");
            i += 1;
        } else if c < 0x80 {
            out.push(c);
            i += 1;
        } else {
            let len = encoding.char_len(&input[i..]);
            let Some(ch) = input.get(i..i + len) else {
                return Err(invalid_input("incomplete multibyte character"));
            };
            if ch.contains(&0) {
                return Err(invalid_input("incomplete multibyte character"));
            }
            out.extend_from_slice(ch);
            i += len;
        }
    }

    out.push(b'\'');
    Ok(out)
}

/// Quote binary data as a bytea literal.
///
/// Servers from 9.0 take the hex format; older ones get octal escapes.
pub fn quote_byte_array(
    input: &[u8],
    server_version_num: u32,
    standard_conforming_strings: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2 + 5);
    out.push(b'\'');

    if server_version_num >= 90_000 {
        if standard_conforming_strings {
            out.extend_from_slice(b"\\x");
        } else {
            out.extend_from_slice(b"\\\\x");
        }
        for b in input {
            out.push(HEX[usize::from(b >> 4)]);
            out.push(HEX[usize::from(b & 0x0f)]);
        }
    } else {
        for &c in input {
            if !(0x20..=0x7e).contains(&c) {
                if !standard_conforming_strings {
                    out.push(b'\\');
                }
                out.push(b'\\');
                out.push(b'0' + (c >> 6));
                out.push(b'0' + ((c >> 3) & 0o7));
                out.push(b'0' + (c & 0o7));
            } else if c == b'\'' {
                out.extend_from_slice(b"''");
            } else if c == b'\\' {
                if !standard_conforming_strings {
                    out.extend_from_slice(b"\\\\");
                }
                out.extend_from_slice(b"\\\\");
            } else {
                out.push(c);
            }
        }
    }

    out.push(b'\'');
    out
}

const HEX: &[u8; 16] = b"0123456789abcdef";

/// `server_version` as reported at startup, in `PG_VERSION_NUM` form.
///
/// `"9.6.24"` is 90624, `"16.2 (Debian 16.2-1)"` is 160002.
pub fn parse_server_version(version: &str) -> Option<u32> {
    let numeric: String = version
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = numeric.split('.').filter(|p| !p.is_empty());
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if major >= 10 {
        Some(major * 10_000 + minor)
    } else {
        let patch: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(major * 10_000 + minor * 100 + patch)
    }
}

fn invalid_input(message: &str) -> Error {
    Error::Argument(ArgumentError {
        kind: ArgumentErrorKind::InvalidInput,
        message: message.to_string(),
    })
}
