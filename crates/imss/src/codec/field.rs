//! Field codec: primitive field values to and from block payloads.
//!
//! Binary payloads:
//! - fixed-size kinds are little-endian with the width from
//!   [`FieldKind::fixed_width`];
//! - `bytes` is a u32 length prefix plus raw bytes;
//! - `text` is an encoding byte (0 UTF-8, 1 UTF-16LE), a u32 byte length and
//!   the raw bytes.
//!
//! Text renderings use `true`/`false`, decimal integers, round-trip floats,
//! hyphenated GUIDs, lowercase hex for bytes and escaped strings.

use crate::codec::primitives::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_BYTES_LEN, MAX_STRING_LEN};
use crate::model::{FieldKind, TextEncoding, Value, format_guid, parse_guid};

// =============================================================================
// BINARY
// =============================================================================

/// Encodes a scalar value.
///
/// Object and collection values are framed as blocks by the graph writer;
/// passing one here fails with [`EncodeError::NotScalar`].
pub fn encode_scalar(
    writer: &mut Writer,
    value: &Value,
    encoding: TextEncoding,
) -> Result<(), EncodeError> {
    match value {
        Value::Bool(b) => writer.write_byte(u8::from(*b)),
        Value::Byte(b) => writer.write_byte(*b),
        Value::Int32(v) => writer.write_bytes(&v.to_le_bytes()),
        Value::Int64(v) => writer.write_bytes(&v.to_le_bytes()),
        Value::Float64(v) => writer.write_bytes(&v.to_le_bytes()),
        Value::Guid(id) => writer.write_guid(id),
        Value::Text(s) => encode_text(writer, s, encoding)?,
        Value::Bytes(b) => {
            if b.len() > MAX_BYTES_LEN {
                return Err(EncodeError::LengthExceedsLimit {
                    field: "bytes",
                    len: b.len(),
                    max: MAX_BYTES_LEN,
                });
            }
            writer.write_len_prefixed(b, "bytes")?;
        }
        Value::Object(_) | Value::Collection(_) => {
            return Err(EncodeError::NotScalar { found: value.kind() });
        }
    }
    Ok(())
}

fn encode_text(writer: &mut Writer, s: &str, encoding: TextEncoding) -> Result<(), EncodeError> {
    writer.write_byte(encoding as u8);
    let bytes = match encoding {
        TextEncoding::Utf8 => s.as_bytes().to_vec(),
        TextEncoding::Utf16 => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
    };
    if bytes.len() > MAX_STRING_LEN {
        return Err(EncodeError::LengthExceedsLimit {
            field: "text",
            len: bytes.len(),
            max: MAX_STRING_LEN,
        });
    }
    writer.write_len_prefixed(&bytes, "text")
}

/// Decodes a scalar value of the given kind.
///
/// The caller has already checked the kind against the declared field.
pub fn decode_scalar(reader: &mut Reader<'_>, kind: FieldKind) -> Result<Value, DecodeError> {
    match kind {
        FieldKind::Bool => {
            let offset = reader.position();
            match reader.read_byte("bool")? {
                0x00 => Ok(Value::Bool(false)),
                0x01 => Ok(Value::Bool(true)),
                value => Err(DecodeError::InvalidBool { value, offset }),
            }
        }
        FieldKind::Byte => Ok(Value::Byte(reader.read_byte("byte")?)),
        FieldKind::Int32 => Ok(Value::Int32(i32::from_le_bytes(reader.read_array("int32")?))),
        FieldKind::Int64 => Ok(Value::Int64(i64::from_le_bytes(reader.read_array("int64")?))),
        FieldKind::Float64 => Ok(Value::Float64(f64::from_le_bytes(
            reader.read_array("float64")?,
        ))),
        FieldKind::Guid => Ok(Value::Guid(reader.read_guid("guid")?)),
        FieldKind::Text => decode_text(reader),
        FieldKind::Bytes => Ok(Value::Bytes(
            reader.read_len_prefixed(MAX_BYTES_LEN, "bytes")?.to_vec(),
        )),
        FieldKind::Object | FieldKind::Collection => Err(DecodeError::Malformed {
            context: "structural kind in scalar position",
            offset: reader.position(),
        }),
    }
}

fn decode_text(reader: &mut Reader<'_>) -> Result<Value, DecodeError> {
    let offset = reader.position();
    let mode = reader.read_byte("text encoding")?;
    let encoding = TextEncoding::from_u8(mode).ok_or(DecodeError::InvalidMode {
        context: "text encoding",
        mode,
        offset,
    })?;
    let offset = reader.position();
    let bytes = reader.read_len_prefixed(MAX_STRING_LEN, "text")?;
    let text = match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { field: "text", offset })?,
        TextEncoding::Utf16 => {
            if bytes.len() % 2 != 0 {
                return Err(DecodeError::InvalidUtf16 { field: "text", offset });
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|_| DecodeError::InvalidUtf16 { field: "text", offset })?
        }
    };
    Ok(Value::Text(text))
}

// =============================================================================
// TEXT
// =============================================================================

/// Renders a scalar value for the text encoding.
pub fn render_scalar(value: &Value) -> Result<String, EncodeError> {
    let rendered = match value {
        Value::Bool(b) => b.to_string(),
        Value::Byte(b) => b.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => format!("{:?}", v),
        Value::Guid(id) => format_guid(id),
        Value::Text(s) => {
            let mut out = String::with_capacity(s.len());
            escape_value(s, &mut out);
            out
        }
        Value::Bytes(b) => encode_hex(b),
        Value::Object(_) | Value::Collection(_) => {
            return Err(EncodeError::NotScalar { found: value.kind() });
        }
    };
    Ok(rendered)
}

/// Parses the text rendering of a scalar value.
///
/// `raw` is still escaped; `offset` locates it for diagnostics.
pub fn parse_scalar(kind: FieldKind, raw: &str, offset: usize) -> Result<Value, DecodeError> {
    let malformed = |context| DecodeError::Malformed { context, offset };
    match kind {
        FieldKind::Bool => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(malformed("bool")),
        },
        FieldKind::Byte => raw.parse().map(Value::Byte).map_err(|_| malformed("byte")),
        FieldKind::Int32 => raw.parse().map(Value::Int32).map_err(|_| malformed("int32")),
        FieldKind::Int64 => raw.parse().map(Value::Int64).map_err(|_| malformed("int64")),
        FieldKind::Float64 => raw
            .parse()
            .map(Value::Float64)
            .map_err(|_| malformed("float64")),
        FieldKind::Guid => parse_guid(raw).map(Value::Guid).ok_or(malformed("guid")),
        FieldKind::Text => unescape(raw, offset).map(Value::Text),
        FieldKind::Bytes => decode_hex(raw).map(Value::Bytes).ok_or(malformed("bytes")),
        FieldKind::Object | FieldKind::Collection => {
            Err(malformed("structural kind in scalar position"))
        }
    }
}

/// Characters escaped in every text token.
const VALUE_SPECIALS: &[char] = &['\\', '~', '{', '}'];

/// Characters additionally escaped in type and field names.
const NAME_SPECIALS: &[char] = &[':', '=', '@', '%', '$', '#'];

fn escape_with(s: &str, out: &mut String, extra: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if VALUE_SPECIALS.contains(&c) || extra.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

/// Escapes a text value: `\`, `~`, `{`, `}` and line breaks.
pub fn escape_value(s: &str, out: &mut String) {
    escape_with(s, out, &[]);
}

/// Escapes a type or field name, which may also not contain unescaped
/// `:`, `=` or the line sigils `@ % $ #`.
pub fn escape_name(s: &str, out: &mut String) {
    escape_with(s, out, NAME_SPECIALS);
}

/// Reverses [`escape_value`] and [`escape_name`].
pub fn unescape(raw: &str, offset: usize) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(escaped) => out.push(escaped),
            None => {
                return Err(DecodeError::Malformed {
                    context: "escape sequence",
                    offset,
                });
            }
        }
    }
    Ok(out)
}

/// Finds the byte index of the first unescaped `delim`.
pub fn find_unescaped(s: &str, delim: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == delim {
            return Some(idx);
        }
    }
    None
}

/// Splits on unescaped `delim`, leaving escapes in the parts.
pub fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(idx) = find_unescaped(rest, delim) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + delim.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Formats bytes as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        s.push(DIGITS[(byte >> 4) as usize] as char);
        s.push(DIGITS[(byte & 0x0F) as usize] as char);
    }
    s
}

/// Parses lowercase or uppercase hex into bytes.
///
/// Only hex digits are accepted, two per byte.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Guid;

    fn binary_roundtrip(value: &Value, encoding: TextEncoding) -> Value {
        let mut writer = Writer::new();
        encode_scalar(&mut writer, value, encoding).unwrap();
        if let Some(width) = value.kind().fixed_width() {
            assert_eq!(writer.len(), width, "width of {:?}", value.kind());
        }
        let mut reader = Reader::new(writer.as_bytes());
        let decoded = decode_scalar(&mut reader, value.kind()).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    fn scalar_samples() -> Vec<Value> {
        vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::Byte(200),
            Value::Int32(-42),
            Value::Int64(i64::MIN),
            Value::Float64(3.25),
            Value::Float64(f64::NEG_INFINITY),
            Value::Guid(Guid::from_bytes([7u8; 16])),
            Value::text("Composition 1"),
            Value::text("tilde~brace{}\nnewline"),
            Value::Bytes(vec![0, 1, 0xAB, 0xFF]),
        ]
    }

    #[test]
    fn test_binary_scalars_roundtrip() {
        for value in scalar_samples() {
            assert_eq!(binary_roundtrip(&value, TextEncoding::Utf8), value);
        }
    }

    #[test]
    fn test_utf16_text_layout() {
        let mut writer = Writer::new();
        encode_scalar(&mut writer, &Value::text("hé"), TextEncoding::Utf16).unwrap();
        assert_eq!(writer.as_bytes(), &[1, 4, 0, 0, 0, b'h', 0, 0xE9, 0]);

        let decoded = binary_roundtrip(&Value::text("astral \u{1F600}"), TextEncoding::Utf16);
        assert_eq!(decoded, Value::text("astral \u{1F600}"));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let data = [2u8];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            decode_scalar(&mut reader, FieldKind::Bool),
            Err(DecodeError::InvalidBool { value: 2, offset: 0 })
        ));
    }

    #[test]
    fn test_odd_utf16_rejected() {
        let data = [1u8, 3, 0, 0, 0, b'a', 0, b'b'];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            decode_scalar(&mut reader, FieldKind::Text),
            Err(DecodeError::InvalidUtf16 { .. })
        ));
    }

    #[test]
    fn test_unknown_text_encoding_rejected() {
        let data = [9u8, 0, 0, 0, 0];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            decode_scalar(&mut reader, FieldKind::Text),
            Err(DecodeError::InvalidMode { mode: 9, .. })
        ));
    }

    #[test]
    fn test_text_scalars_roundtrip() {
        for value in scalar_samples() {
            let rendered = render_scalar(&value).unwrap();
            assert!(!rendered.contains('\n'), "{rendered:?} spans lines");
            assert_eq!(parse_scalar(value.kind(), &rendered, 0).unwrap(), value);
        }
    }

    #[test]
    fn test_structural_kinds_rejected_by_scalar_codec() {
        let mut writer = Writer::new();
        assert!(matches!(
            encode_scalar(&mut writer, &Value::Object(None), TextEncoding::Utf8),
            Err(EncodeError::NotScalar { found: FieldKind::Object })
        ));
        assert!(writer.is_empty());
        assert!(matches!(
            render_scalar(&Value::Collection(Vec::new())),
            Err(EncodeError::NotScalar { found: FieldKind::Collection })
        ));

        let mut reader = Reader::new(&[]);
        assert!(matches!(
            decode_scalar(&mut reader, FieldKind::Collection),
            Err(DecodeError::Malformed { offset: 0, .. })
        ));
        assert!(matches!(
            parse_scalar(FieldKind::Object, "", 7),
            Err(DecodeError::Malformed { offset: 7, .. })
        ));
    }

    #[test]
    fn test_hex_requires_digits() {
        assert_eq!(decode_hex("00aBff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(decode_hex("+f"), None);
        assert_eq!(decode_hex("-1"), None);
        assert_eq!(decode_hex("0g"), None);
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex(""), Some(Vec::new()));
    }

    #[test]
    fn test_escape_delimiters() {
        let mut out = String::new();
        escape_value("a~b{c}d\\e\nf", &mut out);
        assert_eq!(out, "a\\~b\\{c\\}d\\\\e\\nf");
        assert_eq!(unescape(&out, 0).unwrap(), "a~b{c}d\\e\nf");

        let mut name = String::new();
        escape_name("x=y:z@", &mut name);
        assert_eq!(name, "x\\=y\\:z\\@");
    }

    #[test]
    fn test_split_respects_escapes() {
        assert_eq!(split_unescaped("a~b\\~c~d", '~'), ["a", "b\\~c", "d"]);
        assert_eq!(split_unescaped("a\\\\~b", '~'), ["a\\\\", "b"]);
        assert_eq!(split_unescaped("", '~'), [""]);
        assert_eq!(find_unescaped("k\\=x=v", '='), Some(4));
    }

    #[test]
    fn test_dangling_escape_rejected() {
        assert!(matches!(
            unescape("abc\\", 17),
            Err(DecodeError::Malformed { offset: 17, .. })
        ));
    }

    #[test]
    fn test_malformed_scalars() {
        assert!(parse_scalar(FieldKind::Int32, "4.5", 0).is_err());
        assert!(parse_scalar(FieldKind::Byte, "256", 0).is_err());
        assert!(parse_scalar(FieldKind::Bool, "yes", 0).is_err());
        assert!(parse_scalar(FieldKind::Bytes, "abc", 0).is_err());
        assert!(parse_scalar(FieldKind::Guid, "not-a-guid", 0).is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        assert_eq!(encode_hex(&[0x00, 0x7f, 0xff]), "007fff");
        assert_eq!(decode_hex("007FFF"), Some(vec![0x00, 0x7f, 0xff]));
        assert_eq!(decode_hex(""), Some(vec![]));
        assert_eq!(decode_hex("zz"), None);
    }
}
