//! Message codec.
//!
//! One message is stored as one cell whose value is a small map of named
//! sub-columns:
//!
//! | column        | content                                             |
//! |---------------|-----------------------------------------------------|
//! | `MessageId`   | rendered id, checked against the cell address       |
//! | `Body`        | body, encoded per `BodyCodec`                       |
//! | `BodyCodec`   | `text`, `base64` or `gzip` (base64 of gzip bytes)   |
//! | `attr.<name>` | one entry per message attribute                     |
//!
//! Compression is a per-queue flag and never visible to callers.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::domain::{Message, MessageAttributes, MessageId, ReceiptHandle, RowKey, SluiceError};
use crate::ports::{Cell, CellValue};

const COL_MESSAGE_ID: &str = "MessageId";
const COL_BODY: &str = "Body";
const COL_BODY_CODEC: &str = "BodyCodec";
const ATTR_PREFIX: &str = "attr.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyCodec {
    Text,
    Base64,
    Gzip,
}

impl BodyCodec {
    fn as_str(self) -> &'static str {
        match self {
            BodyCodec::Text => "text",
            BodyCodec::Base64 => "base64",
            BodyCodec::Gzip => "gzip",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(BodyCodec::Text),
            "base64" => Some(BodyCodec::Base64),
            "gzip" => Some(BodyCodec::Gzip),
            _ => None,
        }
    }
}

pub fn encode(
    id: &MessageId,
    body: &[u8],
    attributes: &MessageAttributes,
    compress: bool,
) -> Result<CellValue, SluiceError> {
    let (codec, stored) = if compress {
        let zipped = gzip(body)
            .map_err(|e| SluiceError::InvalidMessageContents(format!("cannot compress body: {e}")))?;
        (BodyCodec::Gzip, general_purpose::STANDARD.encode(zipped))
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (BodyCodec::Text, text.to_string()),
            Err(_) => (BodyCodec::Base64, general_purpose::STANDARD.encode(body)),
        }
    };

    let mut value = CellValue::new();
    value.insert(COL_MESSAGE_ID.to_string(), id.to_string());
    value.insert(COL_BODY.to_string(), stored);
    value.insert(COL_BODY_CODEC.to_string(), codec.as_str().to_string());
    for (name, attr) in attributes.iter() {
        value.insert(format!("{ATTR_PREFIX}{name}"), attr.to_string());
    }
    Ok(value)
}

/// Rebuild the message stored in `cell` of `row`.
///
/// Any missing column, unknown codec, undecodable body or an embedded id that
/// does not match the cell's address is a `CorruptRecord`.
pub fn decode(row: &RowKey, cell: &Cell) -> Result<Message, SluiceError> {
    let message_id = ReceiptHandle::new(row.clone(), cell.column);
    let value = &cell.value;

    let stored_id = column(value, COL_MESSAGE_ID, &message_id)?;
    if stored_id != message_id.to_string() {
        return Err(SluiceError::corrupt(format!(
            "cell {message_id} carries foreign message id {stored_id}"
        )));
    }

    let raw_codec = column(value, COL_BODY_CODEC, &message_id)?;
    let codec = BodyCodec::parse(raw_codec).ok_or_else(|| {
        SluiceError::corrupt(format!("cell {message_id} has unknown body codec {raw_codec}"))
    })?;
    let stored = column(value, COL_BODY, &message_id)?;
    let body = match codec {
        BodyCodec::Text => stored.as_bytes().to_vec(),
        BodyCodec::Base64 => general_purpose::STANDARD
            .decode(stored)
            .map_err(|e| SluiceError::corrupt(format!("cell {message_id}: bad base64 body: {e}")))?,
        BodyCodec::Gzip => {
            let zipped = general_purpose::STANDARD.decode(stored).map_err(|e| {
                SluiceError::corrupt(format!("cell {message_id}: bad base64 body: {e}"))
            })?;
            let mut body = Vec::new();
            GzDecoder::new(zipped.as_slice())
                .read_to_end(&mut body)
                .map_err(|e| {
                    SluiceError::corrupt(format!("cell {message_id}: bad gzip body: {e}"))
                })?;
            body
        }
    };

    let attributes: MessageAttributes = value
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(ATTR_PREFIX)
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect();

    Ok(Message {
        message_id,
        body,
        attributes,
        receipt_handle: None,
    })
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn column<'a>(value: &'a CellValue, name: &str, id: &MessageId) -> Result<&'a str, SluiceError> {
    value
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| SluiceError::corrupt(format!("cell {id} is missing column {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderingKey;
    use rstest::rstest;

    fn address() -> (RowKey, OrderingKey) {
        (RowKey::new("abc", 0, 1), OrderingKey::new(1_700_000_000_000, 9))
    }

    fn round_trip(body: &[u8], compress: bool) -> Message {
        let (row, key) = address();
        let id = ReceiptHandle::new(row.clone(), key);
        let mut attrs = MessageAttributes::new();
        attrs.set_sent_timestamp(1_700_000_000_000);
        attrs.insert("x-custom", "kept");
        let value = encode(&id, body, &attrs, compress).unwrap();
        let message = decode(&row, &Cell { column: key, value }).unwrap();
        assert_eq!(message.message_id, id);
        assert_eq!(message.attributes, attrs);
        message
    }

    #[rstest]
    #[case::plain_text(b"hello world".as_slice(), false)]
    #[case::compressed_text(b"hello world".as_slice(), true)]
    #[case::binary(&[0u8, 159, 146, 150, 255], false)]
    #[case::compressed_binary(&[0u8, 159, 146, 150, 255], true)]
    fn body_survives_storage(#[case] body: &[u8], #[case] compress: bool) {
        assert_eq!(round_trip(body, compress).body, body);
    }

    #[test]
    fn compressed_body_is_not_stored_verbatim() {
        let (row, key) = address();
        let id = ReceiptHandle::new(row, key);
        let body = "a".repeat(512);
        let value = encode(&id, body.as_bytes(), &MessageAttributes::new(), true).unwrap();
        assert_eq!(value[COL_BODY_CODEC], "gzip");
        assert!(value[COL_BODY].len() < body.len());
    }

    #[test]
    fn missing_body_is_corrupt() {
        let (row, key) = address();
        let id = ReceiptHandle::new(row.clone(), key);
        let mut value = encode(&id, b"x", &MessageAttributes::new(), false).unwrap();
        value.remove(COL_BODY);
        let err = decode(&row, &Cell { column: key, value }).unwrap_err();
        assert!(matches!(err, SluiceError::CorruptRecord(_)));
    }

    #[test]
    fn foreign_id_is_corrupt() {
        let (row, key) = address();
        let id = ReceiptHandle::new(row.with_partition(7), key);
        let value = encode(&id, b"x", &MessageAttributes::new(), false).unwrap();
        let err = decode(&row, &Cell { column: key, value }).unwrap_err();
        assert!(matches!(err, SluiceError::CorruptRecord(_)));
    }

    #[test]
    fn garbage_gzip_is_corrupt() {
        let (row, key) = address();
        let id = ReceiptHandle::new(row.clone(), key);
        let mut value = encode(&id, b"x", &MessageAttributes::new(), true).unwrap();
        value.insert(COL_BODY.to_string(), general_purpose::STANDARD.encode(b"not gzip"));
        let err = decode(&row, &Cell { column: key, value }).unwrap_err();
        assert!(matches!(err, SluiceError::CorruptRecord(_)));
    }
}
