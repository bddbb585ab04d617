//! JSON codec.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::{Codec, CodecError, Format};

/// JSON text with configurable indentation. No comments.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    indent: Vec<u8>,
}

impl JsonCodec {
    pub fn new(indentation_spaces: usize) -> Self {
        Self {
            indent: vec![b' '; indentation_spaces],
        }
    }
}

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            format: Format::Json,
            reason: e.to_string(),
        })
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(&self.indent);
        let mut serializer = Serializer::with_formatter(&mut out, formatter);
        value
            .serialize(&mut serializer)
            .map_err(|e| CodecError::Encode {
                format: Format::Json,
                reason: e.to_string(),
            })?;
        out.push(b'\n');
        Ok(out)
    }
}
