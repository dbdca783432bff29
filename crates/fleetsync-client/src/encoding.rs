//! Response text encodings
//!
//! Some store deployments answer in ISO-8859-1 regardless of the declared
//! content type, so the client decodes raw bytes itself before parsing.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Text encoding of record store responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(
        rename = "latin1",
        alias = "iso-8859-1",
        alias = "ISO-8859-1",
        alias = "latin-1"
    )]
    Latin1,
}

impl TextEncoding {
    /// Decode response bytes into text
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| StoreError::Decode(format!("invalid UTF-8: {}", e))),
            // Every byte maps to the code point of the same value
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }

    /// Encode text in this encoding; unrepresentable characters become `?`
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Charset label for `Content-Type` headers
    pub fn charset(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "ISO-8859-1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_decode() {
        // "São Paulo" in ISO-8859-1
        let bytes = [b'S', 0xE3, b'o', b' ', b'P', b'a', b'u', b'l', b'o'];
        assert_eq!(TextEncoding::Latin1.decode(&bytes).unwrap(), "São Paulo");
    }

    #[test]
    fn test_latin1_bytes_are_invalid_utf8() {
        let bytes = [b'S', 0xE3, b'o'];
        assert!(matches!(
            TextEncoding::Utf8.decode(&bytes),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn test_latin1_encode_replaces_unrepresentable() {
        assert_eq!(TextEncoding::Latin1.encode("ã€"), vec![0xE3, b'?']);
    }

    #[test]
    fn test_deserialize_labels() {
        let enc: TextEncoding = serde_json::from_str("\"iso-8859-1\"").unwrap();
        assert_eq!(enc, TextEncoding::Latin1);
        let enc: TextEncoding = serde_json::from_str("\"utf8\"").unwrap();
        assert_eq!(enc, TextEncoding::Utf8);
    }
}
