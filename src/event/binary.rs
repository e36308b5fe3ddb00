//! Binary character data.
//!
//! A source may hand the model an opaque byte payload instead of text (for
//! example the decoded content of an optimized attachment). The model keeps
//! it as-is; consumers that understand binary data can take the bytes from
//! [`PullSerializer::binary_data`](crate::serial::PullSerializer::binary_data),
//! everyone else sees base64 text.

use std::rc::Rc;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A shared, immutable binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryData {
    bytes: Rc<[u8]>,
    content_type: Option<String>,
}

impl BinaryData {
    /// Wraps `bytes`, optionally tagged with a MIME content type.
    pub fn new(bytes: impl Into<Rc<[u8]>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The MIME content type, if known.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Encodes the payload as base64 with padding.
    #[must_use]
    pub fn to_base64(&self) -> String {
        let mut out = String::with_capacity(self.bytes.len().div_ceil(3) * 4);
        for chunk in self.bytes.chunks(3) {
            let b0 = u32::from(chunk[0]);
            let b1 = chunk.get(1).copied().map_or(0, u32::from);
            let b2 = chunk.get(2).copied().map_or(0, u32::from);
            let triple = (b0 << 16) | (b1 << 8) | b2;
            for (i, shift) in [18u32, 12, 6, 0].into_iter().enumerate() {
                if i <= chunk.len() {
                    out.push(char::from(BASE64_ALPHABET[((triple >> shift) & 0x3F) as usize]));
                } else {
                    out.push('=');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base64_padding() {
        let encode = |s: &[u8]| BinaryData::new(s.to_vec(), None).to_base64();
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "Zg==");
        assert_eq!(encode(b"fo"), "Zm8=");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn test_content_type() {
        let data = BinaryData::new(vec![1, 2, 3], Some("image/png".to_string()));
        assert_eq!(data.content_type(), Some("image/png"));
        assert_eq!(data.bytes(), &[1, 2, 3]);
    }
}
