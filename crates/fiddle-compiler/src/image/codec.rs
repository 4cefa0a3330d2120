//! # Module Image Encoding and Decoding
//!
//! ## Format
//!
//! ```text
//! [magic: 4 bytes][version: u16 LE][checksum: u64 LE][payload...]
//! ```
//!
//! The checksum covers the payload only. It doubles as the content identity
//! of reference units.

use thiserror::Error;

use super::ModuleImage;

// =============================================================================
// Constants
// =============================================================================

/// Leading bytes of every module image.
pub const MAGIC: &[u8; 4] = b"FDLM";

/// Current image format version.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2 + 8;

/// Errors raised while reading or writing an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("missing module image magic")]
    BadMagic,

    #[error("unsupported image format version {0}")]
    UnsupportedVersion(u16),

    #[error("checksum mismatch (expected {expected:016x}, found {actual:016x})")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("malformed payload: {0}")]
    Payload(String),
}

// =============================================================================
// Encoding
// =============================================================================

/// Encodes an image into its binary form.
pub fn encode(image: &ModuleImage) -> Result<Vec<u8>, ImageError> {
    let payload = serde_json::to_vec(image).map_err(|e| ImageError::Payload(e.to_string()))?;

    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    data.extend_from_slice(&checksum(&payload).to_le_bytes());
    data.extend_from_slice(&payload);
    Ok(data)
}

// =============================================================================
// Decoding
// =============================================================================

/// Validates the header and checksum, then decodes the payload.
pub fn decode(data: &[u8]) -> Result<ModuleImage, ImageError> {
    if data.len() < HEADER_LEN {
        if data.len() >= MAGIC.len() && &data[..MAGIC.len()] != MAGIC {
            return Err(ImageError::BadMagic);
        }
        return Err(ImageError::Truncated { len: data.len() });
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(ImageError::BadMagic);
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(ImageError::UnsupportedVersion(version));
    }

    let mut stored = [0u8; 8];
    stored.copy_from_slice(&data[6..HEADER_LEN]);
    let expected = u64::from_le_bytes(stored);

    let payload = &data[HEADER_LEN..];
    let actual = checksum(payload);
    if expected != actual {
        return Err(ImageError::ChecksumMismatch { expected, actual });
    }

    serde_json::from_slice(payload).map_err(|e| ImageError::Payload(e.to_string()))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Computes the XXH3-64 checksum of `data`.
pub fn checksum(data: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(data)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Code, Instr, MethodBody, MethodDef, TypeDef, TypeSig};

    fn sample_image() -> ModuleImage {
        let mut ty = TypeDef::new("Demo", "C");
        ty.methods.push(MethodDef {
            name: "One".to_string(),
            params: vec![],
            ret: TypeSig::Int,
            is_static: true,
            is_public: true,
            body: MethodBody::Code(Code {
                locals: 0,
                instrs: vec![Instr::PushInt(1), Instr::Return],
            }),
        });
        let mut image = ModuleImage::new("DynamicCode");
        image.references.push("System.Runtime.dll".to_string());
        image.types.push(ty);
        image
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&sample_image()).unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), FORMAT_VERSION);
        assert_eq!(decode(&bytes).unwrap(), sample_image());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = encode(&sample_image()).unwrap();
        bytes[0] = b'X';
        assert_eq!(decode(&bytes), Err(ImageError::BadMagic));
        assert_eq!(decode(b"MZ"), Err(ImageError::Truncated { len: 2 }));
        assert_eq!(decode(b"MZ\x90\x00"), Err(ImageError::BadMagic));
    }

    #[test]
    fn test_rejects_corrupted_payload() {
        let mut bytes = encode(&sample_image()).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x20;
        assert!(matches!(
            decode(&bytes),
            Err(ImageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let mut bytes = encode(&sample_image()).unwrap();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(ImageError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_checksum_different_data() {
        assert_ne!(checksum(b"data1"), checksum(b"data2"));
        assert_eq!(checksum(b"data1"), checksum(b"data1"));
    }
}
