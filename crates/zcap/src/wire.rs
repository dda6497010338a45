//! # Wire Encoding
//!
//! Capabilities travel as `base64url(gzip(canonical JSON))`: inside HTTP
//! invocation headers, inside registered queries as upstream authorization,
//! and as the tokens handed to authorized third parties. Canonical JSON on
//! the way in keeps the encoding deterministic for equal documents.

use std::io::{Read, Write};

use base64ct::{Base64UrlUnpadded, Encoding};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::capability::Capability;
use crate::error::Error;

/// Encode a capability into its compressed wire form.
///
/// # Errors
///
/// Fails with [`Error::MalformedEncoding`] if the capability cannot be
/// serialized or compressed.
pub fn compress(capability: &Capability) -> Result<String, Error> {
    let canonical = serde_json_canonicalizer::to_string(capability)
        .map_err(|e| Error::MalformedEncoding(format!("serialize: {e}")))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(canonical.as_bytes())
        .map_err(|e| Error::MalformedEncoding(format!("compress: {e}")))?;
    let compressed =
        encoder.finish().map_err(|e| Error::MalformedEncoding(format!("compress: {e}")))?;
    Ok(Base64UrlUnpadded::encode_string(&compressed))
}

/// Decode a capability from its compressed wire form.
///
/// # Errors
///
/// Fails with [`Error::MalformedEncoding`] if any layer does not decode:
/// the base64, the gzip stream, or the JSON shape (including an unknown
/// caveat kind, which is rejected rather than ignored).
pub fn decompress(encoded: &str) -> Result<Capability, Error> {
    let compressed = Base64UrlUnpadded::decode_vec(encoded)
        .map_err(|e| Error::MalformedEncoding(format!("base64: {e}")))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut json = String::new();
    decoder
        .read_to_string(&mut json)
        .map_err(|e| Error::MalformedEncoding(format!("decompress: {e}")))?;
    serde_json::from_str(&json).map_err(|e| Error::MalformedEncoding(format!("decode: {e}")))
}
