//! `data:` URL encoding for the preview payload.
//!
//! Produces the same form as `FileReader.readAsDataURL`:
//! `data:<mime>;base64,<payload>`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes `bytes` as `data:{mime};base64,...`.
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
