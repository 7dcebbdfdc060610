//! Asset key generation and public URL derivation.
//!
//! Every stored object gets a random path-safe name (256 bits of entropy,
//! URL-safe base64) plus an extension derived from its media type. Collisions
//! are treated as practically impossible and not checked.

use crate::constants::{ASSET_KEY_BYTES, FALLBACK_EXTENSION};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Generate a random asset name with a media-type extension.
pub fn generate_asset_key(media_type: &str) -> String {
    let mut buf = [0u8; ASSET_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);

    format!(
        "{}{}",
        URL_SAFE_NO_PAD.encode(buf),
        extension_for(media_type)
    )
}

/// Map a media type to a file extension.
///
/// `image/jpeg` becomes `.jpeg`; anything that does not split into exactly
/// two segments falls back to `.bin`.
pub fn extension_for(media_type: &str) -> String {
    let parts: Vec<&str> = media_type.split('/').collect();
    if parts.len() != 2 {
        return FALLBACK_EXTENSION.to_string();
    }
    format!(".{}", parts[1])
}

/// Public URL for a stored object behind the distribution domain.
pub fn object_url(distribution: &str, key: &str) -> String {
    format!("https://{}/{}", distribution, key)
}
