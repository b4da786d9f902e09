//! # Lookup Keys
//!
//! Derivation of the keys used to address cached records: the normalized text key
//! shared by fact-check entries and chat records, and the content hash of an image.

/// Normalizes free text into a cache key: trimmed and lowercased.
pub fn normalize_query(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Strips a `data:image/<type>;base64,` prefix, where `<type>` is a run of word characters.
fn strip_data_uri(image_base64: &str) -> &str {
    let Some(rest) = image_base64.strip_prefix("data:image/") else {
        return image_base64;
    };
    let Some((kind, payload)) = rest.split_once(";base64,") else {
        return image_base64;
    };
    if !kind.is_empty() && kind.chars().all(|c| c.is_alphanumeric() || c == '_') {
        payload
    } else {
        image_base64
    }
}

/// Computes the content hash of a base64-encoded image.
///
/// Any leading `data:image/<type>;base64,` prefix is stripped first, so the same image
/// sent with and without a data URI maps to the same hash.
pub fn image_content_hash(image_base64: &str) -> String {
    let payload = strip_data_uri(image_base64);
    format!("{:x}", md5::compute(payload.as_bytes()))
}
