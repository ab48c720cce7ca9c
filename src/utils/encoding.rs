use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

pub const PNG_MIME: &str = "image/png";

/// Inline `data:` URL for an image, as consumed by the web client thumbnails.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}
