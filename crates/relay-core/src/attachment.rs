//! Attachment media-type validation.

/// Media types accepted for inline image attachments.
const SUPPORTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// Whether the given MIME type is an accepted image type.
///
/// Case-insensitive; accepts exactly `image/jpeg`, `image/jpg` and
/// `image/png`.
#[must_use]
pub fn is_supported_image_type(media_type: &str) -> bool {
    let lower = media_type.to_ascii_lowercase();
    SUPPORTED_IMAGE_TYPES.contains(&lower.as_str())
}

/// File extension for a supported image MIME type.
#[must_use]
pub fn image_extension(media_type: &str) -> Option<&'static str> {
    match media_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        "image/png" => Some(".png"),
        _ => None,
    }
}
