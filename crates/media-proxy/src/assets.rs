//! Asset extension allow-list

use std::path::Path;

/// Content type for an asset path, or `None` when its extension is not served
pub fn content_type_for(asset_path: &str) -> Option<&'static str> {
    let extension = Path::new(asset_path).extension()?.to_str()?;
    let content_type = match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(content_type)
}
