//! Pure helpers behind the in-page image tooltip. The overlay itself lives in
//! the content script; these compute the text it shows.

const KNOWN_FORMATS: [&str; 8] = ["PNG", "JPG", "JPEG", "GIF", "WEBP", "SVG", "BMP", "ICO"];

// Everything after the last dot, minus any query string.
pub fn image_format_from_url(url: &str) -> String {
    let tail = url.rsplit('.').next().unwrap_or(url);
    let extension = tail.split('?').next().unwrap_or(tail).to_uppercase();
    if KNOWN_FORMATS.contains(&extension.as_str()) {
        extension
    } else {
        String::from("Unknown")
    }
}

// Rough uncompressed estimate at 3 bytes per pixel.
pub fn estimate_image_size(width: u64, height: u64) -> u64 {
    width * height * 3
}

pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    if bytes < 1024 * 1024 {
        return format!("{:.1} KB", bytes as f64 / 1024.0);
    }
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}
