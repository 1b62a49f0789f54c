use url::Url;

use crate::history::OperationType;

// Filenames are derived from the source URL so a converted download is
// recognizable next to the page it came from.
pub fn source_stem(source_url: &str) -> String {
    let stem = Url::parse(source_url)
        .ok()
        .and_then(|parsed| {
            parsed.path_segments().and_then(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .next_back()
                    .map(str::to_string)
            })
        })
        .and_then(|segment| segment.split('.').next().map(str::to_string))
        .filter(|stem| !stem.is_empty());
    stem.unwrap_or_else(|| String::from("image"))
}

pub fn generate_filename(source_url: &str, extension: &str, now_millis: i64) -> String {
    format!("{}_{}.{}", source_stem(source_url), now_millis, extension)
}

pub fn download_filename(
    kind: OperationType,
    source_url: &str,
    extension: &str,
    now_millis: i64,
) -> String {
    let prefix = match kind {
        OperationType::Converted => "",
        OperationType::Copied => "copied_",
        OperationType::BgRemoved => "no_bg_",
    };
    format!(
        "{}{}",
        prefix,
        generate_filename(source_url, extension, now_millis)
    )
}
