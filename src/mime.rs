//! Content types for files served by the static route.

use std::path::Path;

pub fn content_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "csv" => "text/csv; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_assets() {
        assert_eq!(content_type(Path::new("r/CORR.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("plots/heatmap.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("lib/plotly.min.js")), "application/javascript; charset=utf-8");
    }

    #[test]
    fn unknown_is_octet_stream() {
        assert_eq!(content_type(Path::new("data.parquet")), "application/octet-stream");
        assert_eq!(content_type(Path::new("Makefile")), "application/octet-stream");
    }
}
