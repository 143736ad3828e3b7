use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::RenderMode;
use crate::source::ReportDocument;

pub const MIN_HEIGHT: u32 = 200;
pub const MAX_HEIGHT: u32 = 5000;
pub const DEFAULT_HEIGHT: u32 = 900;
const HEIGHT_STEP: u32 = 50;

const PROMPT: &str = "Upload a file or enter a path to begin.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewOptions {
    pub mode: RenderMode,
    pub height: u32,
    pub dark: bool,
    pub download: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self { mode: RenderMode::Static, height: DEFAULT_HEIGHT, dark: true, download: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Warning(String),
    Error(String),
}

/// How the iframe gets its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Srcdoc,
    Src(String),
}

pub struct Viewer<'a> {
    pub doc: &'a ReportDocument,
    pub frame: Frame,
}

/// Parses a height field; `None` for blank or garbage so the caller keeps its own default.
pub fn parse_height(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().map(clamp_height)
}

pub fn clamp_height(h: u32) -> u32 {
    h.clamp(MIN_HEIGHT, MAX_HEIGHT)
}

pub fn render_page(opts: &ViewOptions, path_value: &str, notice: Option<&Notice>, viewer: Option<&Viewer>) -> String {
    let (bg, fg, muted, card, border) = if opts.dark {
        ("#0e1117", "#fafafa", "#a3a8b8", "#161a23", "#444")
    } else {
        ("#ffffff", "#31333f", "#6b7280", "#f7f8fa", "#d0d4dc")
    };
    let mut s = String::new();
    s.push_str("<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>HTML Viewer</title><style>");
    s.push_str(&format!(":root{{--bg:{};--fg:{};--muted:{};--card:{};--border:{}}} ", bg, fg, muted, card, border));
    s.push_str("body{margin:0;background:var(--bg);color:var(--fg);font-family:\"Source Sans Pro\",system-ui,-apple-system,Segoe UI,Arial,sans-serif} .app{padding:24px 40px} h1{font-size:28px;margin:0 0 16px 0} .cols{display:grid;grid-template-columns:2fr 1fr;gap:24px} .card{background:var(--card);border:1px solid var(--border);border-radius:8px;padding:14px} label{display:block;font-size:14px;margin:10px 0 4px 0} input[type=text],input[type=number]{width:100%;box-sizing:border-box;padding:6px 8px;border:1px solid var(--border);border-radius:6px;background:var(--bg);color:var(--fg)} .inline label{display:inline;margin:0 12px 0 4px} .hint{color:var(--muted);font-size:12px} .actions{margin-top:12px} button,.btn{display:inline-block;padding:6px 14px;border:1px solid var(--border);border-radius:6px;background:var(--card);color:var(--fg);text-decoration:none;font-size:14px;cursor:pointer} .msg{margin:16px 0;padding:10px 14px;border-radius:6px;font-size:14px} .msg.info{background:rgba(28,131,225,.12);color:#1c83e1} .msg.warning{background:rgba(255,189,69,.15);color:#b58105} .msg.error{background:rgba(255,43,43,.12);color:#ff2b2b} .caption{color:var(--muted);font-size:13px;margin:16px 0 8px 0} code{font-family:Consolas,Monaco,monospace} .viewer-container iframe{border:1px solid #444;border-radius:8px;width:100%} @media (max-width:800px){.cols{grid-template-columns:1fr}}");
    s.push_str("</style></head><body><div class=\"app\"><h1>HTML Viewer</h1>");
    s.push_str(&render_form(opts, path_value));
    if let Some(n) = notice {
        match n {
            Notice::Warning(m) => s.push_str(&format!("<div class=\"msg warning\">{}</div>", html_escape(m))),
            Notice::Error(m) => s.push_str(&format!("<div class=\"msg error\">{}</div>", html_escape(m))),
        }
    }
    match viewer {
        None => s.push_str(&format!("<div class=\"msg info\">{}</div>", PROMPT)),
        Some(v) => s.push_str(&render_viewer(opts, v)),
    }
    s.push_str("<div class=\"caption\">Tip: If your HTML uses big local assets, prefer 'Static server' mode so relative links resolve correctly.</div>");
    s.push_str("</div></body></html>");
    s
}

fn render_form(opts: &ViewOptions, path_value: &str) -> String {
    let checked = |b: bool| if b { " checked" } else { "" };
    let mut s = String::new();
    s.push_str("<form method=\"post\" action=\"/view\" enctype=\"multipart/form-data\"><div class=\"cols\"><div class=\"card\">");
    s.push_str("<label for=\"file\">Upload an HTML file</label><input id=\"file\" type=\"file\" name=\"file\" accept=\".html,.htm\">");
    s.push_str(&format!("<label for=\"path\">...or enter a local path to an HTML file</label><input id=\"path\" type=\"text\" name=\"path\" value=\"{}\" placeholder=\"/path/to/file.html\">", attr_escape(path_value)));
    s.push_str("</div><div class=\"card\">");
    s.push_str("<label>Rendering mode</label><div class=\"inline\">");
    s.push_str(&format!("<input id=\"mode-embed\" type=\"radio\" name=\"mode\" value=\"embed\"{}><label for=\"mode-embed\">Embed (srcdoc)</label>", checked(opts.mode == RenderMode::Embed)));
    s.push_str(&format!("<input id=\"mode-static\" type=\"radio\" name=\"mode\" value=\"static\"{}><label for=\"mode-static\">Static server (handles assets)</label>", checked(opts.mode == RenderMode::Static)));
    s.push_str("</div><div class=\"hint\">Use 'Static server' if your HTML uses relative CSS/JS/images.</div>");
    s.push_str(&format!("<label for=\"height\">Iframe height (px)</label><input id=\"height\" type=\"number\" name=\"height\" min=\"{}\" max=\"{}\" step=\"{}\" value=\"{}\">", MIN_HEIGHT, MAX_HEIGHT, HEIGHT_STEP, opts.height));
    s.push_str(&format!("<div class=\"inline\" style=\"margin-top:10px\"><input id=\"dark\" type=\"checkbox\" name=\"dark\" value=\"on\"{}><label for=\"dark\">Dark page background</label></div>", checked(opts.dark)));
    s.push_str(&format!("<div class=\"inline\" style=\"margin-top:6px\"><input id=\"download\" type=\"checkbox\" name=\"download\" value=\"on\"{}><label for=\"download\">Show download button</label></div>", checked(opts.download)));
    s.push_str("</div></div><div class=\"actions\"><button type=\"submit\">Show</button></div></form>");
    s
}

fn render_viewer(opts: &ViewOptions, v: &Viewer) -> String {
    let doc = v.doc;
    let location = doc.location.as_ref().map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|| "(upload)".to_string());
    let mut s = String::new();
    s.push_str(&format!("<div class=\"caption\">Selected: <b>{}</b> &nbsp;•&nbsp; Location: <code>{}</code></div>", html_escape(&doc.name), html_escape(&location)));
    if opts.download {
        s.push_str(&format!("<p><a class=\"btn\" download=\"{}\" href=\"data:text/html;base64,{}\">⬇️ Download HTML</a></p>", attr_escape(&doc.name), BASE64.encode(&doc.bytes)));
    }
    s.push_str("<div class=\"viewer-container\">");
    match &v.frame {
        Frame::Srcdoc => s.push_str(&format!("<iframe srcdoc=\"{}\" height=\"{}\" scrolling=\"yes\"></iframe>", attr_escape(&doc.text()), opts.height)),
        Frame::Src(src) => s.push_str(&format!("<iframe src=\"{}\" width=\"100%\" height=\"{}\"></iframe>", attr_escape(src), opts.height)),
    }
    s.push_str("</div>");
    s
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn attr_escape(s: &str) -> String {
    html_escape(s).replace('"', "&quot;").replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn doc() -> ReportDocument {
        ReportDocument { name: "corr.html".into(), location: Some(PathBuf::from("/data/corr.html")), bytes: b"<h1 class=\"t\">Beta & co</h1>".to_vec() }
    }

    #[test]
    fn height_is_clamped_and_defaulted() {
        assert_eq!(parse_height("150"), Some(MIN_HEIGHT));
        assert_eq!(parse_height("99999"), Some(MAX_HEIGHT));
        assert_eq!(parse_height(" 1200 "), Some(1200));
        assert_eq!(parse_height(""), None);
        assert_eq!(parse_height("tall"), None);
    }

    #[test]
    fn read_error_is_shown_inline() {
        let n = Notice::Error("Failed to read file /r/<a>.html: permission denied".into());
        let html = render_page(&ViewOptions::default(), "/r/<a>.html", Some(&n), None);
        assert!(html.contains("msg error\">Failed to read file /r/&lt;a&gt;.html: permission denied"));
        assert!(html.contains(PROMPT));
        assert!(!html.contains("<iframe"));
    }

    #[test]
    fn no_document_shows_prompt() {
        let html = render_page(&ViewOptions::default(), "", None, None);
        assert!(html.contains(PROMPT));
        assert!(!html.contains("<iframe"));
    }

    #[test]
    fn warning_is_escaped_and_prompt_kept() {
        let n = Notice::Warning("Path does not exist or is not a file: /tmp/<x>".into());
        let html = render_page(&ViewOptions::default(), "/tmp/<x>", Some(&n), None);
        assert!(html.contains("msg warning\">Path does not exist or is not a file: /tmp/&lt;x&gt;"));
        assert!(html.contains("value=\"/tmp/&lt;x&gt;\""));
        assert!(html.contains(PROMPT));
    }

    #[test]
    fn srcdoc_embeds_escaped_document() {
        let d = doc();
        let opts = ViewOptions { mode: RenderMode::Embed, height: 700, dark: true, download: false };
        let html = render_page(&opts, "", None, Some(&Viewer { doc: &d, frame: Frame::Srcdoc }));
        assert!(html.contains("srcdoc=\"&lt;h1 class=&quot;t&quot;&gt;Beta &amp; co&lt;/h1&gt;\" height=\"700\""));
        assert!(html.contains("Selected: <b>corr.html</b>"));
        assert!(!html.contains("Download HTML"));
        assert!(!html.contains(PROMPT));
    }

    #[test]
    fn static_frame_and_download_link() {
        let d = doc();
        let html = render_page(&ViewOptions::default(), "", None, Some(&Viewer { doc: &d, frame: Frame::Src("/static/corr.html".into()) }));
        assert!(html.contains("<iframe src=\"/static/corr.html\" width=\"100%\" height=\"900\">"));
        assert!(html.contains(&format!("href=\"data:text/html;base64,{}\"", BASE64.encode(&d.bytes))));
        assert!(html.contains("download=\"corr.html\""));
    }

    #[test]
    fn light_background_and_toggles_reflected() {
        let opts = ViewOptions { mode: RenderMode::Embed, height: 900, dark: false, download: false };
        let html = render_page(&opts, "", None, None);
        assert!(html.contains("--bg:#ffffff"));
        assert!(html.contains("value=\"embed\" checked"));
        assert!(!html.contains("name=\"dark\" value=\"on\" checked"));
    }
}
