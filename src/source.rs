use std::path::{Component, Path, PathBuf};

pub const DEFAULT_REPORT: &str = "corr_beta_MULTI_REPORT.html";
pub const CACHE_DIR: &str = "._html_viewer_cache";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Path does not exist or is not a file: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Upload a file or enter a path to begin.")]
    EmptyInput,
    #[error("Failed to read file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the report bytes come from. Exactly one is active per interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportSource {
    Uploaded { name: String, bytes: Vec<u8> },
    Path(String),
    Default(PathBuf),
}

impl ReportSource {
    /// Picks the active source: upload, then a non-blank path, then the default file.
    /// An empty part without a file name is what browsers send when nothing was chosen.
    pub fn select(upload: Option<(String, Vec<u8>)>, path: Option<&str>, default_file: Option<&Path>) -> Option<ReportSource> {
        if let Some((name, bytes)) = upload
            && (!name.trim().is_empty() || !bytes.is_empty()) {
            return Some(ReportSource::Uploaded { name, bytes });
        }
        if let Some(p) = path
            && !p.trim().is_empty() {
            return Some(ReportSource::Path(p.trim().to_string()));
        }
        default_file.map(|p| ReportSource::Default(p.to_path_buf()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReportSource::Uploaded { .. } => "upload",
            ReportSource::Path(_) => "path",
            ReportSource::Default(_) => "default",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReportDocument {
    pub name: String,
    /// On-disk location; `None` for an upload that has not been staged.
    pub location: Option<PathBuf>,
    pub bytes: Vec<u8>,
}

impl ReportDocument {
    /// UTF-8 first, latin-1 when the bytes are not valid UTF-8.
    pub fn text(&self) -> String {
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => s.to_string(),
            Err(_) => self.bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

/// Single synchronous read of the selected source.
pub fn resolve(source: Option<ReportSource>) -> Result<ReportDocument, ResolveError> {
    match source {
        None => Err(ResolveError::EmptyInput),
        Some(ReportSource::Uploaded { name, bytes }) => Ok(ReportDocument { name: upload_file_name(&name), location: None, bytes }),
        Some(ReportSource::Path(p)) => read_file(&expand_path(&p)),
        Some(ReportSource::Default(p)) => read_file(&expand_path(&p.to_string_lossy())),
    }
}

fn read_file(path: &Path) -> Result<ReportDocument, ResolveError> {
    if !path.is_file() { return Err(ResolveError::NotFound(path.to_path_buf())); }
    let bytes = std::fs::read(path).map_err(|source| ResolveError::Read { path: path.to_path_buf(), source })?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string_lossy().into_owned());
    Ok(ReportDocument { name, location: Some(path.to_path_buf()), bytes })
}

/// Expands a leading `~` and anchors relative paths at the working directory.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded = match input.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => match home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(input),
        },
        _ => PathBuf::from(input),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")).map(PathBuf::from)
}

/// Keeps only the final component of a browser-supplied file name. Anything that
/// would not stay a single plain component under the cache dir becomes `upload.html`.
fn upload_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let mut components = Path::new(base).components();
    let single = matches!((components.next(), components.next()), (Some(Component::Normal(_)), None));
    if !single || base.contains(':') { "upload.html".to_string() } else { base.to_string() }
}

/// Writes an uploaded document into `cache_dir` so it can be served from disk.
pub fn stage_upload(doc: &mut ReportDocument, cache_dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)?;
    let target = expand_path(&cache_dir.join(&doc.name).to_string_lossy());
    std::fs::write(&target, &doc.bytes)?;
    doc.location = Some(target.clone());
    Ok(target)
}
