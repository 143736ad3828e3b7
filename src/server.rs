//! HTTP surface of the viewer: the control page, the form post that resolves a
//! report, and the static route that serves the selected report's directory.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use clap::ValueEnum;

use crate::RenderMode;
use crate::page::{self, Frame, Notice, ViewOptions, Viewer};
use crate::source::{self, ReportDocument, ReportSource, ResolveError};

#[derive(Clone, Debug)]
pub struct ServeSettings {
    pub default_file: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub view: ViewOptions,
    pub max_upload_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    settings: Arc<ServeSettings>,
    /// Directory behind `/static/`; only set while a report is shown in static mode.
    static_root: Arc<RwLock<Option<PathBuf>>>,
}

impl AppState {
    pub fn new(settings: ServeSettings) -> Self {
        Self { settings: Arc::new(settings), static_root: Arc::new(RwLock::new(None)) }
    }

    fn static_root(&self) -> Option<PathBuf> {
        self.static_root.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_static_root(&self, root: Option<PathBuf>) {
        let mut guard = self.static_root.write().unwrap_or_else(|e| e.into_inner());
        if *guard != root {
            match root.as_ref() {
                Some(r) => log::info!("Static root set to {}", r.to_string_lossy()),
                None => log::debug!("Static root cleared"),
            }
        }
        *guard = root;
    }
}

pub fn router(state: AppState) -> Router {
    let limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/view", post(view))
        .route("/static/{*path}", get(static_file))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Binds the listener, reports the bound address, then serves until Ctrl-C.
pub async fn serve(host: &str, port: u16, settings: ServeSettings, on_ready: impl FnOnce(std::net::SocketAddr)) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await.with_context(|| format!("bind {}:{}", host, port))?;
    let addr = listener.local_addr().context("read bound address")?;
    on_ready(addr);
    axum::serve(listener, router(AppState::new(settings)))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Shutting down"),
                Err(e) => {
                    log::error!("Failed to listen for Ctrl-C, serving until killed: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .context("server stopped with an error")?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let source = ReportSource::select(None, None, state.settings.default_file.as_deref());
    Html(present(&state, source, &state.settings.view, ""))
}

#[derive(Default)]
struct ViewForm {
    upload: Option<(String, Vec<u8>)>,
    path: String,
    mode: Option<RenderMode>,
    height: Option<u32>,
    dark: bool,
    download: bool,
}

async fn view(State(state): State<AppState>, mut multipart: Multipart) -> Result<Html<String>, (StatusCode, String)> {
    let mut form = ViewForm::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| (e.status(), e.body_text()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| (e.status(), e.body_text()))?;
                form.upload = Some((file_name, bytes.to_vec()));
            }
            "path" => form.path = field.text().await.map_err(|e| (e.status(), e.body_text()))?,
            "mode" => {
                let v = field.text().await.map_err(|e| (e.status(), e.body_text()))?;
                form.mode = RenderMode::from_str(v.trim(), true).ok();
            }
            "height" => {
                let v = field.text().await.map_err(|e| (e.status(), e.body_text()))?;
                form.height = page::parse_height(&v);
            }
            "dark" => form.dark = true,
            "download" => form.download = true,
            other => log::debug!("Ignoring form field {}", other),
        }
    }
    let defaults = state.settings.view;
    let opts = ViewOptions {
        mode: form.mode.unwrap_or(defaults.mode),
        height: form.height.unwrap_or(defaults.height),
        dark: form.dark,
        download: form.download,
    };
    let source = ReportSource::select(form.upload, Some(form.path.as_str()), state.settings.default_file.as_deref());
    Ok(Html(present(&state, source, &opts, &form.path)))
}

/// Resolves one source and renders the page around it.
fn present(state: &AppState, source: Option<ReportSource>, opts: &ViewOptions, path_value: &str) -> String {
    let from_default = matches!(source, Some(ReportSource::Default(_)));
    let kind = source.as_ref().map(|s| s.kind()).unwrap_or("none");
    present_outcome(state, source::resolve(source), from_default, kind, opts, path_value)
}

fn present_outcome(state: &AppState, outcome: Result<ReportDocument, ResolveError>, from_default: bool, kind: &str, opts: &ViewOptions, path_value: &str) -> String {
    match outcome {
        Ok(mut doc) => {
            log::info!("Resolved {} ({} bytes) from {}", doc.name, doc.bytes.len(), kind);
            if doc.location.is_none()
                && let Err(e) = source::stage_upload(&mut doc, &state.settings.cache_dir) {
                log::warn!("Failed to stage upload {} in {}: {}", doc.name, state.settings.cache_dir.to_string_lossy(), e);
            }
            let frame = frame_for(state, &doc, opts.mode);
            page::render_page(opts, path_value, None, Some(&Viewer { doc: &doc, frame }))
        }
        Err(e) => {
            state.set_static_root(None);
            let notice = match &e {
                ResolveError::EmptyInput => None,
                ResolveError::NotFound(p) if from_default => {
                    log::debug!("No default report at {}", p.to_string_lossy());
                    None
                }
                ResolveError::NotFound(_) => {
                    log::warn!("{}", e);
                    Some(Notice::Warning(e.to_string()))
                }
                ResolveError::Read { .. } => {
                    log::error!("{}", e);
                    Some(Notice::Error(e.to_string()))
                }
            };
            page::render_page(opts, path_value, notice.as_ref(), None)
        }
    }
}

fn frame_for(state: &AppState, doc: &ReportDocument, mode: RenderMode) -> Frame {
    if mode == RenderMode::Embed {
        state.set_static_root(None);
        return Frame::Srcdoc;
    }
    let parts = doc.location.as_ref().and_then(|p| Some((p.parent()?.to_path_buf(), p.file_name()?.to_string_lossy().into_owned())));
    match parts {
        Some((root, file)) => {
            state.set_static_root(Some(root));
            Frame::Src(format!("/static/{}", encode_segment(&file)))
        }
        None => {
            log::warn!("{} has no location on disk; falling back to embed mode", doc.name);
            state.set_static_root(None);
            Frame::Srcdoc
        }
    }
}

async fn static_file(State(state): State<AppState>, axum::extract::Path(rel): axum::extract::Path<String>) -> Response {
    let Some(root) = state.static_root() else {
        return (StatusCode::NOT_FOUND, "no report is being served").into_response();
    };
    let Some(full) = safe_join(&root, &rel) else {
        log::warn!("Rejected static path {}", rel);
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&full).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, crate::mime::content_type(&full))], bytes).into_response(),
        Err(e) => {
            log::debug!("Static read failed for {}: {}", full.to_string_lossy(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Joins a request path under `root`, refusing anything that could climb out of it.
fn safe_join(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    let mut any = false;
    for c in Path::new(rel).components() {
        match c {
            Component::Normal(part) => { out.push(part); any = true; }
            Component::CurDir => {}
            _ => return None,
        }
    }
    any.then_some(out)
}

fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
