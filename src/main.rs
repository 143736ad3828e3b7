use std::path::PathBuf;
use std::sync::OnceLock;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod mime;
mod page;
mod server;
mod source;

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const DEFAULT_PORT: u16 = 8501;
const DEFAULT_MAX_UPLOAD_MB: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode { Embed, Static }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "ReportView",
    about = "Browser viewer for pre-generated HTML reports",
    long_about = "Serves a small web page that shows an HTML report from an upload, a local path, or the default report file in the working directory.",
    after_long_help = "Examples:\n  ReportView\n  ReportView --port 9000 --mode embed\n  ReportView --default-file reports/latest.html --height 1200 --light\n  ReportView --no-open -v --log-format json --log-path viewer.log",
    color = ColorChoice::Auto
)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Report loaded when nothing is uploaded and no path is given
    #[arg(long, short = 'd', default_value = source::DEFAULT_REPORT)]
    default_file: String,
    /// Directory uploads are staged in so static mode can serve them
    #[arg(long, default_value = source::CACHE_DIR)]
    cache_dir: String,
    #[arg(long, short = 'm', value_enum, default_value = "static")]
    mode: RenderMode,
    #[arg(long, default_value_t = page::DEFAULT_HEIGHT, value_parser = clap::value_parser!(u32).range(page::MIN_HEIGHT as i64..=page::MAX_HEIGHT as i64))]
    height: u32,
    #[arg(long, default_value_t = false, help = "Light page background instead of dark")]
    light: bool,
    #[arg(long, default_value_t = false, help = "Hide the download button")]
    no_download: bool,
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_MB)]
    max_upload_mb: usize,
    #[arg(long, default_value_t = false)]
    no_open: bool,
    /// Path to TOML config (default ./ReportView.toml when present)
    #[arg(long)]
    config: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            default_file: source::DEFAULT_REPORT.to_string(),
            cache_dir: source::CACHE_DIR.to_string(),
            mode: RenderMode::Static,
            height: page::DEFAULT_HEIGHT,
            light: false,
            no_download: false,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            no_open: false,
            config: None,
            verbose: 0,
            quiet: false,
            log_level: None,
            log_format: None,
            log_path: None,
            no_color: false,
            force_color: false,
            completions: None,
            completions_out: None,
        }
    }
}

#[derive(Deserialize, Default, Debug)]
struct AppConfig {
    host: Option<String>,
    port: Option<u16>,
    default_file: Option<String>,
    cache_dir: Option<String>,
    mode: Option<RenderMode>,
    height: Option<u32>,
    light: Option<bool>,
    no_download: Option<bool>,
    max_upload_mb: Option<usize>,
    no_open: Option<bool>,
    log_level: Option<LogLevel>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    force_color: Option<bool>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "ReportView", &mut f); } else { clap_complete::generate(sh, &mut cmd, "ReportView", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "ReportView", &mut std::io::stdout());
        }
        return;
    }
    let cfg_path = args.config.clone().unwrap_or_else(|| "ReportView.toml".to_string());
    let cfg_result = load_config(&cfg_path, args.config.is_some());
    if let Ok(Some(cfg)) = &cfg_result { apply_config(&mut args, cfg); }
    init_logging(&args);
    // Config problems are reported once the logger exists.
    if let Err(e) = &cfg_result { log::log!(config_error_level(args.config.is_some()), "{:#}", e); }
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);
    if let Err(e) = run(&args) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let settings = serve_settings(args);
    log::debug!("Serve settings: {:?}", settings);
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let quiet = args.quiet;
    let no_open = args.no_open;
    rt.block_on(server::serve(&args.host, args.port, settings, move |addr| {
        let url = format!("http://{}/", addr);
        log::info!("Listening on {}", addr);
        if !quiet { println!("{}", paint(&format!("HTML Viewer running at {}", url), "1;36")); }
        if !no_open { open_in_browser(&url); }
    }))
}

fn serve_settings(args: &Args) -> server::ServeSettings {
    let default_file = if args.default_file.trim().is_empty() { None } else { Some(PathBuf::from(&args.default_file)) };
    server::ServeSettings {
        default_file,
        cache_dir: PathBuf::from(&args.cache_dir),
        view: page::ViewOptions { mode: args.mode, height: page::clamp_height(args.height), dark: !args.light, download: !args.no_download },
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    }
}

/// A missing default config is not an error; a missing explicit one is.
fn load_config(path: &str, explicit: bool) -> anyhow::Result<Option<AppConfig>> {
    use anyhow::Context;
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read config {}", path)),
    };
    let cfg = toml::from_str::<AppConfig>(&s).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(Some(cfg))
}

/// An explicit `--config` that gets ignored must be visible at the default filter.
fn config_error_level(explicit: bool) -> log::Level {
    if explicit { log::Level::Error } else { log::Level::Warn }
}

fn apply_config(args: &mut Args, cfg: &AppConfig) {
    if args.host == "127.0.0.1" && let Some(v) = cfg.host.as_ref() { args.host = v.clone(); }
    if args.port == DEFAULT_PORT && let Some(v) = cfg.port { args.port = v; }
    if args.default_file == source::DEFAULT_REPORT && let Some(v) = cfg.default_file.as_ref() { args.default_file = v.clone(); }
    if args.cache_dir == source::CACHE_DIR && let Some(v) = cfg.cache_dir.as_ref() { args.cache_dir = v.clone(); }
    if args.mode == RenderMode::Static && let Some(v) = cfg.mode { args.mode = v; }
    if args.height == page::DEFAULT_HEIGHT && let Some(v) = cfg.height { args.height = page::clamp_height(v); }
    if !args.light && let Some(v) = cfg.light { args.light = v; }
    if !args.no_download && let Some(v) = cfg.no_download { args.no_download = v; }
    if args.max_upload_mb == DEFAULT_MAX_UPLOAD_MB && let Some(v) = cfg.max_upload_mb { args.max_upload_mb = v; }
    if !args.no_open && let Some(v) = cfg.no_open { args.no_open = v; }
    if args.log_level.is_none() && let Some(v) = cfg.log_level { args.log_level = Some(v); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path.as_ref() { args.log_path = Some(v.clone()); }
    if let Some(v) = cfg.force_color { args.force_color = args.force_color || v; }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
            }
        }
    }
    builder.init();
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(target_os = "windows")]
fn open_in_browser(url: &str) {
    let _ = std::process::Command::new("cmd").args(["/C", "start", "", url]).spawn()
        .map_err(|e| log::error!("Failed to open browser for {}: {}", url, e));
}

#[cfg(target_os = "macos")]
fn open_in_browser(url: &str) {
    let _ = std::process::Command::new("open").arg(url).spawn().map_err(|e| log::error!("Failed to open browser for {}: {}", url, e));
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn open_in_browser(url: &str) {
    let _ = std::process::Command::new("xdg-open").arg(url).spawn().map_err(|e| log::error!("Failed to open browser for {}: {}", url, e));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args { no_open: true, ..Default::default() }
    }

    #[test]
    fn defaults_match_clap() {
        let parsed = Args::parse_from(["ReportView"]);
        let d = Args::default();
        assert_eq!(parsed.port, d.port);
        assert_eq!(parsed.default_file, source::DEFAULT_REPORT);
        assert_eq!(parsed.mode, RenderMode::Static);
        assert_eq!(parsed.height, page::DEFAULT_HEIGHT);
        assert_eq!(parsed.max_upload_mb, d.max_upload_mb);
    }

    #[test]
    fn height_flag_is_range_checked() {
        assert!(Args::try_parse_from(["ReportView", "--height", "100"]).is_err());
        assert_eq!(Args::try_parse_from(["ReportView", "--height", "1500"]).unwrap().height, 1500);
    }

    #[test]
    fn config_fills_untouched_options_only() {
        let cfg: AppConfig = toml::from_str("port = 9000\nmode = \"embed\"\nlight = true\nheight = 10000\nhost = \"0.0.0.0\"").unwrap();
        let mut a = base_args();
        a.host = "localhost".to_string();
        apply_config(&mut a, &cfg);
        assert_eq!(a.port, 9000);
        assert_eq!(a.mode, RenderMode::Embed);
        assert!(a.light);
        assert_eq!(a.height, page::MAX_HEIGHT);
        assert_eq!(a.host, "localhost");
    }

    #[test]
    fn missing_default_config_is_silent_but_explicit_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("ReportView.toml");
        assert!(matches!(load_config(&p.to_string_lossy(), false), Ok(None)));
        assert!(load_config(&p.to_string_lossy(), true).is_err());
        std::fs::write(&p, "port = \"not a number\"").unwrap();
        assert!(load_config(&p.to_string_lossy(), false).is_err());
    }

    #[test]
    fn explicit_config_failure_is_an_error() {
        assert_eq!(config_error_level(true), log::Level::Error);
        assert_eq!(config_error_level(false), log::Level::Warn);
    }

    #[test]
    fn settings_from_args() {
        let mut a = base_args();
        a.light = true;
        a.no_download = true;
        a.max_upload_mb = 2;
        a.default_file = "  ".to_string();
        let s = serve_settings(&a);
        assert!(s.default_file.is_none());
        assert!(!s.view.dark);
        assert!(!s.view.download);
        assert_eq!(s.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(s.cache_dir, PathBuf::from(source::CACHE_DIR));
    }

    #[test]
    fn paint_without_color_is_plain() {
        assert_eq!(paint("x", "1;36"), "x");
    }
}
