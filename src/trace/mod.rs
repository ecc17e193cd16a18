use anyhow::{Result, anyhow, bail};
use reqwest::header::HeaderMap;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::macros::format_description;

const TRACE_DIR_NAME: &str = "ioh-sales-chat/traces";

/// Per-process log of everything that crosses the session boundary:
/// utterances, answers, tool traffic, retries and raw HTTP.
#[derive(Clone)]
pub struct SessionTrace {
    inner: Arc<TraceInner>,
}

struct TraceInner {
    writer: Mutex<BufWriter<File>>,
    file_path: PathBuf,
    write_failed: AtomicBool,
}

impl SessionTrace {
    pub fn create(session_id: &str) -> Result<Self> {
        let trace_dir = resolve_trace_dir_from_env()?;
        Self::create_in_dir(session_id, &trace_dir)
    }

    pub fn create_in_dir(session_id: &str, trace_dir: &Path) -> Result<Self> {
        fs::create_dir_all(trace_dir).map_err(|err| {
            anyhow!(
                "Failed to create trace directory {}: {err}",
                trace_dir.display()
            )
        })?;

        let file_path = trace_dir.join(format!("session-{session_id}.log"));
        let file = create_trace_file(&file_path)
            .map_err(|err| anyhow!("Failed to create trace file {}: {err}", file_path.display()))?;

        Ok(Self {
            inner: Arc::new(TraceInner {
                writer: Mutex::new(BufWriter::new(file)),
                file_path,
                write_failed: AtomicBool::new(false),
            }),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.inner.file_path
    }

    pub fn log_user(&self, text: &str) {
        self.log_lines("user.in", text);
    }

    pub fn log_model(&self, text: &str) {
        self.log_lines("model.out", text);
    }

    pub fn log_tool_call(&self, name: &str, args_json: &str) {
        self.log_single("tool.call", &format!("{name} {args_json}"));
    }

    pub fn log_tool_result(&self, name: &str, response_json: &str) {
        self.log_single("tool.result", &format!("{name} {response_json}"));
    }

    pub fn log_retry(&self, text: &str) {
        self.log_single("retry", text);
    }

    pub fn log_turn_error(&self, text: &str) {
        self.log_lines("turn.err", text);
    }

    pub fn log_http_request(&self, method: &str, url: &str, headers: &HeaderMap, body: &str) {
        self.log_single("http.in", &format!("{method} {url}"));
        self.log_headers("http.in", headers);
        self.log_lines("http.in", body);
    }

    pub fn log_http_response(&self, status: u16, headers: &HeaderMap, body: &str) {
        self.log_single("http.out", &format!("HTTP {status}"));
        self.log_headers("http.out", headers);
        self.log_lines("http.out", body);
    }

    pub fn log_http_error(&self, message: &str) {
        self.log_single("http.err", message);
    }

    fn log_headers(&self, kind: &str, headers: &HeaderMap) {
        for (name, value) in headers {
            let value = value.to_str().unwrap_or("<non-utf8>");
            self.log_single(kind, &format!("{}: {value}", name.as_str()));
        }
    }

    fn log_lines(&self, kind: &str, text: &str) {
        if text.is_empty() {
            self.log_single(kind, "<empty>");
            return;
        }

        for line in text.lines() {
            self.log_single(kind, line);
        }
    }

    fn log_single(&self, kind: &str, text: &str) {
        let timestamp = current_timestamp();
        self.write_raw(&format!("[{timestamp}] [{kind:<11}] {text}\n"));
    }

    fn write_raw(&self, text: &str) {
        let Ok(mut writer) = self.inner.writer.lock() else {
            self.report_write_failure("failed to acquire trace writer lock");
            return;
        };

        if writer.write_all(text.as_bytes()).is_err() || writer.flush().is_err() {
            self.report_write_failure("failed to write to trace file");
        }
    }

    fn report_write_failure(&self, message: &str) {
        if !self.inner.write_failed.swap(true, Ordering::Relaxed) {
            eprintln!("ioh-sales-chat trace warning: {message}");
        }
    }
}

#[cfg(unix)]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_trace_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn current_timestamp() -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "????-??-??T??:??:??.???Z".to_string())
}

pub fn resolve_trace_dir_from_env() -> Result<PathBuf> {
    let xdg_state = env::var("XDG_STATE_HOME").ok();
    let home = dirs::home_dir();
    resolve_trace_dir(xdg_state.as_deref(), home.as_deref())
}

fn resolve_trace_dir(xdg_state_home: Option<&str>, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(xdg) = xdg_state_home {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve trace path: XDG_STATE_HOME is set but empty");
        }
        return Ok(PathBuf::from(trimmed).join(TRACE_DIR_NAME));
    }

    let home = home_dir
        .ok_or_else(|| anyhow!("Failed to resolve trace path: HOME directory is unavailable"))?;
    Ok(home.join(".local/state").join(TRACE_DIR_NAME))
}
