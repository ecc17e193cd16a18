use super::debug::{
    HttpDebugConfig, redact_header_value, redact_text_body, redact_url, truncate_for_log,
};
use crate::trace::SessionTrace;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Thin wrapper over `reqwest::Client` that mirrors traffic into the
/// session trace and, when verbose, to stderr.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    debug: HttpDebugConfig,
    sink: LogSink,
    trace: Option<SessionTrace>,
}

#[derive(Clone)]
enum LogSink {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<String>>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("debug", &self.debug)
            .field("traced", &self.trace.is_some())
            .finish()
    }
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            debug,
            sink: LogSink::Stderr,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        payload: &T,
    ) -> Result<HttpResponseData, reqwest::Error> {
        let body_json = serde_json::to_string(payload)
            .unwrap_or_else(|err| format!("{{\"_serialization_error\":\"{err}\"}}"));

        let request = self.inner.post(url).query(query).json(payload).build()?;
        self.echo(|| request_lines(self.debug, &request, &body_json));
        if let Some(trace) = &self.trace {
            trace.log_http_request(
                request.method().as_str(),
                &redact_url(request.url(), true),
                request.headers(),
                &body_json,
            );
        }

        let response = self.inner.execute(request).await.inspect_err(|err| {
            if let Some(trace) = &self.trace {
                trace.log_http_error(&err.to_string());
            }
        })?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        self.echo(|| response_lines(self.debug, status, &headers, &body));
        if let Some(trace) = &self.trace {
            trace.log_http_response(status, &headers, &body);
        }

        Ok(HttpResponseData { status, body })
    }

    fn echo(&self, lines: impl FnOnce() -> Vec<String>) {
        if !self.debug.enabled {
            return;
        }

        match &self.sink {
            LogSink::Stderr => {
                let mut stderr = io::stderr().lock();
                for line in lines() {
                    let _ = writeln!(stderr, "{line}");
                }
            }
            #[cfg(test)]
            LogSink::Buffer(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.extend(lines());
                }
            }
        }
    }

    #[cfg(test)]
    pub fn with_buffer_sink(
        inner: Client,
        debug: HttpDebugConfig,
    ) -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let client = Self {
            inner,
            debug,
            sink: LogSink::Buffer(Arc::clone(&buffer)),
            trace: None,
        };
        (client, buffer)
    }
}

fn request_lines(debug: HttpDebugConfig, request: &reqwest::Request, body: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "[http-debug] > {} {}",
        request.method(),
        redact_url(request.url(), debug.redact_secrets)
    )];
    append_headers(&mut lines, '>', debug, request.headers());
    append_body(&mut lines, '>', debug, body);
    lines
}

fn response_lines(
    debug: HttpDebugConfig,
    status: u16,
    headers: &HeaderMap,
    body: &str,
) -> Vec<String> {
    let mut lines = vec![format!("[http-debug] < HTTP {status}")];
    append_headers(&mut lines, '<', debug, headers);
    append_body(&mut lines, '<', debug, body);
    lines
}

fn append_headers(lines: &mut Vec<String>, dir: char, debug: HttpDebugConfig, headers: &HeaderMap) {
    for (name, value) in headers {
        lines.push(format!(
            "[http-debug] {dir} {}: {}",
            name.as_str(),
            redact_header_value(name.as_str(), value, debug.redact_secrets)
        ));
    }
    lines.push(format!("[http-debug] {dir}"));
}

fn append_body(lines: &mut Vec<String>, dir: char, debug: HttpDebugConfig, body: &str) {
    let body = redact_text_body(body, debug.redact_secrets);
    let body = truncate_for_log(&body, debug.max_body_chars);
    if body.is_empty() {
        lines.push(format!("[http-debug] {dir} <empty body>"));
        return;
    }

    for line in body.lines() {
        lines.push(format!("[http-debug] {dir} {line}"));
    }
}
