use reqwest::Url;
use reqwest::header::HeaderValue;
use serde_json::Value;

const REDACTED: &str = "***REDACTED***";
const SECRET_KEYS: [&str; 8] = [
    "key",
    "api_key",
    "apikey",
    "token",
    "authorization",
    "password",
    "x-api-key",
    "x-goog-api-key",
];
const DEFAULT_MAX_BODY_CHARS: usize = 4_000;

/// Stderr echo of Gemini traffic, enabled by `--verbose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_verbose(verbose: bool) -> Self {
        Self {
            enabled: verbose,
            redact_secrets: true,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }

    pub fn disabled() -> Self {
        Self::from_verbose(false)
    }
}

pub fn redact_url(url: &Url, redact: bool) -> String {
    if !redact || url.query().is_none() {
        return url.as_str().to_string();
    }

    let pairs = url
        .query_pairs()
        .map(|(name, value)| {
            let shown = if is_secret_key(&name) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), shown)
        })
        .collect::<Vec<_>>();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.as_str().to_string()
}

pub fn redact_header_value(name: &str, value: &HeaderValue, redact: bool) -> String {
    if redact && is_secret_key(name) {
        return REDACTED.to_string();
    }

    value
        .to_str()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|_| "<non-utf8>".to_string())
}

/// Masks secret keys anywhere in a JSON body. Non-JSON bodies pass through.
pub fn redact_text_body(raw: &str, redact: bool) -> String {
    if !redact {
        return raw.to_string();
    }

    let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    mask_secrets(&mut json);
    serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let total = input.chars().count();
    if total <= max_chars {
        return input.to_string();
    }

    let kept = input.chars().take(max_chars).collect::<String>();
    format!("{kept}... <truncated {} chars>", total - max_chars)
}

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_secret_key(key) {
                    *item = Value::String(REDACTED.to_string());
                } else {
                    mask_secrets(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(key))
}

#[cfg(test)]
mod tests {
    use super::{
        HttpDebugConfig, redact_header_value, redact_text_body, redact_url, truncate_for_log,
    };
    use reqwest::Url;
    use reqwest::header::HeaderValue;

    #[test]
    fn verbose_config_redacts_by_default() {
        let cfg = HttpDebugConfig::from_verbose(true);
        assert!(cfg.enabled);
        assert!(cfg.redact_secrets);
        assert_eq!(cfg.max_body_chars, 4_000);
        assert!(!HttpDebugConfig::disabled().enabled);
    }

    #[test]
    fn redact_url_masks_api_key_but_keeps_other_params() {
        let url = Url::parse(
            "https://generativelanguage.googleapis.com/v1beta/models/m:generateContent?key=AIza-secret&alt=json",
        )
        .expect("url");
        let redacted = redact_url(&url, true);
        assert!(!redacted.contains("AIza-secret"));
        assert!(redacted.contains("alt=json"));
        assert!(redacted.contains("REDACTED"));
    }

    #[test]
    fn redact_url_is_identity_when_disabled() {
        let url = Url::parse("https://example.com/path?key=abc").expect("url");
        assert_eq!(redact_url(&url, false), "https://example.com/path?key=abc");
    }

    #[test]
    fn redact_header_masks_goog_api_key() {
        let value = HeaderValue::from_static("AIza-secret");
        assert_eq!(
            redact_header_value("x-goog-api-key", &value, true),
            "***REDACTED***"
        );
        let value = HeaderValue::from_static("application/json");
        assert_eq!(
            redact_header_value("content-type", &value, true),
            "application/json"
        );
    }

    #[test]
    fn redact_text_body_masks_nested_secret_keys() {
        let raw = r#"{"contents":[{"token":"t0k"}],"nested":{"api_key":"123"},"ok":true}"#;
        let redacted = redact_text_body(raw, true);
        assert!(redacted.contains(r#""token":"***REDACTED***""#));
        assert!(redacted.contains(r#""api_key":"***REDACTED***""#));
        assert!(redacted.contains(r#""ok":true"#));
        assert!(!redacted.contains("t0k"));
    }

    #[test]
    fn redact_text_body_passes_non_json_through() {
        assert_eq!(redact_text_body("quota exceeded", true), "quota exceeded");
    }

    #[test]
    fn truncate_for_log_appends_marker() {
        let out = truncate_for_log("abcdefghijklmnopqrstuvwxyz", 5);
        assert_eq!(out, "abcde... <truncated 21 chars>");
        assert_eq!(truncate_for_log("short", 10), "short");
    }
}
