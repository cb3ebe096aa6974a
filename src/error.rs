use thiserror::Error;

/// Problems found while turning form input into a `ScanRequest`.
/// These never reach the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please enter a valid target")]
    MissingTarget,

    #[error("please specify the ports to scan")]
    MissingPortSpec,

    #[error("invalid port specification: {0}")]
    InvalidPortSpec(#[from] PortSpecError),

    #[error("select at least one protocol")]
    NoProtocolSelected,

    #[error("{field} must be a positive integer (got {value:?})")]
    InvalidNumericField { field: &'static str, value: String },
}

/// Grammar errors for custom port lists such as `80,90-95,443`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("empty entry at position {0}")]
    EmptyEntry(usize),

    #[error("invalid port value: {0}")]
    InvalidPort(String),

    #[error("port out of range: {0}")]
    OutOfRange(u32),

    #[error("invalid range {start}-{end} (start > end)")]
    ReversedRange { start: u16, end: u16 },
}

/// Job creation failed; the controller returns to idle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A progress check failed. Logged, never alerted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("progress endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed progress payload: {0}")]
    Decode(String),
}

/// Cancellation was not acknowledged; polling keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("stop rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Fallback shown when the backend gives no usable error text.
pub const GENERIC_SUBMIT_ERROR: &str = "error starting scan";

/// Pull a human readable message out of an API error body.
///
/// Prefers an `error` (or `detail`) string; otherwise flattens a field error
/// map like `{"timeout": ["must be between 1 and 60"]}` into
/// `timeout: must be between 1 and 60`.
pub fn extract_error_message(body: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    let obj = body.as_object()?;
    for key in ["error", "detail"] {
        if let Some(Value::String(s)) = obj.get(key) {
            if !s.trim().is_empty() {
                return Some(s.trim().to_string());
            }
        }
    }

    let mut parts = Vec::new();
    for (field, value) in obj {
        if field == "error" || field == "detail" {
            continue;
        }
        let msgs: Vec<String> = match value {
            Value::String(s) => vec![s.trim().to_string()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect(),
            _ => continue,
        };
        let msgs: Vec<String> = msgs.into_iter().filter(|m| !m.is_empty()).collect();
        if msgs.is_empty() {
            continue;
        }
        if field == "non_field_errors" {
            parts.push(msgs.join("; "));
        } else {
            parts.push(format!("{field}: {}", msgs.join("; ")));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
