use serde::Serialize;

/// Severity assigned when a record carries none, or an unrecognized one.
pub const DEFAULT_SEVERITY: &str = "DEFAULT";

/// The nine severity level names accepted by the logging backend, in
/// ascending order of urgency.
pub const CANONICAL_SEVERITIES: [&str; 9] = [
    "DEFAULT",
    "DEBUG",
    "INFO",
    "NOTICE",
    "WARNING",
    "ERROR",
    "CRITICAL",
    "ALERT",
    "EMERGENCY",
];

/// Severity of a log entry as the backend accepts it: either one of the
/// canonical level names or a numeric code that is a multiple of 100 in
/// `[0, 800]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Severity {
    Name(&'static str),
    Code(i64),
}

impl Severity {
    pub fn default_level() -> Self {
        Severity::Name(DEFAULT_SEVERITY)
    }
}

/// Maps an arbitrary severity representation to the backend's vocabulary.
///
/// Total: unrecognized input degrades to `DEFAULT` rather than failing.
/// All-digit input is parsed, truncated down to the nearest multiple of 100
/// and clamped to `[0, 800]`.
pub fn normalize(raw: &str) -> Severity {
    let level = raw.trim().to_uppercase();

    if let Some(name) = CANONICAL_SEVERITIES.iter().copied().find(|&n| n == level) {
        return Severity::Name(name);
    }

    if !level.is_empty() && level.bytes().all(|b| b.is_ascii_digit()) {
        // A digit string too long for i64 can only mean an enormous value.
        let code = level.parse::<i64>().unwrap_or(i64::MAX);
        return Severity::Code(((code / 100) * 100).clamp(0, 800));
    }

    let name = match level.as_str() {
        "D" | "FINE" | "FINER" | "FINEST" | "TRACE" | "TRACE_INT" => "DEBUG",
        "I" => "INFO",
        "N" => "NOTICE",
        "W" | "WARN" => "WARNING",
        "E" | "ERR" | "SEVERE" => "ERROR",
        "C" | "CRIT" | "FATAL" => "CRITICAL",
        "A" => "ALERT",
        "EMERG" | "PANIC" => "EMERGENCY",
        _ => DEFAULT_SEVERITY,
    };
    Severity::Name(name)
}
