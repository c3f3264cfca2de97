//! Helpers for building scripting-runtime instructions

/// Escape a value for embedding inside a double-quoted script string
/// literal. Paths are the usual offenders: backslashes on Windows, the odd
/// quote in a video title.
pub fn escape_script_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str(r"\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}
