/// Quotes a string as a JSON-style literal for error messages and default
/// expressions.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}
