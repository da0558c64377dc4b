//! Line protocol: one JSON argument array in, one JSON response out

use refillcache::{Arg, Key, Producer, RefillCache};
use serde_json::json;
use tracing::warn;

/// Answer one request line
///
/// Blank lines get no response. Anything else gets exactly one JSON line:
/// the lookup result, or `{"error": ...}` when the request is not an array
/// of scalars (null, booleans, numbers and strings).
pub fn handle_line<P: Producer>(cache: &RefillCache<P>, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let args: Vec<Arg> = match serde_json::from_str(line) {
        Ok(args) => args,
        Err(e) => {
            warn!(request = line, error = %e, "Rejected request");
            return Some(error_line(format!("invalid request: {}", e)));
        }
    };

    let lookup = cache.get_key(&Key::new(args));
    Some(serde_json::to_string(&lookup).unwrap_or_else(|e| error_line(e.to_string())))
}

fn error_line(message: String) -> String {
    json!({ "error": message }).to_string()
}
