//! Startup line contract
//!
//! The fixture server announces its bound port on stdout with exactly one line
//! of the form `Server running at http://localhost:<port>`. The orchestrator
//! treats the first match as the authoritative port.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed text preceding the port number.
pub const STARTUP_PREFIX: &str = "Server running at http://localhost:";

static STARTUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Server running at http://localhost:(\d+)").expect("startup regex is valid")
});

/// Render the startup line for `port`.
pub fn startup_line(port: u16) -> String {
    format!("{STARTUP_PREFIX}{port}")
}

/// Extract the announced port from a chunk of server output.
///
/// The match is unanchored so prefixes added by process wrappers (npm, log
/// decorators) do not hide it. Port 0 and out-of-range numbers are rejected.
pub fn parse_startup_port(output: &str) -> Option<u16> {
    let caps = STARTUP_RE.captures(output)?;
    match caps[1].parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Server running at http://localhost:3000", Some(3000); "plain")]
    #[test_case("> fixture@1.0.0 start\nServer running at http://localhost:49152\n", Some(49152); "npm prefix")]
    #[test_case("[web] Server running at http://localhost:8080 (pid 42)", Some(8080); "decorated")]
    #[test_case("Server running at http://localhost:0", None; "port zero")]
    #[test_case("Server running at http://localhost:70000", None; "out of range")]
    #[test_case("Server running at http://127.0.0.1:3000", None; "other host")]
    #[test_case("Attempting to start server on port 3000...", None; "unrelated")]
    fn parses_startup_port(input: &str, expected: Option<u16>) {
        assert_eq!(parse_startup_port(input), expected);
    }

    #[test]
    fn startup_line_is_parseable() {
        assert_eq!(parse_startup_port(&startup_line(4173)), Some(4173));
    }
}
