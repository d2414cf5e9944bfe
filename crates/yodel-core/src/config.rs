//! Environment loading shared by every Yodel process.
//!
//! Values come from the process environment, optionally seeded from
//! `.env.<environment>` and then `.env`. Variables already present in the
//! environment are never overwritten, so the environment-specific file wins
//! over the default one.

use std::str::FromStr;

/// Load `.env.<environment>` followed by `.env`. Missing files are ignored.
pub fn load_env_files(environment: &str) {
    let _ = dotenv::from_filename(format!(".env.{environment}"));
    let _ = dotenv::dotenv();
}

/// Read a variable, treating an empty value as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` when it is unset or
/// does not parse.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a boolean flag. Accepts `true`/`false`/`1`/`0` (case-insensitive).
pub fn env_flag(key: &str) -> Option<bool> {
    env_opt(key).and_then(|v| parse_flag(&v))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
