//! Runtime configuration for the `bmr` binary.
//! Values come from the process environment, optionally seeded from a `.env` file.

use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct Config {
    /// Controller address, e.g. `192.168.1.10` or `http://bmr.local`.
    pub host: String,
    pub username: String,
    pub password: String,
    /// Upper bound for a single request, connect to last byte.
    pub request_timeout: Duration,
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn required(name: &str) -> Result<String, String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("Missing {}: set it in the environment or in .env", name)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let host = required("BMR_HOST")?;
        let username = required("BMR_USERNAME")?;
        let password = required("BMR_PASSWORD")?;

        let timeout_secs = match std::env::var("BMR_TIMEOUT_SECS") {
            Ok(s) if !s.trim().is_empty() => parse_timeout_secs(&s)?,
            _ => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Config {
            host,
            username,
            password,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// A zero timeout would fail every request immediately.
fn parse_timeout_secs(raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err("BMR_TIMEOUT_SECS must be at least 1 second".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err("BMR_TIMEOUT_SECS must be a whole number of seconds".to_string()),
    }
}

/// Load `KEY=value` lines from `path` into the process environment.
/// Variables already present in the environment are left alone.
pub fn load_env_file(path: &Path) -> Result<(), String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in contents.lines().enumerate() {
        let parsed = parse_env_line(line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?;
        if let Some((key, value)) = parsed
            && std::env::var_os(&key).is_none()
        {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }

    Ok(())
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    Ok(Some((key.to_string(), parse_env_value(raw)?)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('"') {
        parse_double_quoted(rest)
    } else if let Some(rest) = raw.strip_prefix('\'') {
        parse_single_quoted(rest)
    } else {
        // Unquoted: an inline comment ends the value.
        Ok(raw.split('#').next().unwrap_or_default().trim_end().to_string())
    }
}

/// Text after a closing quote may only be a comment.
fn ensure_trailing_comment(remainder: &str) -> Result<(), String> {
    let remainder = remainder.trim();
    if remainder.is_empty() || remainder.starts_with('#') {
        Ok(())
    } else {
        Err("unexpected characters after closing quote".to_string())
    }
}

fn parse_double_quoted(input: &str) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            '"' => {
                ensure_trailing_comment(chars.as_str())?;
                return Ok(value);
            }
            other => value.push(other),
        }
    }

    Err("unterminated double-quoted value".to_string())
}

fn parse_single_quoted(input: &str) -> Result<String, String> {
    let (value, remainder) = input
        .split_once('\'')
        .ok_or_else(|| "unterminated single-quoted value".to_string())?;
    ensure_trailing_comment(remainder)?;
    Ok(value.to_string())
}
