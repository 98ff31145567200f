use std::{env, fmt::Display, str::FromStr};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads and parses the environment variable `name`. Missing or unparseable values yield `default`. The `on_invalid`
/// callback is handed the offending raw value and parse error so that callers can log it in their own idiom.
pub fn parse_env_or<T, F>(name: &str, default: T, on_invalid: F) -> T
where
    T: FromStr,
    T::Err: Display,
    F: FnOnce(&str, String),
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            on_invalid(&s, e.to_string());
            default
        }),
        Err(_) => default,
    }
}
