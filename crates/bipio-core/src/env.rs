//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `EngineConfig::from_env()` and the
//! logging macros.
//!
//! ```ignore
//! use bipio_core::env::{env_get, env_get_bool};
//!
//! let size: usize = env_get("BIPIO_BUFFER_SIZE", 4096);
//! let flush = env_get_bool("BIPIO_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Variable parsed as `T`, or `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Variable as a boolean.
///
/// "1", "true", "yes", "on" (any case) are true; any other value is false.
/// Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_returns_default() {
        let val: usize = env_get("__BIPIO_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(env_get_bool("__BIPIO_TEST_UNSET__", true));
        assert!(env_get_opt::<u16>("__BIPIO_TEST_UNSET__").is_none());
        assert_eq!(env_get_str("__BIPIO_TEST_UNSET__", "x"), "x");
    }

    #[test]
    fn test_parse_and_fallback() {
        std::env::set_var("__BIPIO_TEST_NUM__", " 8192 ");
        let val: usize = env_get("__BIPIO_TEST_NUM__", 0);
        assert_eq!(val, 8192);

        std::env::set_var("__BIPIO_TEST_NUM__", "lots");
        let val: usize = env_get("__BIPIO_TEST_NUM__", 7);
        assert_eq!(val, 7);
        std::env::remove_var("__BIPIO_TEST_NUM__");
    }

    #[test]
    fn test_bool_variants() {
        for yes in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var("__BIPIO_TEST_BOOL__", yes);
            assert!(env_get_bool("__BIPIO_TEST_BOOL__", false), "{}", yes);
        }
        for no in ["0", "false", "garbage"] {
            std::env::set_var("__BIPIO_TEST_BOOL__", no);
            assert!(!env_get_bool("__BIPIO_TEST_BOOL__", true), "{}", no);
        }
        std::env::remove_var("__BIPIO_TEST_BOOL__");
    }
}
