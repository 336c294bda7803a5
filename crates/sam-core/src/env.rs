//! Environment variable utilities
//!
//! Typed lookups with defaults, used by the `from_env()` constructors of
//! the configuration structs.
//!
//! ```ignore
//! use sam_core::env::{env_get, env_get_opt};
//!
//! let workers: usize = env_get("SAM_NUM_WORKERS", 4);
//! let mode: Option<String> = env_get_opt("SAM_TASK_MODE");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset variables and values that fail to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__SAM_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
        let val: Option<u64> = env_get_opt("__SAM_TEST_UNSET_VAR__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_parses_and_trims() {
        std::env::set_var("__SAM_TEST_NUM__", " 123 ");
        let val: usize = env_get("__SAM_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__SAM_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__SAM_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__SAM_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__SAM_TEST_INVALID__");
    }
}
