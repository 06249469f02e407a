//! Environment variable parsing utilities

use std::str::FromStr;

/// Parse an environment variable with a default fallback
///
/// # Example
/// ```ignore
/// let max: u32 = parse_env_with_default("DB_MAX_CONNECTIONS", 10);
/// ```
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default() {
        std::env::set_var("DB_POOL_TEST_VALUE", "17");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_VALUE", 3u32), 17);

        std::env::set_var("DB_POOL_TEST_VALUE", "not-a-number");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_VALUE", 3u32), 3);

        std::env::remove_var("DB_POOL_TEST_VALUE");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_VALUE", 3u32), 3);
    }
}
