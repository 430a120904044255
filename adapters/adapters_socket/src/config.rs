//! Config Module
//!
//! Resolver configuration. The reverse-lookup policy is an explicit value
//! handed to each [`Resolver`](crate::resolver::Resolver) rather than process
//! state, so two resolvers in one process may disagree.

use std::env;

/// Environment variable consulted by [`ResolverConfig::from_env`]
pub const REVERSE_LOOKUP_ENV: &str = "SOCKET_REVERSE_LOOKUP";

/// Reverse lookups are off unless the host opts in
pub const DEFAULT_REVERSE_LOOKUP: bool = false;

/// Name resolution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    reverse_lookup: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverConfig {
    /// Configuration with every setting at its default
    pub fn new() -> Self {
        Self {
            reverse_lookup: DEFAULT_REVERSE_LOOKUP,
        }
    }

    /// Read settings from the environment
    ///
    /// `SOCKET_REVERSE_LOOKUP` accepts `1`, `true`, `yes`, `on` and `0`,
    /// `false`, `no`, `off` (case-insensitive). Unset or unrecognised
    /// values leave the default in place.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use adapters_socket::config::{ResolverConfig, DEFAULT_REVERSE_LOOKUP};
    ///
    /// std::env::remove_var("SOCKET_REVERSE_LOOKUP");
    /// assert_eq!(ResolverConfig::from_env().reverse_lookup(), DEFAULT_REVERSE_LOOKUP);
    /// ```
    pub fn from_env() -> Self {
        let config = Self::new();
        match env::var(REVERSE_LOOKUP_ENV).ok().as_deref().and_then(parse_flag) {
            Some(enabled) => config.with_reverse_lookup(enabled),
            None => config,
        }
    }

    /// Enable or disable reverse lookups for address-producing calls
    pub fn with_reverse_lookup(mut self, enabled: bool) -> Self {
        self.reverse_lookup = enabled;
        self
    }

    pub fn reverse_lookup(&self) -> bool {
        self.reverse_lookup
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_explicit() {
        assert_eq!(ResolverConfig::default().reverse_lookup(), DEFAULT_REVERSE_LOOKUP);
        assert!(!ResolverConfig::new().reverse_lookup());
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::new().with_reverse_lookup(true);
        assert!(config.reverse_lookup());
        assert!(!config.with_reverse_lookup(false).reverse_lookup());
    }

    #[test]
    fn test_parse_flag() {
        for value in ["1", "true", "YES", " on "] {
            assert_eq!(parse_flag(value), Some(true), "{}", value);
        }
        for value in ["0", "False", "no", "OFF"] {
            assert_eq!(parse_flag(value), Some(false), "{}", value);
        }
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("maybe"), None);
    }
}
