//! Known URL schemes
//!
//! Advisory only: drives suggestions in front ends. Unknown or empty schemes
//! are never rejected by the engine.

/// Schemes offered as suggestions, in display order
pub const KNOWN_SCHEMES: &[&str] = &[
    "http",
    "https",
    "ssh",
    "git",
    "rsync",
    "ftp",
    "sftp",
    "redis",
    "jdbc",
    "mongodb",
    "postgresql",
    "mysql",
    "mysqlx",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemeRegistry;

impl SchemeRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn known_schemes(&self) -> &'static [&'static str] {
        KNOWN_SCHEMES
    }

    pub fn is_known(&self, scheme: &str) -> bool {
        KNOWN_SCHEMES.contains(&scheme)
    }

    /// Known schemes starting with `prefix` (case-insensitive), in list order
    pub fn suggest(&self, prefix: &str) -> Vec<&'static str> {
        let prefix = prefix.trim().to_ascii_lowercase();
        KNOWN_SCHEMES
            .iter()
            .copied()
            .filter(|scheme| scheme.starts_with(&prefix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_schemes_order() {
        let registry = SchemeRegistry::new();
        let schemes = registry.known_schemes();
        assert_eq!(schemes.len(), 13);
        assert_eq!(schemes[0], "http");
        assert_eq!(schemes[12], "mysqlx");
    }

    #[test]
    fn test_is_known() {
        let registry = SchemeRegistry::new();
        assert!(registry.is_known("postgresql"));
        assert!(!registry.is_known("gopher"));
        assert!(!registry.is_known(""));
        assert!(!registry.is_known("HTTP"));
    }

    #[test]
    fn test_suggest() {
        let registry = SchemeRegistry::new();
        assert_eq!(registry.suggest("my"), vec!["mysql", "mysqlx"]);
        assert_eq!(registry.suggest("HT"), vec!["http", "https"]);
        assert_eq!(registry.suggest("").len(), KNOWN_SCHEMES.len());
        assert!(registry.suggest("zz").is_empty());
    }
}
