//! Document actor configuration.

use std::path::PathBuf;

/// Per-document actor settings.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Bounded inbound queue length (senders wait when full)
    pub queue_capacity: usize,
    /// Number of recent history entries kept in memory for rebasing
    pub history_window: usize,
    /// Directory holding the plain-text backing files. `None` disables
    /// seeding and flushing.
    pub root_dir: Option<PathBuf>,
    /// Use the backing file as the log's base content when the log is empty
    pub seed_from_file: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            history_window: 1024,
            root_dir: None,
            seed_from_file: true,
        }
    }
}

impl DocumentConfig {
    /// Small queue and window so tests hit backpressure and log seeks.
    pub fn for_testing() -> Self {
        Self {
            queue_capacity: 8,
            history_window: 4,
            root_dir: None,
            seed_from_file: true,
        }
    }

    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root_dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DocumentConfig::default();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.history_window, 1024);
        assert!(config.root_dir.is_none());
        assert!(config.seed_from_file);
    }

    #[test]
    fn test_with_root_dir() {
        let config = DocumentConfig::for_testing().with_root_dir("/tmp/docs");
        assert_eq!(config.root_dir, Some(PathBuf::from("/tmp/docs")));
        assert_eq!(config.history_window, 4);
    }
}
