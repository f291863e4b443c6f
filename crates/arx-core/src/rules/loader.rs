//! Rule file loader

use super::Rule;
use crate::error::{AnalysisError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Loader for rule definition files
pub struct RuleLoader;

impl RuleLoader {
    /// Create a new rule loader
    pub fn new() -> Self {
        Self
    }

    /// Load rules from a TOML file
    pub fn load_from_file(&self, path: &Path) -> Result<Vec<Rule>> {
        let content = std::fs::read_to_string(path)?;
        self.parse_toml(&content, path)
    }

    /// Load all rules from a directory.
    ///
    /// Files are visited in name order so that later files override earlier
    /// ones deterministically. A file that fails to parse is skipped.
    pub fn load_from_directory(&self, dir: &Path) -> Result<Vec<Rule>> {
        if !dir.is_dir() {
            return Err(AnalysisError::Config(format!(
                "Rules directory does not exist: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "toml").unwrap_or(false))
            .collect();
        paths.sort();

        let mut all_rules = Vec::new();
        for path in paths {
            debug!("Loading rules from: {}", path.display());
            match self.load_from_file(&path) {
                Ok(rules) => {
                    debug!("Loaded {} rules from {}", rules.len(), path.display());
                    all_rules.extend(rules);
                }
                Err(e) => {
                    warn!("Failed to load rules from {}: {}", path.display(), e);
                }
            }
        }

        Ok(all_rules)
    }

    /// Parse TOML content into rules
    fn parse_toml(&self, content: &str, path: &Path) -> Result<Vec<Rule>> {
        #[derive(serde::Deserialize)]
        struct RulesFile {
            #[serde(default)]
            rule: Vec<Rule>,
        }

        let file: RulesFile = toml::from_str(content).map_err(|e| {
            AnalysisError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        Ok(file.rule)
    }
}

impl Default for RuleLoader {
    fn default() -> Self {
        Self::new()
    }
}
