//! Recipe pattern scanner
//!
//! Runs the pattern catalog over recipe text. Entirely offline.

use crate::rules::PatternCatalog;
use crate::types::{PatternFinding, ScanCoverage, ScanReport};
use std::sync::Arc;
use tracing::debug;

/// Longest snippet kept on a finding, in characters
const MAX_SNIPPET_CHARS: usize = 160;

/// Scanner that turns catalog matches into findings
#[derive(Clone)]
pub struct RecipeScanner {
    catalog: Arc<PatternCatalog>,
}

impl RecipeScanner {
    /// Create a scanner over a shared catalog
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Scan recipe text, returning findings in the order their lines occur
    pub fn scan(&self, recipe_text: &str) -> Vec<PatternFinding> {
        self.scan_report(recipe_text).findings
    }

    /// Scan recipe text and report how much of it could be read.
    ///
    /// Text with NUL bytes is treated as binary and not scanned at all.
    /// Text carrying replacement characters from a lossy decode is scanned,
    /// but flagged as partial.
    pub fn scan_report(&self, recipe_text: &str) -> ScanReport {
        if recipe_text.contains('\0') {
            debug!("Recipe contains NUL bytes, refusing to scan");
            return ScanReport {
                findings: Vec::new(),
                coverage: ScanCoverage::Unscannable,
            };
        }

        let coverage = if recipe_text.contains('\u{FFFD}') {
            ScanCoverage::Partial
        } else {
            ScanCoverage::Full
        };

        let findings: Vec<PatternFinding> = self
            .catalog
            .match_content(recipe_text)
            .into_iter()
            .filter_map(|m| {
                let rule = self.catalog.get_rule(&m.rule_id)?;
                Some(PatternFinding {
                    pattern_id: rule.id.clone(),
                    title: rule.name.clone(),
                    description: rule.description.clone(),
                    severity: rule.severity,
                    category: rule.category,
                    line: m.line,
                    snippet: snippet(&m.context),
                    recommendation: rule.recommendation.clone(),
                })
            })
            .collect();

        debug!("Pattern scan: {} findings ({:?})", findings.len(), coverage);
        ScanReport { findings, coverage }
    }

    /// Scan raw bytes, decoding lossily
    pub fn scan_bytes(&self, recipe: &[u8]) -> ScanReport {
        self.scan_report(&String::from_utf8_lossy(recipe))
    }
}

fn snippet(line: &str) -> String {
    let trimmed = line.trim();
    match trimmed.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
