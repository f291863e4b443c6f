//! Core type definitions for the arx analysis engine

use serde::{Deserialize, Serialize};

/// Severity levels for pattern findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Strong indicator of malicious intent
    High = 0,
    /// Potentially dangerous, needs review
    Medium = 1,
    /// Unusual but often legitimate
    Low = 2,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
        }
    }
}

/// Category of a pattern finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Remote content fetched and executed
    RemoteExecution,
    /// Writes outside the package's own build directory
    OutsideBuildDir,
    /// Persistence mechanisms
    Persistence,
    /// Raw IPs, reverse shells and untrusted hosts
    Network,
    /// Data leaving the machine
    Exfiltration,
    /// Privilege escalation attempts
    PrivilegeEscalation,
    /// Encoded or obfuscated payloads
    Obfuscation,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::RemoteExecution => write!(f, "Remote Execution"),
            Category::OutsideBuildDir => write!(f, "Outside Build Directory"),
            Category::Persistence => write!(f, "Persistence"),
            Category::Network => write!(f, "Network"),
            Category::Exfiltration => write!(f, "Exfiltration"),
            Category::PrivilegeEscalation => write!(f, "Privilege Escalation"),
            Category::Obfuscation => write!(f, "Obfuscation"),
        }
    }
}

/// A single match of the pattern catalog against a recipe line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFinding {
    /// Catalog identifier (e.g., "DLE-001")
    pub pattern_id: String,
    /// Short title of the rule
    pub title: String,
    /// What the rule detects
    pub description: String,
    /// Severity of the rule
    pub severity: Severity,
    /// Rule category
    pub category: Category,
    /// Line number (1-indexed)
    pub line: usize,
    /// The triggering line, trimmed and shortened
    pub snippet: String,
    /// What to check or change
    #[serde(default)]
    pub recommendation: String,
}

/// How much of a recipe the pattern scanner could actually read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanCoverage {
    /// Clean text, every line scanned
    Full,
    /// Text was decoded lossily; scanned, but some bytes were replaced
    Partial,
    /// Binary or otherwise unreadable content; nothing scanned
    Unscannable,
}

/// Output of a pattern scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Findings in line order
    pub findings: Vec<PatternFinding>,
    /// Coverage signal
    pub coverage: ScanCoverage,
}

/// Verdict of the name heuristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameVerdict {
    pub is_suspicious: bool,
    pub reason: Option<String>,
}

impl NameVerdict {
    pub fn clean() -> Self {
        Self {
            is_suspicious: false,
            reason: None,
        }
    }

    pub fn suspicious(reason: impl Into<String>) -> Self {
        Self {
            is_suspicious: true,
            reason: Some(reason.into()),
        }
    }
}

/// Where a semantic verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    /// Validated response from the classifier model
    Model,
    /// Locally substituted conservative verdict
    Fallback,
}

/// Judgment of the semantic classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticVerdict {
    /// Whether the recipe shows malicious intent
    pub malicious: bool,
    /// Confidence in `malicious`, in [0, 1]
    pub confidence: f64,
    /// Short descriptions of detected issues
    pub suspicious_patterns: Vec<String>,
    /// Steps to verify or mitigate
    pub recommendations: Vec<String>,
    /// Free-text explanation
    pub explanation: String,
    pub source: VerdictSource,
}

impl SemanticVerdict {
    /// Conservative verdict used when the model cannot be consulted or trusted.
    ///
    /// It never clears a package: `malicious` stays false, but the confidence is
    /// the configured fallback constant and the aggregator caps its baseline.
    pub fn fallback(confidence: f64, reason: impl std::fmt::Display) -> Self {
        Self {
            malicious: false,
            confidence: confidence.clamp(0.0, 1.0),
            suspicious_patterns: Vec::new(),
            recommendations: vec!["Manual review recommended".to_string()],
            explanation: format!("Semantic analysis unavailable: {}", reason),
            source: VerdictSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == VerdictSource::Fallback
    }
}

/// Discrete risk classification derived from a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl RiskBand {
    /// Band for a 0-100 score: [0,40) high, [40,70) medium, [70,100] low
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            RiskBand::High
        } else if score < 70.0 {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskBand::High => write!(f, "HIGH RISK"),
            RiskBand::Medium => write!(f, "MEDIUM RISK"),
            RiskBand::Low => write!(f, "LOW RISK"),
        }
    }
}

/// Whether a package could be evaluated in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Coverage {
    Complete,
    Incomplete(String),
}

/// Input for one package analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub package_name: String,
    pub recipe_text: Option<String>,
}

impl AnalysisRequest {
    pub fn new(package_name: impl Into<String>, recipe_text: Option<String>) -> Self {
        Self {
            package_name: package_name.into(),
            recipe_text,
        }
    }

    /// Build a request from raw fetched bytes; invalid UTF-8 is replaced, not rejected
    pub fn from_bytes(package_name: impl Into<String>, recipe: Option<Vec<u8>>) -> Self {
        let recipe_text = recipe.map(|bytes| match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        });
        Self::new(package_name, recipe_text)
    }
}

/// Combined assessment of one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageAssessment {
    pub package_name: String,
    pub name_verdict: NameVerdict,
    pub pattern_findings: Vec<PatternFinding>,
    pub semantic_verdict: SemanticVerdict,
    /// 0 (dangerous) to 100 (safe)
    pub risk_score: f64,
    pub coverage: Coverage,
}

impl PackageAssessment {
    pub fn risk_band(&self) -> RiskBand {
        RiskBand::from_score(self.risk_score)
    }

    pub fn is_complete(&self) -> bool {
        self.coverage == Coverage::Complete
    }

    /// Count findings of the given severity
    pub fn count_severity(&self, severity: Severity) -> usize {
        self.pattern_findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }
}

/// Verdict over every package requested in one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAssessment {
    pub assessments: Vec<PackageAssessment>,
    /// Mean semantic confidence across packages
    pub overall_confidence: f64,
    /// Band of the riskiest package
    pub overall_risk: RiskBand,
}

impl SessionAssessment {
    /// Lowest risk score in the session
    pub fn minimum_score(&self) -> f64 {
        self.assessments
            .iter()
            .map(|a| a.risk_score)
            .fold(f64::INFINITY, f64::min)
    }

    /// Check if the model judged any package malicious
    pub fn any_malicious(&self) -> bool {
        self.assessments.iter().any(|a| a.semantic_verdict.malicious)
    }

    /// Packages that could not be fully evaluated
    pub fn incomplete(&self) -> impl Iterator<Item = &PackageAssessment> {
        self.assessments.iter().filter(|a| !a.is_complete())
    }
}
