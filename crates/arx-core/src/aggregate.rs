//! Risk aggregation
//!
//! Folds the three independent signals into one 0-100 score per package and
//! rolls packages up into a session verdict.

use crate::error::{AnalysisError, Result};
use crate::types::{
    Coverage, NameVerdict, PackageAssessment, PatternFinding, RiskBand, SemanticVerdict,
    SessionAssessment, Severity,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weights and caps used by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub low_weight: f64,
    pub medium_weight: f64,
    pub high_weight: f64,
    /// Highest baseline a fallback verdict may contribute
    pub fallback_ceiling: f64,
    pub suspicious_name_penalty: f64,
    pub incomplete_penalty: f64,
    /// Highest score a package with any high-severity finding may get
    pub high_finding_ceiling: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            low_weight: 5.0,
            medium_weight: 15.0,
            high_weight: 40.0,
            fallback_ceiling: 50.0,
            suspicious_name_penalty: 15.0,
            incomplete_penalty: 25.0,
            high_finding_ceiling: 39.0,
        }
    }
}

impl ScoringPolicy {
    /// Reject policies under which a finding or failure could raise a score,
    /// or a fallback verdict could score as fully safe
    pub fn validate(&self) -> Result<()> {
        let deductions = [
            ("low_weight", self.low_weight),
            ("medium_weight", self.medium_weight),
            ("high_weight", self.high_weight),
            ("suspicious_name_penalty", self.suspicious_name_penalty),
            ("incomplete_penalty", self.incomplete_penalty),
        ];
        for (field, value) in deductions {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::Config(format!(
                    "scoring.{} must be a non-negative number",
                    field
                )));
            }
        }
        if !(0.0..100.0).contains(&self.fallback_ceiling) {
            return Err(AnalysisError::Config(
                "scoring.fallback_ceiling must be within [0, 100)".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.high_finding_ceiling) {
            return Err(AnalysisError::Config(
                "scoring.high_finding_ceiling must be within [0, 100]".into(),
            ));
        }
        Ok(())
    }

    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high_weight,
            Severity::Medium => self.medium_weight,
            Severity::Low => self.low_weight,
        }
    }
}

/// Combines analyzer outputs into assessments
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    policy: ScoringPolicy,
}

impl Aggregator {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Assess a package whose recipe was fully evaluated
    pub fn assess(
        &self,
        package_name: &str,
        name_verdict: NameVerdict,
        findings: Vec<PatternFinding>,
        semantic: SemanticVerdict,
    ) -> PackageAssessment {
        self.build(package_name, name_verdict, findings, semantic, Coverage::Complete)
    }

    /// Assess a package that could not be fully evaluated; the incomplete
    /// penalty applies on top of everything else
    pub fn assess_incomplete(
        &self,
        package_name: &str,
        name_verdict: NameVerdict,
        findings: Vec<PatternFinding>,
        semantic: SemanticVerdict,
        reason: impl Into<String>,
    ) -> PackageAssessment {
        self.build(
            package_name,
            name_verdict,
            findings,
            semantic,
            Coverage::Incomplete(reason.into()),
        )
    }

    fn build(
        &self,
        package_name: &str,
        name_verdict: NameVerdict,
        findings: Vec<PatternFinding>,
        semantic: SemanticVerdict,
        coverage: Coverage,
    ) -> PackageAssessment {
        let risk_score = self.score(&name_verdict, &findings, &semantic, &coverage);
        debug!(
            "{}: score {:.1} ({} findings, source {:?})",
            package_name,
            risk_score,
            findings.len(),
            semantic.source
        );

        PackageAssessment {
            package_name: package_name.to_string(),
            name_verdict,
            pattern_findings: findings,
            semantic_verdict: semantic,
            risk_score,
            coverage,
        }
    }

    fn score(
        &self,
        name_verdict: &NameVerdict,
        findings: &[PatternFinding],
        semantic: &SemanticVerdict,
        coverage: &Coverage,
    ) -> f64 {
        let policy = &self.policy;
        let confidence = if semantic.confidence.is_finite() {
            semantic.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut baseline = if semantic.malicious {
            (1.0 - confidence) * 100.0
        } else {
            confidence * 100.0
        };
        if semantic.is_fallback() {
            baseline = baseline.min(policy.fallback_ceiling);
        }

        let mut score = baseline;
        score -= findings.iter().map(|f| policy.weight(f.severity)).sum::<f64>();
        if name_verdict.is_suspicious {
            score -= policy.suspicious_name_penalty;
        }
        if *coverage != Coverage::Complete {
            score -= policy.incomplete_penalty;
        }

        let mut score = score.clamp(0.0, 100.0);
        if findings.iter().any(|f| f.severity == Severity::High) {
            score = score.min(policy.high_finding_ceiling);
        }
        score
    }

    /// Roll package assessments up into a session verdict.
    ///
    /// The session is as risky as its riskiest package.
    pub fn summarize(&self, assessments: Vec<PackageAssessment>) -> Result<SessionAssessment> {
        if assessments.is_empty() {
            return Err(AnalysisError::EmptySession);
        }

        let overall_confidence = assessments
            .iter()
            .map(|a| a.semantic_verdict.confidence)
            .sum::<f64>()
            / assessments.len() as f64;

        let minimum = assessments
            .iter()
            .map(|a| a.risk_score)
            .fold(f64::INFINITY, f64::min);

        Ok(SessionAssessment {
            assessments,
            overall_confidence,
            overall_risk: RiskBand::from_score(minimum),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, VerdictSource};

    fn verdict(malicious: bool, confidence: f64) -> SemanticVerdict {
        SemanticVerdict {
            malicious,
            confidence,
            suspicious_patterns: Vec::new(),
            recommendations: Vec::new(),
            explanation: String::new(),
            source: VerdictSource::Model,
        }
    }

    fn finding(id: &str, severity: Severity) -> PatternFinding {
        PatternFinding {
            pattern_id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            severity,
            category: Category::RemoteExecution,
            line: 1,
            snippet: String::new(),
            recommendation: String::new(),
        }
    }

    #[test]
    fn test_clean_package_scores_confidence() {
        let agg = Aggregator::default();
        let a = agg.assess("hello", NameVerdict::clean(), vec![], verdict(false, 0.92));
        assert!((a.risk_score - 92.0).abs() < 1e-9);
        assert_eq!(a.risk_band(), RiskBand::Low);
        assert!(a.is_complete());
    }

    #[test]
    fn test_malicious_verdict_inverts_confidence() {
        let agg = Aggregator::default();
        let a = agg.assess("evil", NameVerdict::clean(), vec![], verdict(true, 0.9));
        assert!((a.risk_score - 10.0).abs() < 1e-9);
        assert_eq!(a.risk_band(), RiskBand::High);
    }

    #[test]
    fn test_download_and_execute_always_high_band() {
        let agg = Aggregator::default();
        let a = agg.assess(
            "innocent-tool",
            NameVerdict::clean(),
            vec![finding("DLE-001", Severity::High)],
            verdict(false, 1.0),
        );
        assert!(a.risk_score <= 39.0);
        assert_eq!(a.risk_band(), RiskBand::High);
    }

    #[test]
    fn test_penalties_accumulate() {
        let agg = Aggregator::default();
        let a = agg.assess(
            "frefox",
            NameVerdict::suspicious("possible typosquat of firefox"),
            vec![finding("OBF-003", Severity::Medium), finding("OBF-004", Severity::Low)],
            verdict(false, 0.9),
        );
        // 90 - 15 - 5 - 15
        assert!((a.risk_score - 55.0).abs() < 1e-9);
        assert_eq!(a.risk_band(), RiskBand::Medium);
    }

    #[test]
    fn test_score_clamped() {
        let agg = Aggregator::default();
        let findings = vec![finding("A", Severity::High); 5];
        let a = agg.assess("x", NameVerdict::clean(), findings, verdict(true, 1.0));
        assert_eq!(a.risk_score, 0.0);
    }

    #[test]
    fn test_assess_is_idempotent() {
        let agg = Aggregator::default();
        let make = || {
            agg.assess(
                "pkg",
                NameVerdict::suspicious("long run of digits in name"),
                vec![finding("OBF-001", Severity::Medium)],
                verdict(false, 0.77),
            )
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_fallback_never_scores_higher() {
        let agg = Aggregator::default();
        for confidence in [0.0, 0.3, 0.5, 0.8, 1.0] {
            for malicious in [false, true] {
                let model = agg.assess("p", NameVerdict::clean(), vec![], verdict(malicious, confidence));
                let fallback = agg.assess(
                    "p",
                    NameVerdict::clean(),
                    vec![],
                    SemanticVerdict::fallback(0.5, "timeout"),
                );
                if confidence >= 0.5 && !malicious {
                    assert!(fallback.risk_score <= model.risk_score);
                }
                assert!(fallback.risk_score <= agg.policy().fallback_ceiling);
            }
        }
    }

    #[test]
    fn test_fallback_ceiling_applies() {
        let agg = Aggregator::default();
        let a = agg.assess(
            "p",
            NameVerdict::clean(),
            vec![],
            SemanticVerdict::fallback(0.9, "no credential"),
        );
        assert!((a.risk_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_penalty() {
        let agg = Aggregator::default();
        let a = agg.assess_incomplete(
            "p",
            NameVerdict::clean(),
            vec![],
            SemanticVerdict::fallback(0.5, "recipe unavailable"),
            "recipe unavailable",
        );
        assert!((a.risk_score - 25.0).abs() < 1e-9);
        assert_eq!(a.coverage, Coverage::Incomplete("recipe unavailable".into()));
        assert_eq!(a.risk_band(), RiskBand::High);
    }

    #[test]
    fn test_summarize_empty_fails() {
        let agg = Aggregator::default();
        assert!(matches!(agg.summarize(vec![]), Err(AnalysisError::EmptySession)));
    }

    #[test]
    fn test_summarize_uses_riskiest_package() {
        let agg = Aggregator::default();
        let safe = agg.assess("a", NameVerdict::clean(), vec![], verdict(false, 0.85));
        let risky = agg.assess("b", NameVerdict::clean(), vec![], verdict(false, 0.30));
        assert!((safe.risk_score - 85.0).abs() < 1e-9);
        assert!((risky.risk_score - 30.0).abs() < 1e-9);

        let session = agg.summarize(vec![safe, risky]).unwrap();
        assert_eq!(session.overall_risk, RiskBand::High);
        assert!((session.overall_confidence - 0.575).abs() < 1e-9);
        assert_eq!(session.assessments[0].package_name, "a");
        assert!((session.minimum_score() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_custom_policy() {
        let policy = ScoringPolicy {
            high_weight: 10.0,
            high_finding_ceiling: 100.0,
            ..ScoringPolicy::default()
        };
        let agg = Aggregator::new(policy);
        let a = agg.assess(
            "p",
            NameVerdict::clean(),
            vec![finding("X", Severity::High)],
            verdict(false, 0.9),
        );
        assert!((a.risk_score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_policy_validation() {
        assert!(ScoringPolicy::default().validate().is_ok());

        let negative = ScoringPolicy {
            incomplete_penalty: -25.0,
            ..ScoringPolicy::default()
        };
        assert!(matches!(negative.validate(), Err(AnalysisError::Config(_))));

        let unbounded = ScoringPolicy {
            fallback_ceiling: 100.0,
            ..ScoringPolicy::default()
        };
        assert!(unbounded.validate().is_err());

        let nan = ScoringPolicy {
            low_weight: f64::NAN,
            ..ScoringPolicy::default()
        };
        assert!(nan.validate().is_err());
    }
}
