//! Semantic classification of recipes
//!
//! Asks a language model whether a recipe shows malicious intent. Every call
//! is time-bounded and every failure degrades to a conservative fallback
//! verdict, so classification itself never fails.

mod backend;
mod prompt;
mod schema;

pub use backend::{BackendError, ModelBackend, OpenAiBackend};
pub use prompt::build_prompt;
pub use schema::{validate, ParseFailure, ValidatedVerdict};

use crate::config::ClassifierConfig;
use crate::types::SemanticVerdict;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Time-bounded classifier over a [`ModelBackend`]
#[derive(Clone)]
pub struct SemanticClassifier {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
    retry_transient: bool,
    max_recipe_bytes: usize,
    fallback_confidence: f64,
}

impl SemanticClassifier {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &ClassifierConfig) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(config.timeout_secs),
            retry_transient: config.retry_transient,
            max_recipe_bytes: config.max_recipe_bytes,
            fallback_confidence: config.fallback_confidence,
        }
    }

    /// Classifier backed by the OpenAI-compatible HTTP API
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, BackendError> {
        let backend = OpenAiBackend::new(config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Verdict used when the model cannot be consulted or trusted
    pub fn fallback(&self, reason: impl std::fmt::Display) -> SemanticVerdict {
        SemanticVerdict::fallback(self.fallback_confidence, reason)
    }

    /// Classify one recipe.
    ///
    /// Transient backend failures are retried once when enabled; credential
    /// problems and unusable replies go straight to the fallback.
    pub async fn classify(&self, package_name: &str, recipe_text: &str) -> SemanticVerdict {
        let prompt = build_prompt(package_name, recipe_text, self.max_recipe_bytes);
        let max_attempts = if self.retry_transient { 2 } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.call(&prompt).await {
                Ok(reply) => {
                    return match validate(&reply) {
                        Ok(verdict) => {
                            debug!(
                                "{}: model verdict malicious={} confidence={:.2}",
                                package_name, verdict.malicious, verdict.confidence
                            );
                            verdict.into_verdict()
                        }
                        Err(e) => {
                            debug!("{}: rejected model reply: {}", package_name, e);
                            self.fallback(format!("unusable model reply ({})", e))
                        }
                    };
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(
                        "{}: {} failed ({}), retrying",
                        package_name,
                        self.backend.name(),
                        e
                    );
                }
                Err(BackendError::MissingCredential) => {
                    debug!("{}: no API key, skipping semantic analysis", package_name);
                    return self.fallback(BackendError::MissingCredential);
                }
                Err(e) => {
                    warn!("Semantic analysis of {} failed: {}", package_name, e);
                    return self.fallback(e);
                }
            }
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, BackendError> {
        match tokio::time::timeout(self.timeout, self.backend.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerdictSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend replaying scripted results, optionally after a delay
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, BackendError>>>,
        delay: Option<Duration>,
        attempts: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                delay: None,
                attempts: AtomicUsize::new(0),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                delay: Some(Duration::from_secs(5)),
                attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(BackendError::Malformed("script exhausted".into())))
        }
    }

    const BENIGN: &str = r#"{"malicious_intent": false, "confidence": 0.9, "analysis": "standard build"}"#;

    fn classifier(backend: Arc<ScriptedBackend>) -> SemanticClassifier {
        SemanticClassifier::new(backend, &ClassifierConfig::default())
    }

    #[tokio::test]
    async fn test_model_verdict() {
        let backend = ScriptedBackend::new(vec![Ok(BENIGN.to_string())]);
        let verdict = classifier(backend.clone()).classify("hello", "make").await;
        assert_eq!(verdict.source, VerdictSource::Model);
        assert!(!verdict.malicious);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_after_retry() {
        let backend = ScriptedBackend::hanging();
        let verdict = classifier(backend.clone())
            .with_timeout(Duration::from_millis(50))
            .classify("slow", "make")
            .await;

        assert!(verdict.is_fallback());
        assert!(!verdict.malicious);
        assert_eq!(verdict.confidence, 0.5);
        assert_eq!(verdict.recommendations, vec!["Manual review recommended"]);
        assert!(verdict.explanation.contains("timed out"));
        assert_eq!(backend.attempts(), 2);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Status(503, "overloaded".into())),
            Ok(BENIGN.to_string()),
        ]);
        let verdict = classifier(backend.clone()).classify("pkg", "make").await;
        assert_eq!(verdict.source, VerdictSource::Model);
        assert_eq!(backend.attempts(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Auth(401)), Ok(BENIGN.into())]);
        let verdict = classifier(backend.clone()).classify("pkg", "make").await;
        assert!(verdict.is_fallback());
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_falls_back_immediately() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::MissingCredential)]);
        let verdict = classifier(backend.clone()).classify("pkg", "make").await;
        assert!(verdict.is_fallback());
        assert!(verdict.explanation.contains("no API key"));
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retry_can_be_disabled() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::Unreachable("connection refused".into())),
            Ok(BENIGN.into()),
        ]);
        let config = ClassifierConfig {
            retry_transient: false,
            ..ClassifierConfig::default()
        };
        let verdict = SemanticClassifier::new(backend.clone(), &config)
            .classify("pkg", "make")
            .await;
        assert!(verdict.is_fallback());
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_falls_back() {
        let backend = ScriptedBackend::new(vec![Ok(
            r#"{"malicious_intent": "maybe", "confidence": 0.9}"#.to_string(),
        )]);
        let verdict = classifier(backend.clone()).classify("pkg", "make").await;
        assert!(verdict.is_fallback());
        assert!(verdict.explanation.contains("unusable model reply"));
        assert_eq!(backend.attempts(), 1);
    }

    #[tokio::test]
    async fn test_configured_fallback_confidence() {
        let backend = ScriptedBackend::new(vec![Ok("no json here".into())]);
        let config = ClassifierConfig {
            fallback_confidence: 0.3,
            ..ClassifierConfig::default()
        };
        let verdict = SemanticClassifier::new(backend, &config).classify("pkg", "make").await;
        assert!(verdict.is_fallback());
        assert_eq!(verdict.confidence, 0.3);
    }
}
