use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Uniform verdict shape returned by every validation strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub validation_type: String,
    pub passed: bool,
    pub score: Option<f64>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Verdict {
    pub fn pass(validation_type: &str, score: f64, details: serde_json::Value) -> Self {
        Self {
            validation_type: validation_type.to_string(),
            passed: true,
            score: Some(score),
            details,
        }
    }

    pub fn fail(validation_type: &str, score: f64, details: serde_json::Value) -> Self {
        Self {
            validation_type: validation_type.to_string(),
            passed: false,
            score: Some(score),
            details,
        }
    }
}

/// One pluggable validation strategy, keyed by its type string.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict>;
}

/// Dispatch table over the registered strategies. An unrecognized type is a
/// failed verdict naming the type, never an error.
pub struct ValidatorSet {
    validators: HashMap<&'static str, Arc<dyn Validator>>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        let mut map = HashMap::new();
        for v in validators {
            map.insert(v.name(), v);
        }
        Self { validators: map }
    }

    pub async fn dispatch(
        &self,
        validation_type: &str,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        match self.validators.get(validation_type) {
            Some(v) => v.validate(response, params).await,
            None => Ok(Verdict::fail(
                validation_type,
                0.0,
                serde_json::json!({
                    "message": format!("unknown validation type: {}", validation_type)
                }),
            )),
        }
    }

    pub fn contains(&self, validation_type: &str) -> bool {
        self.validators.contains_key(validation_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysPass;

    #[async_trait]
    impl Validator for AlwaysPass {
        fn name(&self) -> &'static str {
            "always_pass"
        }

        async fn validate(
            &self,
            _response: &str,
            _params: &serde_json::Value,
        ) -> anyhow::Result<Verdict> {
            Ok(Verdict::pass("always_pass", 1.0, serde_json::json!({})))
        }
    }

    #[tokio::test]
    async fn unknown_type_fails_without_error() {
        let set = ValidatorSet::new(vec![Arc::new(AlwaysPass)]);
        let verdict = set
            .dispatch("no_such_type", "response", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.score, Some(0.0));
        assert!(verdict.details["message"]
            .as_str()
            .unwrap()
            .contains("no_such_type"));
    }

    #[tokio::test]
    async fn registered_type_dispatches() {
        let set = ValidatorSet::new(vec![Arc::new(AlwaysPass)]);
        assert!(set.contains("always_pass"));
        let verdict = set
            .dispatch("always_pass", "anything", &serde_json::json!({}))
            .await
            .unwrap();
        assert!(verdict.passed);
    }
}
