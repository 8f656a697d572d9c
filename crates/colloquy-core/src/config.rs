use crate::errors::ConfigError;
use crate::model::BatchSpec;
use crate::retry::RetryPolicy;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Runtime knobs for the pipeline, read from the environment.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub log_level: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 500,
            max_attempts: 3,
            backoff_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("COLLOQUY_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                cfg.max_workers = n;
            }
        }
        if let Ok(v) = env::var("COLLOQUY_POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                cfg.poll_interval_ms = n;
            }
        }
        if let Ok(v) = env::var("COLLOQUY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                cfg.max_attempts = n;
            }
        }
        if let Ok(v) = env::var("COLLOQUY_BACKOFF_MS") {
            if let Ok(n) = v.parse() {
                cfg.backoff_ms = n;
            }
        }
        if let Ok(v) = env::var("COLLOQUY_LOG") {
            cfg.log_level = v;
        }
        cfg
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Loads a batch file. Unknown fields warn instead of silently vanishing.
pub fn load_batch(path: &Path) -> Result<BatchSpec, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read batch {}: {}", path.display(), e)))?;

    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let spec: BatchSpec = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    if !ignored_keys.is_empty() {
        tracing::warn!(fields = ?ignored_keys, "ignored unknown batch fields");
    }

    if spec.tests.is_empty() {
        return Err(ConfigError(format!(
            "batch has no tests (file: {})",
            path.display()
        )));
    }

    Ok(spec)
}

pub fn write_sample_batch(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"batch_id: demo
provider: fake
tests:
  - test_id: t1_greeting
    credentials:
      org_domain: "https://example.my.salesforce.com"
      client_id: "replace-me"
      client_secret: "replace-me"
      agent_id: "replace-me"
    turns:
      - turn_id: turn-1
        order: 1
        user_input: "Say hello to the operator."
        validations:
          - validation_id: v1
            validation_type: contains
            validation_parameters:
              text: "hello"
              case_sensitive: false
          - validation_id: v2
            validation_type: regex
            validation_parameters:
              pattern: "hello|Hello"
              expected_match: true
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write sample batch: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentProvider;
    use tempfile::tempdir;

    #[test]
    fn sample_batch_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.yaml");
        write_sample_batch(&path).unwrap();

        let spec = load_batch(&path).unwrap();
        assert_eq!(spec.batch_id, "demo");
        assert_eq!(spec.provider, AgentProvider::Fake);
        assert_eq!(spec.tests.len(), 1);
        let turn = &spec.tests[0].turns[0];
        assert_eq!(turn.order, 1);
        assert_eq!(turn.validations.len(), 2);
        assert_eq!(turn.validations[0].validation_type, "contains");
    }

    #[test]
    fn empty_batch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "batch_id: empty\ntests: []\n").unwrap();
        let err = load_batch(&path).unwrap_err();
        assert!(err.to_string().contains("no tests"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_batch(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read batch"));
    }
}
