use crate::errors::CredentialsError;
use serde::{Deserialize, Serialize};

/// A caller-submitted batch of conversational tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSpec {
    pub batch_id: String,
    #[serde(default)]
    pub provider: AgentProvider,
    pub tests: Vec<TestSpec>,
}

/// Which agent backend a batch runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProvider {
    #[default]
    Http,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub test_id: String,
    #[serde(default)]
    pub credentials: AgentCredentials,
    #[serde(default)]
    pub config: TestConfig,
    pub turns: Vec<TurnSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_selector: Option<String>,
}

/// Connection credentials for the remote agent API. All four fields are
/// required at session start; fields default to empty on deserialize so a
/// bad test fails in isolation at execution time, not at batch parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentCredentials {
    #[serde(default)]
    pub org_domain: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub agent_id: String,
}

impl AgentCredentials {
    pub fn validate(&self) -> Result<(), CredentialsError> {
        let mut missing = Vec::new();
        if self.org_domain.is_empty() {
            missing.push("org_domain");
        }
        if self.client_id.is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.is_empty() {
            missing.push("client_secret");
        }
        if self.agent_id.is_empty() {
            missing.push("agent_id");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CredentialsError { missing })
        }
    }
}

/// One scripted user input, with the validations to run against the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSpec {
    pub turn_id: String,
    pub order: u32,
    pub user_input: String,
    #[serde(default)]
    pub validations: Vec<ValidationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSpec {
    pub validation_id: String,
    pub validation_type: String,
    #[serde(default)]
    pub validation_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            _ => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Running,
    Completed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Running => "running",
            TestStatus::Completed => "completed",
            TestStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TestStatus::Running,
            "completed" => TestStatus::Completed,
            _ => TestStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Completed | TestStatus::Failed)
    }
}

/// Progress snapshot of one job, read back by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub job_id: String,
    pub batch_id: String,
    pub status: JobStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub progress: f64,
    pub total_tests: u32,
    pub completed_tests: u32,
    pub failed_tests: u32,
    pub current_test_id: Option<String>,
    pub current_turn: Option<u32>,
    pub error: Option<String>,
}

/// Full result tree of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    pub job_id: String,
    pub batch_id: String,
    pub status: JobStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub total_tests: u32,
    pub completed_tests: u32,
    pub failed_tests: u32,
    pub total_validations: u32,
    pub passed_validations: u32,
    pub failed_validations: u32,
    pub pass_rate: f64,
    pub avg_response_time: f64,
    pub test_results: Vec<TestResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub status: TestStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
    pub total_validations: u32,
    pub passed_validations: u32,
    pub failed_validations: u32,
    pub pass_rate: f64,
    pub avg_response_time: f64,
    pub turn_results: Vec<TurnResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub turn_id: String,
    pub order: u32,
    pub user_input: String,
    pub agent_response: String,
    pub scraped_content: Option<String>,
    pub response_time_ms: u64,
    pub validations_total: u32,
    pub validations_passed: u32,
    pub validations_failed: u32,
    pub validation_results: Vec<ValidationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validation_id: String,
    pub validation_type: String,
    pub is_passed: bool,
    pub score: Option<f64>,
    pub details: Option<serde_json::Value>,
}

// --- Derived-field arithmetic ---
//
// Every derived field in the result tree goes through these helpers, invoked
// by the store on each affecting write. Nothing caches them.

pub fn progress_pct(completed: u32, failed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed + failed) as f64 / total as f64 * 100.0
}

pub fn pass_rate_pct(passed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    passed as f64 / total as f64 * 100.0
}

pub fn mean_response_time(times_ms: &[u64]) -> f64 {
    if times_ms.is_empty() {
        return 0.0;
    }
    times_ms.iter().sum::<u64>() as f64 / times_ms.len() as f64
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counts_both_outcomes() {
        assert_eq!(progress_pct(2, 1, 3), 100.0);
        assert_eq!(progress_pct(1, 0, 4), 25.0);
        assert_eq!(progress_pct(0, 0, 0), 0.0);
    }

    #[test]
    fn pass_rate_zero_when_no_validations() {
        assert_eq!(pass_rate_pct(0, 0), 0.0);
        assert_eq!(pass_rate_pct(3, 4), 75.0);
    }

    #[test]
    fn mean_is_zero_for_empty_and_flat_otherwise() {
        assert_eq!(mean_response_time(&[]), 0.0);
        assert_eq!(mean_response_time(&[100, 200, 300]), 200.0);
    }

    #[test]
    fn credentials_validation_names_missing_fields() {
        let creds = AgentCredentials {
            org_domain: "https://example.my.salesforce.com".into(),
            client_id: "id".into(),
            client_secret: String::new(),
            agent_id: String::new(),
        };
        let err = creds.validate().unwrap_err();
        assert_eq!(err.missing, vec!["client_secret", "agent_id"]);
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn status_round_trips() {
        assert_eq!(JobStatus::parse(JobStatus::Running.as_str()), JobStatus::Running);
        assert_eq!(TestStatus::parse("completed"), TestStatus::Completed);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
    }
}
