use crate::model::{BatchResults, BatchStatus, JobStatus, TestStatus};

pub mod memory;
pub mod schema;
pub mod store;

pub use memory::MemoryStore;
pub use store::SqliteStore;

/// Optional fields on a job status update. Absent fields keep their stored
/// value; `clear_current` nulls both current markers when a job finishes.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub current_test_id: Option<String>,
    pub current_turn: Option<u32>,
    pub completed_tests: Option<u32>,
    pub failed_tests: Option<u32>,
    pub error: Option<String>,
    pub clear_current: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TestUpdate {
    pub total_validations: Option<u32>,
    pub passed_validations: Option<u32>,
    pub failed_validations: Option<u32>,
    pub avg_response_time: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTurnResult {
    pub turn_id: String,
    pub order: u32,
    pub user_input: String,
    pub agent_response: String,
    pub scraped_content: Option<String>,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NewValidationResult {
    pub validation_id: String,
    pub validation_type: String,
    pub is_passed: bool,
    pub score: Option<f64>,
    pub details: Option<serde_json::Value>,
}

/// Keyed storage for job, test, turn and validation records.
///
/// Every mutating call recomputes the derived fields it affects in the same
/// step: job progress on status updates, test pass rate and terminal
/// timestamps on test updates, turn validation counts after each validation
/// insert. Readers never see a stale derived value.
pub trait ResultStore: Send + Sync {
    fn create_job(&self, job_id: &str, batch_id: &str, total_tests: u32) -> anyhow::Result<()>;

    fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: JobUpdate,
    ) -> anyhow::Result<()>;

    fn create_test_result(&self, job_id: &str, test_id: &str) -> anyhow::Result<i64>;

    fn update_test_result(
        &self,
        test_result_id: i64,
        status: TestStatus,
        update: TestUpdate,
    ) -> anyhow::Result<()>;

    fn create_turn_result(&self, test_result_id: i64, turn: &NewTurnResult)
        -> anyhow::Result<i64>;

    fn create_validation_result(
        &self,
        turn_result_id: i64,
        validation: &NewValidationResult,
    ) -> anyhow::Result<()>;

    fn get_batch_status(&self, job_id: &str) -> anyhow::Result<Option<BatchStatus>>;

    fn get_batch_results(
        &self,
        job_id: &str,
        include_scraped_content: bool,
    ) -> anyhow::Result<Option<BatchResults>>;
}
