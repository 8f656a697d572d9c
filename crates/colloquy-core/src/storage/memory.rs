use super::{JobUpdate, NewTurnResult, NewValidationResult, ResultStore, TestUpdate};
use crate::model::{
    self, BatchResults, BatchStatus, JobStatus, TestResult, TestStatus, TurnResult,
    ValidationResult,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct JobRecord {
    batch_id: String,
    status: JobStatus,
    started_at: Option<String>,
    completed_at: Option<String>,
    total_tests: u32,
    completed_tests: u32,
    failed_tests: u32,
    progress: f64,
    current_test_id: Option<String>,
    current_turn: Option<u32>,
    error: Option<String>,
    tests: Vec<TestRecord>,
}

#[derive(Debug, Clone)]
struct TestRecord {
    id: i64,
    result: TestResult,
    turn_ids: Vec<i64>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, JobRecord>,
    // test_result_id -> owning job id
    test_index: HashMap<i64, String>,
    // turn_result_id -> (owning job id, test_result_id)
    turn_index: HashMap<i64, (String, i64)>,
    next_id: i64,
}

/// In-memory result store, the default for tests and offline runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_test<'a>(job: &'a mut JobRecord, test_result_id: i64) -> Option<&'a mut TestRecord> {
    job.tests.iter_mut().find(|t| t.id == test_result_id)
}

impl ResultStore for MemoryStore {
    fn create_job(&self, job_id: &str, batch_id: &str, total_tests: u32) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(
            job_id.to_string(),
            JobRecord {
                batch_id: batch_id.to_string(),
                status: JobStatus::Queued,
                started_at: Some(model::now_rfc3339()),
                completed_at: None,
                total_tests,
                completed_tests: 0,
                failed_tests: 0,
                progress: 0.0,
                current_test_id: None,
                current_turn: None,
                error: None,
                tests: Vec::new(),
            },
        );
        Ok(())
    }

    fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: JobUpdate,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow::anyhow!("unknown job id: {}", job_id))?;

        job.status = status;
        if let Some(test_id) = update.current_test_id {
            job.current_test_id = Some(test_id);
        }
        if let Some(turn) = update.current_turn {
            job.current_turn = Some(turn);
        }
        if update.clear_current {
            job.current_test_id = None;
            job.current_turn = None;
        }
        if let Some(completed) = update.completed_tests {
            job.completed_tests = completed;
        }
        if let Some(failed) = update.failed_tests {
            job.failed_tests = failed;
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        job.progress = model::progress_pct(job.completed_tests, job.failed_tests, job.total_tests);
        if status.is_terminal() {
            job.completed_at = Some(model::now_rfc3339());
        }
        Ok(())
    }

    fn create_test_result(&self, job_id: &str, test_id: &str) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| anyhow::anyhow!("unknown job id: {}", job_id))?;
        job.tests.push(TestRecord {
            id,
            result: TestResult {
                test_id: test_id.to_string(),
                status: TestStatus::Running,
                started_at: Some(model::now_rfc3339()),
                completed_at: None,
                error: None,
                total_validations: 0,
                passed_validations: 0,
                failed_validations: 0,
                pass_rate: 0.0,
                avg_response_time: 0.0,
                turn_results: Vec::new(),
            },
            turn_ids: Vec::new(),
        });
        inner.test_index.insert(id, job_id.to_string());
        Ok(id)
    }

    fn update_test_result(
        &self,
        test_result_id: i64,
        status: TestStatus,
        update: TestUpdate,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job_id = inner
            .test_index
            .get(&test_result_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown test result id: {}", test_result_id))?;
        let job = inner.jobs.get_mut(&job_id).expect("indexed job exists");
        let test = find_test(job, test_result_id).expect("indexed test exists");

        let result = &mut test.result;
        result.status = status;
        if let Some(total) = update.total_validations {
            result.total_validations = total;
        }
        if let Some(passed) = update.passed_validations {
            result.passed_validations = passed;
        }
        result.failed_validations = update
            .failed_validations
            .unwrap_or(result.total_validations - result.passed_validations);
        if let Some(avg) = update.avg_response_time {
            result.avg_response_time = avg;
        }
        if let Some(error) = update.error {
            result.error = Some(error);
        }
        result.pass_rate =
            model::pass_rate_pct(result.passed_validations, result.total_validations);
        if status.is_terminal() {
            result.completed_at = Some(model::now_rfc3339());
        }
        Ok(())
    }

    fn create_turn_result(
        &self,
        test_result_id: i64,
        turn: &NewTurnResult,
    ) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        let job_id = inner
            .test_index
            .get(&test_result_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown test result id: {}", test_result_id))?;
        {
            let job = inner.jobs.get_mut(&job_id).expect("indexed job exists");
            let test = find_test(job, test_result_id).expect("indexed test exists");
            test.result.turn_results.push(TurnResult {
                turn_id: turn.turn_id.clone(),
                order: turn.order,
                user_input: turn.user_input.clone(),
                agent_response: turn.agent_response.clone(),
                scraped_content: turn.scraped_content.clone(),
                response_time_ms: turn.response_time_ms,
                validations_total: 0,
                validations_passed: 0,
                validations_failed: 0,
                validation_results: Vec::new(),
            });
            test.turn_ids.push(id);
        }
        inner.turn_index.insert(id, (job_id, test_result_id));
        Ok(id)
    }

    fn create_validation_result(
        &self,
        turn_result_id: i64,
        validation: &NewValidationResult,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let (job_id, test_result_id) = inner
            .turn_index
            .get(&turn_result_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown turn result id: {}", turn_result_id))?;
        let job = inner.jobs.get_mut(&job_id).expect("indexed job exists");
        let test = find_test(job, test_result_id).expect("indexed test exists");
        let turn_idx = test
            .turn_ids
            .iter()
            .position(|id| *id == turn_result_id)
            .expect("indexed turn exists");
        let turn = &mut test.result.turn_results[turn_idx];

        turn.validation_results.push(ValidationResult {
            validation_id: validation.validation_id.clone(),
            validation_type: validation.validation_type.clone(),
            is_passed: validation.is_passed,
            score: validation.score,
            details: validation.details.clone(),
        });
        // Derived counts follow the child records, recomputed on each write.
        turn.validations_total = turn.validation_results.len() as u32;
        turn.validations_passed =
            turn.validation_results.iter().filter(|v| v.is_passed).count() as u32;
        turn.validations_failed = turn.validations_total - turn.validations_passed;
        Ok(())
    }

    fn get_batch_status(&self, job_id: &str) -> anyhow::Result<Option<BatchStatus>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(job_id).map(|job| BatchStatus {
            job_id: job_id.to_string(),
            batch_id: job.batch_id.clone(),
            status: job.status,
            started_at: job.started_at.clone(),
            completed_at: job.completed_at.clone(),
            progress: job.progress,
            total_tests: job.total_tests,
            completed_tests: job.completed_tests,
            failed_tests: job.failed_tests,
            current_test_id: job.current_test_id.clone(),
            current_turn: job.current_turn,
            error: job.error.clone(),
        }))
    }

    fn get_batch_results(
        &self,
        job_id: &str,
        include_scraped_content: bool,
    ) -> anyhow::Result<Option<BatchResults>> {
        let inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get(job_id) else {
            return Ok(None);
        };

        let mut total_validations = 0u32;
        let mut passed_validations = 0u32;
        let mut all_times: Vec<u64> = Vec::new();
        let mut test_results = Vec::new();

        for test in &job.tests {
            let mut result = test.result.clone();
            result.turn_results.sort_by_key(|t| t.order);
            for turn in &mut result.turn_results {
                if !include_scraped_content {
                    turn.scraped_content = None;
                }
                all_times.push(turn.response_time_ms);
            }
            total_validations += result.total_validations;
            passed_validations += result.passed_validations;
            test_results.push(result);
        }

        Ok(Some(BatchResults {
            job_id: job_id.to_string(),
            batch_id: job.batch_id.clone(),
            status: job.status,
            started_at: job.started_at.clone(),
            completed_at: job.completed_at.clone(),
            total_tests: job.total_tests,
            completed_tests: job.completed_tests,
            failed_tests: job.failed_tests,
            total_validations,
            passed_validations,
            failed_validations: total_validations - passed_validations,
            pass_rate: model::pass_rate_pct(passed_validations, total_validations),
            avg_response_time: model::mean_response_time(&all_times),
            test_results,
            error: job.error.clone(),
        }))
    }
}
