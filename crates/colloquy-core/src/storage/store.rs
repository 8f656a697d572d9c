use super::{JobUpdate, NewTurnResult, NewValidationResult, ResultStore, TestUpdate};
use crate::model::{
    self, BatchResults, BatchStatus, JobStatus, TestResult, TestStatus, TurnResult,
    ValidationResult,
};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable result store on SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }
}

impl ResultStore for SqliteStore {
    fn create_job(&self, job_id: &str, batch_id: &str, total_tests: u32) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs(id, batch_id, status, started_at, total_tests)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                batch_id,
                JobStatus::Queued.as_str(),
                model::now_rfc3339(),
                total_tests as i64
            ],
        )
        .context("insert job")?;
        Ok(())
    }

    fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        update: JobUpdate,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(i64, i64, i64)> = tx
            .query_row(
                "SELECT total_tests, completed_tests, failed_tests FROM jobs WHERE id = ?1",
                params![job_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((total, stored_completed, stored_failed)) = row else {
            anyhow::bail!("unknown job id: {}", job_id);
        };

        let completed = update
            .completed_tests
            .map(|v| v as i64)
            .unwrap_or(stored_completed);
        let failed = update
            .failed_tests
            .map(|v| v as i64)
            .unwrap_or(stored_failed);
        let progress = model::progress_pct(completed as u32, failed as u32, total as u32);

        tx.execute(
            "UPDATE jobs SET status = ?1, completed_tests = ?2, failed_tests = ?3, progress = ?4
             WHERE id = ?5",
            params![status.as_str(), completed, failed, progress, job_id],
        )?;

        if let Some(test_id) = &update.current_test_id {
            tx.execute(
                "UPDATE jobs SET current_test_id = ?1 WHERE id = ?2",
                params![test_id, job_id],
            )?;
        }
        if let Some(turn) = update.current_turn {
            tx.execute(
                "UPDATE jobs SET current_turn = ?1 WHERE id = ?2",
                params![turn as i64, job_id],
            )?;
        }
        if update.clear_current {
            tx.execute(
                "UPDATE jobs SET current_test_id = NULL, current_turn = NULL WHERE id = ?1",
                params![job_id],
            )?;
        }
        if let Some(error) = &update.error {
            tx.execute(
                "UPDATE jobs SET error = ?1 WHERE id = ?2",
                params![error, job_id],
            )?;
        }
        if status.is_terminal() {
            tx.execute(
                "UPDATE jobs SET completed_at = ?1 WHERE id = ?2",
                params![model::now_rfc3339(), job_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_test_result(&self, job_id: &str, test_id: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO test_results(job_id, test_id, status, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                test_id,
                TestStatus::Running.as_str(),
                model::now_rfc3339()
            ],
        )
        .context("insert test result")?;
        Ok(conn.last_insert_rowid())
    }

    fn update_test_result(
        &self,
        test_result_id: i64,
        status: TestStatus,
        update: TestUpdate,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row: Option<(i64, i64)> = tx
            .query_row(
                "SELECT total_validations, passed_validations FROM test_results WHERE id = ?1",
                params![test_result_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((stored_total, stored_passed)) = row else {
            anyhow::bail!("unknown test result id: {}", test_result_id);
        };

        let total = update
            .total_validations
            .map(|v| v as i64)
            .unwrap_or(stored_total);
        let passed = update
            .passed_validations
            .map(|v| v as i64)
            .unwrap_or(stored_passed);
        let failed = update
            .failed_validations
            .map(|v| v as i64)
            .unwrap_or(total - passed);
        let pass_rate = model::pass_rate_pct(passed as u32, total as u32);

        tx.execute(
            "UPDATE test_results
             SET status = ?1, total_validations = ?2, passed_validations = ?3,
                 failed_validations = ?4, pass_rate = ?5
             WHERE id = ?6",
            params![status.as_str(), total, passed, failed, pass_rate, test_result_id],
        )?;

        if let Some(avg) = update.avg_response_time {
            tx.execute(
                "UPDATE test_results SET avg_response_time = ?1 WHERE id = ?2",
                params![avg, test_result_id],
            )?;
        }
        if let Some(error) = &update.error {
            tx.execute(
                "UPDATE test_results SET error = ?1 WHERE id = ?2",
                params![error, test_result_id],
            )?;
        }
        if status.is_terminal() {
            tx.execute(
                "UPDATE test_results SET completed_at = ?1 WHERE id = ?2",
                params![model::now_rfc3339(), test_result_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_turn_result(
        &self,
        test_result_id: i64,
        turn: &NewTurnResult,
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO turn_results(test_result_id, turn_id, turn_order, user_input,
                                      agent_response, scraped_content, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                test_result_id,
                turn.turn_id,
                turn.order as i64,
                turn.user_input,
                turn.agent_response,
                turn.scraped_content,
                turn.response_time_ms as i64
            ],
        )
        .context("insert turn result")?;
        Ok(conn.last_insert_rowid())
    }

    fn create_validation_result(
        &self,
        turn_result_id: i64,
        validation: &NewValidationResult,
    ) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let details_json = validation
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        tx.execute(
            "INSERT INTO validation_results(turn_result_id, validation_id, validation_type,
                                            is_passed, score, details_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                turn_result_id,
                validation.validation_id,
                validation.validation_type,
                validation.is_passed,
                validation.score,
                details_json
            ],
        )
        .context("insert validation result")?;

        // Recompute the parent turn's counts in the same transaction.
        tx.execute(
            "UPDATE turn_results SET
               validations_total = (SELECT COUNT(*) FROM validation_results WHERE turn_result_id = ?1),
               validations_passed = (SELECT COUNT(*) FROM validation_results WHERE turn_result_id = ?1 AND is_passed = 1),
               validations_failed = (SELECT COUNT(*) FROM validation_results WHERE turn_result_id = ?1 AND is_passed = 0)
             WHERE id = ?1",
            params![turn_result_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_batch_status(&self, job_id: &str) -> anyhow::Result<Option<BatchStatus>> {
        let conn = self.conn.lock().unwrap();
        let status = conn
            .query_row(
                "SELECT id, batch_id, status, started_at, completed_at, progress, total_tests,
                        completed_tests, failed_tests, current_test_id, current_turn, error
                 FROM jobs WHERE id = ?1",
                params![job_id],
                |r| {
                    Ok(BatchStatus {
                        job_id: r.get(0)?,
                        batch_id: r.get(1)?,
                        status: JobStatus::parse(&r.get::<_, String>(2)?),
                        started_at: r.get(3)?,
                        completed_at: r.get(4)?,
                        progress: r.get(5)?,
                        total_tests: r.get::<_, i64>(6)? as u32,
                        completed_tests: r.get::<_, i64>(7)? as u32,
                        failed_tests: r.get::<_, i64>(8)? as u32,
                        current_test_id: r.get(9)?,
                        current_turn: r.get::<_, Option<i64>>(10)?.map(|v| v as u32),
                        error: r.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }

    fn get_batch_results(
        &self,
        job_id: &str,
        include_scraped_content: bool,
    ) -> anyhow::Result<Option<BatchResults>> {
        let conn = self.conn.lock().unwrap();

        let job: Option<(String, String, Option<String>, Option<String>, i64, i64, i64, Option<String>)> =
            conn.query_row(
                "SELECT batch_id, status, started_at, completed_at, total_tests,
                        completed_tests, failed_tests, error
                 FROM jobs WHERE id = ?1",
                params![job_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                        r.get(7)?,
                    ))
                },
            )
            .optional()?;
        let Some((batch_id, status, started_at, completed_at, total, completed, failed, error)) =
            job
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, test_id, status, started_at, completed_at, error, total_validations,
                    passed_validations, failed_validations, pass_rate, avg_response_time
             FROM test_results WHERE job_id = ?1 ORDER BY id ASC",
        )?;
        let test_rows: Vec<(i64, TestResult)> = stmt
            .query_map(params![job_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    TestResult {
                        test_id: r.get(1)?,
                        status: TestStatus::parse(&r.get::<_, String>(2)?),
                        started_at: r.get(3)?,
                        completed_at: r.get(4)?,
                        error: r.get(5)?,
                        total_validations: r.get::<_, i64>(6)? as u32,
                        passed_validations: r.get::<_, i64>(7)? as u32,
                        failed_validations: r.get::<_, i64>(8)? as u32,
                        pass_rate: r.get(9)?,
                        avg_response_time: r.get(10)?,
                        turn_results: Vec::new(),
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut turn_stmt = conn.prepare(
            "SELECT id, turn_id, turn_order, user_input, agent_response, scraped_content,
                    response_time_ms, validations_total, validations_passed, validations_failed
             FROM turn_results WHERE test_result_id = ?1 ORDER BY turn_order ASC",
        )?;
        let mut validation_stmt = conn.prepare(
            "SELECT validation_id, validation_type, is_passed, score, details_json
             FROM validation_results WHERE turn_result_id = ?1 ORDER BY id ASC",
        )?;

        let mut test_results = Vec::new();
        let mut total_validations = 0u32;
        let mut passed_validations = 0u32;
        let mut all_times: Vec<u64> = Vec::new();

        for (test_result_id, mut test) in test_rows {
            let turns: Vec<(i64, TurnResult)> = turn_stmt
                .query_map(params![test_result_id], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        TurnResult {
                            turn_id: r.get(1)?,
                            order: r.get::<_, i64>(2)? as u32,
                            user_input: r.get(3)?,
                            agent_response: r.get(4)?,
                            scraped_content: r.get(5)?,
                            response_time_ms: r.get::<_, i64>(6)? as u64,
                            validations_total: r.get::<_, i64>(7)? as u32,
                            validations_passed: r.get::<_, i64>(8)? as u32,
                            validations_failed: r.get::<_, i64>(9)? as u32,
                            validation_results: Vec::new(),
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            for (turn_result_id, mut turn) in turns {
                let validations: Vec<ValidationResult> = validation_stmt
                    .query_map(params![turn_result_id], |r| {
                        let details_json: Option<String> = r.get(4)?;
                        Ok(ValidationResult {
                            validation_id: r.get(0)?,
                            validation_type: r.get(1)?,
                            is_passed: r.get(2)?,
                            score: r.get(3)?,
                            details: details_json
                                .as_deref()
                                .and_then(|s| serde_json::from_str(s).ok()),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                turn.validation_results = validations;
                if !include_scraped_content {
                    turn.scraped_content = None;
                }
                all_times.push(turn.response_time_ms);
                test.turn_results.push(turn);
            }

            total_validations += test.total_validations;
            passed_validations += test.passed_validations;
            test_results.push(test);
        }

        Ok(Some(BatchResults {
            job_id: job_id.to_string(),
            batch_id,
            status: JobStatus::parse(&status),
            started_at,
            completed_at,
            total_tests: total as u32,
            completed_tests: completed as u32,
            failed_tests: failed as u32,
            total_validations,
            passed_validations,
            failed_validations: total_validations - passed_validations,
            pass_rate: model::pass_rate_pct(passed_validations, total_validations),
            avg_response_time: model::mean_response_time(&all_times),
            test_results,
            error,
        }))
    }
}
