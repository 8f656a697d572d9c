use crate::agent::AgentClient;
use crate::model::{self, JobStatus, TestSpec, TestStatus, TurnSpec};
use crate::retry::{retry, Attempted, RetryPolicy};
use crate::scraper::{extract_urls, Scraper};
use crate::storage::{JobUpdate, NewTurnResult, NewValidationResult, ResultStore, TestUpdate};
use crate::validation::{ValidatorSet, Verdict};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

// Validation families that consume scraped page content as extra context.
const CONTEXT_SENSITIVE_TYPES: [&str; 2] = ["contextual_relevancy", "faithfulness"];

/// Per-test running tallies, folded into the stored aggregates as turns
/// complete.
#[derive(Debug, Default)]
struct TestTally {
    total_validations: u32,
    passed_validations: u32,
    response_times: Vec<u64>,
}

/// Drives one job end to end: sequences tests and turns, calls the agent,
/// scrapes referenced content, dispatches validations, and persists
/// incremental state. One test failing never aborts the batch; only errors
/// outside any test's scope fail the job.
pub struct Engine {
    agent: Arc<dyn AgentClient>,
    scraper: Scraper,
    validators: ValidatorSet,
    store: Arc<dyn ResultStore>,
    retry: RetryPolicy,
}

impl Engine {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        scraper: Scraper,
        validators: ValidatorSet,
        store: Arc<dyn ResultStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            agent,
            scraper,
            validators,
            store,
            retry,
        }
    }

    pub async fn execute_batch(
        &self,
        job_id: &str,
        batch_id: &str,
        tests: &[TestSpec],
    ) -> anyhow::Result<()> {
        info!(job_id = %job_id, batch_id = %batch_id, tests = tests.len(), "starting batch");
        self.store
            .update_job_status(job_id, JobStatus::Running, JobUpdate::default())?;

        let mut completed_tests = 0u32;
        let mut failed_tests = 0u32;

        for test in tests {
            self.store.update_job_status(
                job_id,
                JobStatus::Running,
                JobUpdate {
                    current_test_id: Some(test.test_id.clone()),
                    current_turn: Some(0),
                    ..Default::default()
                },
            )?;

            let test_result_id = self.store.create_test_result(job_id, &test.test_id)?;

            match self.run_test(job_id, test, test_result_id).await {
                Ok(tally) => {
                    self.store.update_test_result(
                        test_result_id,
                        TestStatus::Completed,
                        TestUpdate {
                            total_validations: Some(tally.total_validations),
                            passed_validations: Some(tally.passed_validations),
                            failed_validations: Some(
                                tally.total_validations - tally.passed_validations,
                            ),
                            avg_response_time: Some(model::mean_response_time(
                                &tally.response_times,
                            )),
                            error: None,
                        },
                    )?;
                    completed_tests += 1;
                }
                Err(e) => {
                    warn!(job_id = %job_id, test_id = %test.test_id, error = %e, "test failed");
                    self.store.update_test_result(
                        test_result_id,
                        TestStatus::Failed,
                        TestUpdate {
                            error: Some(format!("{e:#}")),
                            ..Default::default()
                        },
                    )?;
                    failed_tests += 1;
                }
            }

            self.store.update_job_status(
                job_id,
                JobStatus::Running,
                JobUpdate {
                    completed_tests: Some(completed_tests),
                    failed_tests: Some(failed_tests),
                    ..Default::default()
                },
            )?;
        }

        self.store.update_job_status(
            job_id,
            JobStatus::Completed,
            JobUpdate {
                clear_current: true,
                ..Default::default()
            },
        )?;
        info!(
            job_id = %job_id,
            completed = completed_tests,
            failed = failed_tests,
            "batch finished"
        );
        Ok(())
    }

    /// Runs one test's full turn sequence. The agent session is closed on
    /// both success and failure paths, best-effort.
    async fn run_test(
        &self,
        job_id: &str,
        test: &TestSpec,
        test_result_id: i64,
    ) -> anyhow::Result<TestTally> {
        // Configuration errors are not retryable; check before entering the
        // transient-retry path.
        test.credentials.validate()?;

        let session_id = retry(&self.retry, || {
            self.agent.start_session(&test.test_id, &test.credentials)
        })
        .await
        .into_result()?;

        let mut tally = TestTally::default();
        let outcome = self
            .run_turns(job_id, test, test_result_id, &session_id, &mut tally)
            .await;

        self.agent.end_session(&session_id).await;

        outcome.map(|_| tally)
    }

    async fn run_turns(
        &self,
        job_id: &str,
        test: &TestSpec,
        test_result_id: i64,
        session_id: &str,
        tally: &mut TestTally,
    ) -> anyhow::Result<()> {
        for turn in &test.turns {
            self.store.update_job_status(
                job_id,
                JobStatus::Running,
                JobUpdate {
                    current_turn: Some(turn.order),
                    ..Default::default()
                },
            )?;

            let start = Instant::now();
            let agent_response = retry(&self.retry, || {
                self.agent.send_message(session_id, &turn.user_input)
            })
            .await
            .into_result()?;
            let response_time_ms = start.elapsed().as_millis() as u64;

            let scraped_content = self
                .scrape_referenced_content(&agent_response, test.config.html_selector.as_deref())
                .await;

            let turn_result_id = self.store.create_turn_result(
                test_result_id,
                &NewTurnResult {
                    turn_id: turn.turn_id.clone(),
                    order: turn.order,
                    user_input: turn.user_input.clone(),
                    agent_response: agent_response.clone(),
                    scraped_content: scraped_content.clone(),
                    response_time_ms,
                },
            )?;

            self.run_validations(
                turn,
                turn_result_id,
                &agent_response,
                scraped_content.as_deref(),
                tally,
            )
            .await?;

            tally.response_times.push(response_time_ms);
        }
        Ok(())
    }

    /// Extracts URLs from the response and scrapes them. A scrape failure
    /// is logged and treated as no content; it never fails the turn.
    async fn scrape_referenced_content(
        &self,
        agent_response: &str,
        selector: Option<&str>,
    ) -> Option<String> {
        let urls = extract_urls(agent_response);
        if urls.is_empty() {
            return None;
        }
        let content = self.scraper.scrape(&urls, selector).await;
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    async fn run_validations(
        &self,
        turn: &TurnSpec,
        turn_result_id: i64,
        agent_response: &str,
        scraped_content: Option<&str>,
        tally: &mut TestTally,
    ) -> anyhow::Result<()> {
        for validation in &turn.validations {
            let params = merge_scraped_context(
                &validation.validation_type,
                validation.validation_parameters.clone(),
                scraped_content,
            );

            // Validation flakiness degrades to a synthetic failing result
            // instead of escalating, so it never fails a test outright.
            let verdict = match retry(&self.retry, || {
                self.validators
                    .dispatch(&validation.validation_type, agent_response, &params)
            })
            .await
            {
                Attempted::Ok { value, .. } => value,
                Attempted::Exhausted { error, attempts } => {
                    warn!(
                        validation_id = %validation.validation_id,
                        validation_type = %validation.validation_type,
                        attempts,
                        error = %error,
                        "validation exhausted retries, recording failure"
                    );
                    Verdict::fail(
                        &validation.validation_type,
                        0.0,
                        serde_json::json!({
                            "message": format!("validation failed after {} attempts", attempts),
                            "error": format!("{error:#}"),
                        }),
                    )
                }
            };

            if verdict.passed {
                tally.passed_validations += 1;
            }
            tally.total_validations += 1;

            self.store.create_validation_result(
                turn_result_id,
                &NewValidationResult {
                    validation_id: validation.validation_id.clone(),
                    validation_type: validation.validation_type.clone(),
                    is_passed: verdict.passed,
                    score: verdict.score,
                    details: Some(serde_json::to_value(&verdict)?),
                },
            )?;
        }
        Ok(())
    }
}

/// For context-sensitive validation types, appends scraped content to an
/// existing `context` parameter, or sets it if absent.
fn merge_scraped_context(
    validation_type: &str,
    params: serde_json::Value,
    scraped_content: Option<&str>,
) -> serde_json::Value {
    let Some(scraped) = scraped_content else {
        return params;
    };
    if !CONTEXT_SENSITIVE_TYPES.contains(&validation_type) {
        return params;
    }

    let mut params = match params {
        serde_json::Value::Object(map) => serde_json::Value::Object(map),
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    };
    if let Some(map) = params.as_object_mut() {
        let merged = match map.get("context").and_then(|c| c.as_str()) {
            Some(existing) => format!("{existing}\n\n{scraped}"),
            None => scraped.to_string(),
        };
        map.insert("context".to_string(), serde_json::Value::String(merged));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_merge_only_touches_context_sensitive_types() {
        let params = serde_json::json!({ "threshold": 0.8 });
        let merged = merge_scraped_context("faithfulness", params.clone(), Some("page text"));
        assert_eq!(merged["context"], "page text");
        assert_eq!(merged["threshold"], 0.8);

        let untouched = merge_scraped_context("contains", params.clone(), Some("page text"));
        assert!(untouched.get("context").is_none());

        let no_content = merge_scraped_context("faithfulness", params, None);
        assert!(no_content.get("context").is_none());
    }

    #[test]
    fn context_merge_appends_to_existing_context() {
        let params = serde_json::json!({ "context": "prior" });
        let merged = merge_scraped_context("contextual_relevancy", params, Some("scraped"));
        assert_eq!(merged["context"], "prior\n\nscraped");
    }

    #[test]
    fn context_merge_handles_missing_params_object() {
        let merged =
            merge_scraped_context("faithfulness", serde_json::Value::Null, Some("scraped"));
        assert_eq!(merged["context"], "scraped");
    }
}
