use colloquy_core::model::{JobStatus, TestStatus};
use colloquy_core::storage::{
    JobUpdate, MemoryStore, NewTurnResult, NewValidationResult, ResultStore, SqliteStore,
    TestUpdate,
};
use tempfile::tempdir;

fn turn(turn_id: &str, order: u32, response_time_ms: u64) -> NewTurnResult {
    NewTurnResult {
        turn_id: turn_id.into(),
        order,
        user_input: format!("input {turn_id}"),
        agent_response: format!("response {turn_id}"),
        scraped_content: Some("scraped page text".into()),
        response_time_ms,
    }
}

fn validation(validation_id: &str, is_passed: bool) -> NewValidationResult {
    NewValidationResult {
        validation_id: validation_id.into(),
        validation_type: "contains".into(),
        is_passed,
        score: Some(if is_passed { 1.0 } else { 0.0 }),
        details: Some(serde_json::json!({ "message": "checked" })),
    }
}

fn exercise_lifecycle(store: &dyn ResultStore) {
    store.create_job("job-1", "batch-1", 2).unwrap();

    let status = store.get_batch_status("job-1").unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Queued);
    assert_eq!(status.progress, 0.0);
    assert!(status.started_at.is_some());
    assert!(status.completed_at.is_none());

    // First test: two turns recorded out of order, validations split 1/1.
    let t1 = store.create_test_result("job-1", "t1").unwrap();
    store.create_turn_result(t1, &turn("turn-b", 2, 200)).unwrap();
    let turn_a = store.create_turn_result(t1, &turn("turn-a", 1, 100)).unwrap();
    store.create_validation_result(turn_a, &validation("v1", true)).unwrap();
    store.create_validation_result(turn_a, &validation("v2", false)).unwrap();
    store
        .update_test_result(
            t1,
            TestStatus::Completed,
            TestUpdate {
                total_validations: Some(2),
                passed_validations: Some(1),
                failed_validations: Some(1),
                avg_response_time: Some(150.0),
                error: None,
            },
        )
        .unwrap();

    // Second test: one slow turn, no validations.
    let t2 = store.create_test_result("job-1", "t2").unwrap();
    store.create_turn_result(t2, &turn("turn-c", 1, 300)).unwrap();
    store
        .update_test_result(
            t2,
            TestStatus::Completed,
            TestUpdate {
                total_validations: Some(0),
                passed_validations: Some(0),
                failed_validations: Some(0),
                avg_response_time: Some(300.0),
                error: None,
            },
        )
        .unwrap();

    store
        .update_job_status(
            "job-1",
            JobStatus::Running,
            JobUpdate {
                completed_tests: Some(2),
                failed_tests: Some(0),
                current_test_id: Some("t2".into()),
                current_turn: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

    let status = store.get_batch_status("job-1").unwrap().unwrap();
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.current_test_id.as_deref(), Some("t2"));

    store
        .update_job_status(
            "job-1",
            JobStatus::Completed,
            JobUpdate {
                clear_current: true,
                ..Default::default()
            },
        )
        .unwrap();

    let status = store.get_batch_status("job-1").unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert!(status.completed_at.is_some());
    assert!(status.current_test_id.is_none());
    assert!(status.current_turn.is_none());

    let results = store.get_batch_results("job-1", false).unwrap().unwrap();
    assert_eq!(results.total_tests, 2);
    assert_eq!(results.completed_tests, 2);
    assert_eq!(results.total_validations, 2);
    assert_eq!(results.passed_validations, 1);
    assert_eq!(results.pass_rate, 50.0);
    // Mean over the union of all turns, not a mean of per-test means.
    assert_eq!(results.avg_response_time, 200.0);

    let first = &results.test_results[0];
    assert_eq!(first.pass_rate, 50.0);
    assert_eq!(first.avg_response_time, 150.0);
    assert!(first.completed_at.is_some());
    // Turns come back ordered by their caller-declared order.
    let orders: Vec<u32> = first.turn_results.iter().map(|t| t.order).collect();
    assert_eq!(orders, vec![1, 2]);

    // The first turn's validation counts were recomputed on each insert.
    let turn_one = &first.turn_results[0];
    assert_eq!(turn_one.validations_total, 2);
    assert_eq!(turn_one.validations_passed, 1);
    assert_eq!(turn_one.validations_failed, 1);
    assert_eq!(turn_one.validation_results.len(), 2);
    assert!(!turn_one.validation_results[1].is_passed);

    // Scraped content is blanked unless requested.
    assert!(turn_one.scraped_content.is_none());
    let with_content = store.get_batch_results("job-1", true).unwrap().unwrap();
    assert_eq!(
        with_content.test_results[0].turn_results[0]
            .scraped_content
            .as_deref(),
        Some("scraped page text")
    );

    assert!(store.get_batch_status("missing").unwrap().is_none());
    assert!(store.get_batch_results("missing", false).unwrap().is_none());
}

fn exercise_failure_accounting(store: &dyn ResultStore) {
    store.create_job("job-2", "batch-2", 3).unwrap();

    let t1 = store.create_test_result("job-2", "t1").unwrap();
    store
        .update_test_result(
            t1,
            TestStatus::Failed,
            TestUpdate {
                error: Some("send exhausted retries".into()),
                ..Default::default()
            },
        )
        .unwrap();

    store
        .update_job_status(
            "job-2",
            JobStatus::Running,
            JobUpdate {
                completed_tests: Some(0),
                failed_tests: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

    let status = store.get_batch_status("job-2").unwrap().unwrap();
    assert!((status.progress - 100.0 / 3.0).abs() < 1e-9);

    let results = store.get_batch_results("job-2", false).unwrap().unwrap();
    let failed = &results.test_results[0];
    assert_eq!(failed.status, TestStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("send exhausted retries"));
    assert_eq!(failed.pass_rate, 0.0);
    assert!(failed.completed_at.is_some());
}

#[test]
fn memory_store_lifecycle() {
    let store = MemoryStore::new();
    exercise_lifecycle(&store);
    exercise_failure_accounting(&store);
}

#[test]
fn sqlite_store_lifecycle() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("results.db")).unwrap();
    exercise_lifecycle(&store);
    exercise_failure_accounting(&store);
}

#[test]
fn sqlite_in_memory_lifecycle() {
    let store = SqliteStore::memory().unwrap();
    exercise_lifecycle(&store);
}
