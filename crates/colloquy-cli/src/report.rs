use colloquy_core::model::{BatchResults, TestStatus};

pub fn print_summary(results: &BatchResults) {
    eprintln!(
        "\nBatch {} ({} tests)...",
        results.batch_id, results.total_tests
    );

    for test in &results.test_results {
        let avg = format!("({:.0}ms avg)", test.avg_response_time);
        match test.status {
            TestStatus::Completed => {
                eprintln!(
                    "✅ {:<20} {}/{} validations  {}",
                    test.test_id, test.passed_validations, test.total_validations, avg
                );
            }
            TestStatus::Failed => {
                eprintln!(
                    "❌ {:<20} {}",
                    test.test_id,
                    test.error.as_deref().unwrap_or("failed")
                );
            }
            TestStatus::Running => {
                eprintln!("⏳ {:<20} still running", test.test_id);
            }
        }
        for turn in &test.turn_results {
            if turn.validations_failed > 0 {
                eprintln!(
                    "    turn {}: {}/{} validations passed",
                    turn.order, turn.validations_passed, turn.validations_total
                );
            }
        }
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Summary: {} completed, {} failed, {} validations passed of {} ({:.1}%), avg response {:.0}ms",
        results.completed_tests,
        results.failed_tests,
        results.passed_validations,
        results.total_validations,
        results.pass_rate,
        results.avg_response_time
    );
    if let Some(error) = &results.error {
        eprintln!("Job error: {error}");
    }
}
