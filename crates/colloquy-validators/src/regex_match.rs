use async_trait::async_trait;
use colloquy_core::validation::{Validator, Verdict};
use regex::Regex;

pub struct RegexValidator;

#[async_trait]
impl Validator for RegexValidator {
    fn name(&self) -> &'static str {
        "regex"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        let pattern = params.get("pattern").and_then(|p| p.as_str()).unwrap_or("");
        let expected_match = params
            .get("expected_match")
            .and_then(|e| e.as_bool())
            .unwrap_or(true);

        // A malformed pattern is a failed verdict, never an error.
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                return Ok(Verdict::fail(
                    "regex",
                    0.0,
                    serde_json::json!({
                        "message": format!("Invalid regex pattern: {e}"),
                        "matches": [],
                    }),
                ));
            }
        };

        let matches: Vec<String> = re
            .find_iter(response)
            .map(|m| m.as_str().to_string())
            .collect();
        let has_match = !matches.is_empty();
        let passed = if expected_match { has_match } else { !has_match };

        let message = if has_match {
            "Pattern matched in response"
        } else {
            "Pattern not matched in response"
        };
        let details = serde_json::json!({ "message": message, "matches": matches });
        Ok(if passed {
            Verdict::pass("regex", 1.0, details)
        } else {
            Verdict::fail("regex", 0.0, details)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matching_pattern_passes_and_reports_matches() {
        let params = serde_json::json!({ "pattern": r"\d{3}-\d{4}" });
        let verdict = RegexValidator
            .validate("call 555-0199 today", &params)
            .await
            .unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.details["matches"][0], "555-0199");
    }

    #[tokio::test]
    async fn polarity_flag_inverts_the_verdict() {
        let params = serde_json::json!({ "pattern": "secret", "expected_match": false });
        let verdict = RegexValidator
            .validate("nothing to see", &params)
            .await
            .unwrap();
        assert!(verdict.passed);

        let verdict = RegexValidator
            .validate("the secret is out", &params)
            .await
            .unwrap();
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn malformed_pattern_fails_without_throwing() {
        let params = serde_json::json!({ "pattern": "([unclosed" });
        let verdict = RegexValidator.validate("anything", &params).await.unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.score, Some(0.0));
        assert!(verdict.details["message"]
            .as_str()
            .unwrap()
            .contains("Invalid regex pattern"));
    }
}
