use async_trait::async_trait;
use colloquy_core::validation::{Validator, Verdict};

fn text_params(params: &serde_json::Value) -> (String, bool) {
    let text = params
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string();
    let case_sensitive = params
        .get("case_sensitive")
        .and_then(|c| c.as_bool())
        .unwrap_or(true);
    (text, case_sensitive)
}

fn is_contained(response: &str, text: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        response.contains(text)
    } else {
        response.to_lowercase().contains(&text.to_lowercase())
    }
}

pub struct ContainsValidator;

#[async_trait]
impl Validator for ContainsValidator {
    fn name(&self) -> &'static str {
        "contains"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        let (text, case_sensitive) = text_params(params);
        let found = is_contained(response, &text, case_sensitive);
        let message = if found {
            "Expected text found in response"
        } else {
            "Expected text not found in response"
        };
        let details = serde_json::json!({ "message": message });
        Ok(if found {
            Verdict::pass("contains", 1.0, details)
        } else {
            Verdict::fail("contains", 0.0, details)
        })
    }
}

pub struct NotContainsValidator;

#[async_trait]
impl Validator for NotContainsValidator {
    fn name(&self) -> &'static str {
        "not_contains"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        let (text, case_sensitive) = text_params(params);
        let excluded = !is_contained(response, &text, case_sensitive);
        let message = if excluded {
            "Excluded text not found in response"
        } else {
            "Excluded text found in response"
        };
        let details = serde_json::json!({ "message": message });
        Ok(if excluded {
            Verdict::pass("not_contains", 1.0, details)
        } else {
            Verdict::fail("not_contains", 0.0, details)
        })
    }
}
