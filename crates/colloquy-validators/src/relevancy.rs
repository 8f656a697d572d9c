use async_trait::async_trait;
use colloquy_core::validation::{Validator, Verdict};

const DEFAULT_THRESHOLD: f64 = 0.7;

// Scores within EPSILON of the threshold are treated as passing, guarding
// against floating point rounding at the boundary.
const EPSILON: f64 = 1e-6;

/// Scored verdict from a lexical comparison of the response against the
/// reference text found under one of `reference_keys`. The score is a
/// Sorensen-Dice bigram similarity in [0, 1], compared to the
/// caller-supplied threshold.
fn score_against(
    name: &'static str,
    response: &str,
    params: &serde_json::Value,
    reference_keys: &[&str],
) -> Verdict {
    let threshold = params
        .get("threshold")
        .and_then(|t| t.as_f64())
        .unwrap_or(DEFAULT_THRESHOLD);

    let reference = reference_keys
        .iter()
        .find_map(|key| params.get(*key).and_then(|v| v.as_str()));

    let Some(reference) = reference else {
        return Verdict::fail(
            name,
            0.0,
            serde_json::json!({
                "message": format!(
                    "no reference text to score against (expected one of: {})",
                    reference_keys.join(", ")
                ),
                "threshold": threshold,
            }),
        );
    };

    let score = strsim::sorensen_dice(&response.to_lowercase(), &reference.to_lowercase());
    let passed = score + EPSILON >= threshold;
    let details = serde_json::json!({
        "message": format!("{name} scored {score:.2} against threshold {threshold:.2}"),
        "score": score,
        "threshold": threshold,
    });
    if passed {
        Verdict::pass(name, score, details)
    } else {
        Verdict::fail(name, score, details)
    }
}

pub struct AnswerRelevancy;

#[async_trait]
impl Validator for AnswerRelevancy {
    fn name(&self) -> &'static str {
        "answer_relevancy"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        Ok(score_against(
            "answer_relevancy",
            response,
            params,
            &["question", "reference"],
        ))
    }
}

pub struct ContextualRelevancy;

#[async_trait]
impl Validator for ContextualRelevancy {
    fn name(&self) -> &'static str {
        "contextual_relevancy"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        Ok(score_against(
            "contextual_relevancy",
            response,
            params,
            &["context"],
        ))
    }
}

pub struct Faithfulness;

#[async_trait]
impl Validator for Faithfulness {
    fn name(&self) -> &'static str {
        "faithfulness"
    }

    async fn validate(
        &self,
        response: &str,
        params: &serde_json::Value,
    ) -> anyhow::Result<Verdict> {
        Ok(score_against("faithfulness", response, params, &["context"]))
    }
}
