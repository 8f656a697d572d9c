use std::sync::Arc;

use colloquy_core::validation::{Validator, ValidatorSet};

mod contains;
mod regex_match;
mod relevancy;

pub use contains::{ContainsValidator, NotContainsValidator};
pub use regex_match::RegexValidator;
pub use relevancy::{AnswerRelevancy, ContextualRelevancy, Faithfulness};

pub fn default_validators() -> Vec<Arc<dyn Validator>> {
    vec![
        Arc::new(contains::ContainsValidator),
        Arc::new(contains::NotContainsValidator),
        Arc::new(regex_match::RegexValidator),
        Arc::new(relevancy::AnswerRelevancy),
        Arc::new(relevancy::ContextualRelevancy),
        Arc::new(relevancy::Faithfulness),
    ]
}

pub fn default_validator_set() -> ValidatorSet {
    ValidatorSet::new(default_validators())
}
