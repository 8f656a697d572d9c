use std::fmt;

/// Configuration problem surfaced to the caller before any execution starts.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Missing agent credential fields. Fails fast, never retried.
#[derive(Debug)]
pub struct CredentialsError {
    pub missing: Vec<&'static str>,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing required agent credentials: {}",
            self.missing.join(", ")
        )
    }
}

impl std::error::Error for CredentialsError {}
