use super::AgentClient;
use crate::model::AgentCredentials;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Deterministic in-process agent for tests and offline runs. Replies with
/// a scripted response per input, or echoes the input back. Send failures
/// can be injected per input (permanent) or for the first N sends
/// (transient, to exercise retry recovery).
pub struct FakeAgentClient {
    responses: Mutex<HashMap<String, String>>,
    fail_inputs: Mutex<HashSet<String>>,
    fail_first_sends: AtomicU32,
    sessions: Mutex<HashSet<String>>,
    counter: AtomicU64,
}

impl Default for FakeAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgentClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            fail_inputs: Mutex::new(HashSet::new()),
            fail_first_sends: AtomicU32::new(0),
            sessions: Mutex::new(HashSet::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// Scripts a reply for an exact user input.
    pub fn respond_with(self, input: &str, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(input.to_string(), response.to_string());
        self
    }

    /// Every send of this input fails, exhausting the caller's retries.
    pub fn fail_input(self, input: &str) -> Self {
        self.fail_inputs.lock().unwrap().insert(input.to_string());
        self
    }

    /// The next `n` sends fail, whatever the input.
    pub fn fail_first_sends(self, n: u32) -> Self {
        self.fail_first_sends.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl AgentClient for FakeAgentClient {
    async fn start_session(
        &self,
        test_id: &str,
        credentials: &AgentCredentials,
    ) -> anyhow::Result<String> {
        credentials.validate()?;
        let session_id = format!(
            "fake-session-{}-{}",
            test_id,
            self.counter.fetch_add(1, Ordering::Relaxed)
        );
        self.sessions.lock().unwrap().insert(session_id.clone());
        Ok(session_id)
    }

    async fn send_message(&self, session_id: &str, message: &str) -> anyhow::Result<String> {
        if !self.sessions.lock().unwrap().contains(session_id) {
            anyhow::bail!("invalid or expired session id: {}", session_id);
        }
        if self.fail_inputs.lock().unwrap().contains(message) {
            anyhow::bail!("injected send failure for input: {}", message);
        }
        let remaining = self.fail_first_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_sends.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("injected transient send failure");
        }
        let scripted = self.responses.lock().unwrap().get(message).cloned();
        Ok(scripted.unwrap_or_else(|| format!("echo: {message}")))
    }

    async fn end_session(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> AgentCredentials {
        AgentCredentials {
            org_domain: "https://example.my.salesforce.com".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            agent_id: "agent".into(),
        }
    }

    #[tokio::test]
    async fn scripted_and_echoed_replies() {
        let client = FakeAgentClient::new().respond_with("hi", "hello there");
        let session = client.start_session("t1", &creds()).await.unwrap();
        assert_eq!(client.send_message(&session, "hi").await.unwrap(), "hello there");
        assert_eq!(
            client.send_message(&session, "other").await.unwrap(),
            "echo: other"
        );
        client.end_session(&session).await;
        assert!(client.send_message(&session, "hi").await.is_err());
    }

    #[tokio::test]
    async fn transient_failures_clear_after_n_sends() {
        let client = FakeAgentClient::new().fail_first_sends(2);
        let session = client.start_session("t1", &creds()).await.unwrap();
        assert!(client.send_message(&session, "a").await.is_err());
        assert!(client.send_message(&session, "a").await.is_err());
        assert!(client.send_message(&session, "a").await.is_ok());
    }
}
