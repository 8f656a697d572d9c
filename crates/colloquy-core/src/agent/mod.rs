use crate::model::AgentCredentials;
use async_trait::async_trait;

pub mod fake;
pub mod http;

pub use fake::FakeAgentClient;
pub use http::HttpAgentClient;

/// Conversational session lifecycle against a remote agent API.
///
/// `end_session` is best-effort by contract: failures are logged by the
/// implementation and never raised, and the local session record is removed
/// regardless of the remote outcome.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn start_session(
        &self,
        test_id: &str,
        credentials: &AgentCredentials,
    ) -> anyhow::Result<String>;

    async fn send_message(&self, session_id: &str, message: &str) -> anyhow::Result<String>;

    async fn end_session(&self, session_id: &str);
}

/// Live session state, keyed by the remote session id. Ephemeral, never
/// persisted; owned by one client instance.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub auth_token: String,
    pub org_domain: String,
    pub agent_id: String,
}
