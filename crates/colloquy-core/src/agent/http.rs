use super::{AgentClient, SessionInfo};
use crate::model::AgentCredentials;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Client for the remote agent API. Exchanges client credentials for a
/// bearer token, then drives the session endpoints. Sessions are cached in
/// an owned map keyed by the remote session id.
pub struct HttpAgentClient {
    http: reqwest::Client,
    sessions: Mutex<HashMap<String, SessionInfo>>,
    sequence: AtomicU64,
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAgentClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            sessions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    async fn fetch_token(&self, credentials: &AgentCredentials) -> anyhow::Result<String> {
        let token_url = format!("{}/services/oauth2/token", credentials.org_domain);
        let resp = self
            .http
            .post(&token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("failed to get auth token: {}", error_text);
        }

        let token_data: serde_json::Value = resp.json().await?;
        token_data
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("token response missing access_token"))
    }

    fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    fn extract_response_text(response_data: &serde_json::Value) -> String {
        let fragments: Vec<String> = response_data
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m.get("message"))
                    .filter_map(|m| m.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        if fragments.is_empty() {
            response_data.to_string()
        } else {
            fragments.join("\n")
        }
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn start_session(
        &self,
        test_id: &str,
        credentials: &AgentCredentials,
    ) -> anyhow::Result<String> {
        credentials.validate()?;

        let auth_token = self.fetch_token(credentials).await?;

        let api_url = format!(
            "{}/einstein/ai-agent/v1/agents/{}/sessions",
            credentials.org_domain, credentials.agent_id
        );
        let payload = json!({
            "externalSessionKey": format!("test_{}_{}", test_id, Uuid::new_v4()),
            "instanceConfig": { "endpoint": credentials.org_domain },
            "variables": [],
            "streamingCapabilities": { "chunkTypes": ["Text"] },
            "bypassUser": true,
        });

        let resp = self
            .http
            .post(&api_url)
            .bearer_auth(&auth_token)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("failed to start agent session: {}", error_text);
        }

        let response_data: serde_json::Value = resp.json().await?;
        let session_id = response_data
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("no session id returned from agent"))?;

        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            SessionInfo {
                auth_token,
                org_domain: credentials.org_domain.clone(),
                agent_id: credentials.agent_id.clone(),
            },
        );

        Ok(session_id)
    }

    async fn send_message(&self, session_id: &str, message: &str) -> anyhow::Result<String> {
        let info = self
            .session_info(session_id)
            .ok_or_else(|| anyhow::anyhow!("invalid or expired session id: {}", session_id))?;

        let api_url = format!(
            "{}/einstein/ai-agent/v1/sessions/{}/messages",
            info.org_domain, session_id
        );
        let payload = json!({
            "message": {
                "sequenceId": self.sequence.fetch_add(1, Ordering::Relaxed),
                "type": "Text",
                "text": message,
            },
            "variables": [],
        });

        let resp = self
            .http
            .post(&api_url)
            .bearer_auth(&info.auth_token)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("failed to send message: {}", error_text);
        }

        let response_data: serde_json::Value = resp.json().await?;
        Ok(Self::extract_response_text(&response_data))
    }

    async fn end_session(&self, session_id: &str) {
        let Some(info) = self.session_info(session_id) else {
            return; // already ended or never started
        };

        let api_url = format!(
            "{}/einstein/ai-agent/v1/sessions/{}",
            info.org_domain, session_id
        );
        let result = self
            .http
            .delete(&api_url)
            .bearer_auth(&info.auth_token)
            .header("x-session-end-reason", "TestCompleted")
            .send()
            .await;

        match result {
            Ok(resp) if !resp.status().is_success() => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(session_id = %session_id, %status, body = %body, "failed to end session");
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "error ending session");
            }
            Ok(_) => {}
        }

        self.sessions.lock().unwrap().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_joins_message_fragments() {
        let data = serde_json::json!({
            "messages": [
                { "message": "first" },
                { "message": "second" },
                { "type": "Inform" },
            ]
        });
        assert_eq!(
            HttpAgentClient::extract_response_text(&data),
            "first\nsecond"
        );
    }

    #[test]
    fn response_text_falls_back_to_raw_body() {
        let data = serde_json::json!({ "unexpected": true });
        assert_eq!(
            HttpAgentClient::extract_response_text(&data),
            data.to_string()
        );
    }

    #[tokio::test]
    async fn send_to_unknown_session_is_an_error() {
        let client = HttpAgentClient::new();
        let err = client.send_message("nope", "hi").await.unwrap_err();
        assert!(err.to_string().contains("invalid or expired session id"));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_call() {
        let client = HttpAgentClient::new();
        let err = client
            .start_session("t1", &AgentCredentials::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing required agent credentials"));
    }
}
