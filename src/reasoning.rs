use crate::config::ReasoningConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTurn {
    pub role: Role,
    pub text: String,
}

/// Conversation so far, forwarded with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub session_id: String,
    pub history: Vec<ContextTurn>,
}

impl SessionContext {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            history: Vec::new(),
        }
    }

    /// Appends a turn, keeping only the newest `limit` turns.
    pub fn push(&mut self, role: Role, text: &str, limit: usize) {
        self.history.push(ContextTurn {
            role,
            text: text.to_string(),
        });
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasoningRequest {
    pub utterance_text: String,
    pub session_context: SessionContext,
}

// The orchestrator only knows this seam. Tests swap in `MockReasoner`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Produces the assistant's reply text. May take seconds; may fail.
    async fn reply(&self, request: ReasoningRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    #[serde(alias = "text", alias = "message")]
    reply: String,
}

/// Reasoning collaborator reached over a JSON chat endpoint.
pub struct HttpReasoner {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpReasoner {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            api_key: config.api_key().cloned(),
        })
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn reply(&self, request: ReasoningRequest) -> Result<String> {
        let mut call = self.client.post(&self.endpoint).json(&request);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }

        let body = call
            .send()
            .await
            .with_context(|| format!("Reasoning request to {} failed", self.endpoint))?
            .error_for_status()?
            .json::<ReplyBody>()
            .await
            .context("Reasoning response was not a reply")?;
        tracing::debug!("Reasoning replied with {} chars", body.reply.len());
        Ok(body.reply)
    }
}
