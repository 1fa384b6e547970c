use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// One poll response from the playground server.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollReply {
    Running { output: String },
    Success { output: String },
    Error { message: Value },
}

#[derive(Debug, Deserialize)]
struct RunReply {
    pid: u32,
}

pub struct PlaygroundClient {
    base: String,
    http: reqwest::Client,
}

impl PlaygroundClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Submit source text; returns the pid to poll.
    pub async fn run(&self, code: &str) -> Result<u32> {
        let response = self
            .http
            .post(format!("{}/run", self.base))
            .body(code.to_string())
            .send()
            .await
            .context("submitting code")?;
        if !response.status().is_success() {
            // launch failures come back as a structured error payload
            let message = response.text().await.unwrap_or_default();
            bail!("submission rejected: {}", message);
        }
        let reply: RunReply = response.json().await.context("decoding run reply")?;
        Ok(reply.pid)
    }

    pub async fn poll(&self, pid: u32) -> Result<PollReply> {
        let response = self
            .http
            .get(format!("{}/poll/{}", self.base, pid))
            .send()
            .await
            .with_context(|| format!("polling process {}", pid))?;
        response.json().await.context("decoding poll reply")
    }
}
