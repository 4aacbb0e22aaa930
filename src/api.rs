//! HTTP client for the automation backend.
//!
//! One wrapper for every one-shot call: command execution, proxy reply
//! delivery, and the opportunistically-cached skills and file listings the
//! command palette consumes. The base URL and credential come from the
//! settings snapshot at call time, so configuration changes apply without
//! rebuilding the client.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use chatlink_protocols::{BridgeError, Command, ExecResponse, SkillInfo};

use crate::settings::Settings;

const SKILLS_TTL: Duration = Duration::from_secs(30);
const FILES_TTL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Caches {
    skills: Option<(Instant, Vec<SkillInfo>)>,
    files: HashMap<String, (Instant, Vec<String>)>,
}

/// Backend API client.
pub struct ApiClient {
    http: reqwest::Client,
    settings: tokio::sync::watch::Receiver<Settings>,
    caches: Mutex<Caches>,
}

impl ApiClient {
    pub fn new(settings: tokio::sync::watch::Receiver<Settings>) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            caches: Mutex::new(Caches::default()),
        }
    }

    fn endpoint(&self, path: &str) -> Result<(String, Option<String>), BridgeError> {
        let settings = self.settings.borrow();
        let base = settings
            .base()
            .ok_or_else(|| BridgeError::Configuration("backend base URL is not set".to_string()))?;
        Ok((format!("{base}{path}"), settings.token.clone()))
    }

    fn get(&self, url: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Execute a command via `POST /exec`.
    ///
    /// 401 is the distinct auth-failure signal; any other non-2xx carries its
    /// status code.
    pub async fn exec(&self, command: &Command) -> Result<ExecResponse, BridgeError> {
        let (url, token) = self.endpoint("/exec")?;
        let mut request = self.http.post(&url).json(command);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(BridgeError::Auth);
        }
        if !status.is_success() {
            return Err(BridgeError::Http(status.as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| BridgeError::Parse(e.to_string()))
    }

    /// Deliver a proxied reply via `POST /v1/reply`. Fire-and-forget from the
    /// correlator's perspective; failures are logged, not retried.
    pub async fn post_reply(&self, request_id: &str, content: &str) -> Result<(), BridgeError> {
        let (url, token) = self.endpoint("/v1/reply")?;
        let mut request = self.http.post(&url).json(&serde_json::json!({
            "request_id": request_id,
            "content": content,
        }));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BridgeError::Http(response.status().as_u16()));
        }
        Ok(())
    }

    /// Fetch the conversation-seeding prompt via `GET /prompt`.
    pub async fn init_prompt(&self) -> Result<String, BridgeError> {
        let (url, token) = self.endpoint("/prompt")?;
        let response = self
            .get(&url, token.as_deref())
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BridgeError::Http(response.status().as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    /// Skills listing, cached for 30 seconds. Failures degrade to an empty
    /// listing.
    pub async fn skills(&self) -> Vec<SkillInfo> {
        let mut caches = self.caches.lock().await;
        if let Some((fetched_at, skills)) = &caches.skills {
            if fetched_at.elapsed() < SKILLS_TTL {
                return skills.clone();
            }
        }
        let skills = self.fetch_skills().await.unwrap_or_else(|e| {
            warn!(error = %e, "skills listing unavailable");
            Vec::new()
        });
        caches.skills = Some((Instant::now(), skills.clone()));
        skills
    }

    async fn fetch_skills(&self) -> Result<Vec<SkillInfo>, BridgeError> {
        let (url, token) = self.endpoint("/skills")?;
        let response = self
            .get(&url, token.as_deref())
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BridgeError::Http(response.status().as_u16()));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;
        let skills = body
            .get("skills")
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        serde_json::from_value(skills).map_err(|e| BridgeError::Parse(e.to_string()))
    }

    /// Fuzzy file listing for `query`, cached for 5 seconds per query string.
    /// Failures degrade to an empty listing.
    pub async fn files(&self, query: &str) -> Vec<String> {
        let mut caches = self.caches.lock().await;
        if let Some((fetched_at, files)) = caches.files.get(query) {
            if fetched_at.elapsed() < FILES_TTL {
                return files.clone();
            }
        }
        let files = self.fetch_files(query).await.unwrap_or_else(|e| {
            warn!(error = %e, "file listing unavailable");
            Vec::new()
        });
        caches
            .files
            .insert(query.to_string(), (Instant::now(), files.clone()));
        debug!(query, hits = files.len(), "file listing refreshed");
        files
    }

    async fn fetch_files(&self, query: &str) -> Result<Vec<String>, BridgeError> {
        let (base, token) = self.endpoint("/files")?;
        let response = self
            .get(&base, token.as_deref())
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BridgeError::Http(response.status().as_u16()));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BridgeError::Parse(e.to_string()))?;
        let files = body
            .get("files")
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        serde_json::from_value(files).map_err(|e| BridgeError::Parse(e.to_string()))
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
