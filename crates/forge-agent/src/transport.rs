use forge_core::{signing, timefmt};
use forge_protocol::{
    RegisterRequest, Response, Task, API_GET_TASK, API_PING, API_REGISTER, API_REPORT_TASK,
    BOOTSTRAP_SECRET, CODE_RETRY, CODE_SUCCESS, HEADER_APP_ID, HEADER_SIGN, HEADER_TIME,
};
use serde_json::Value;
use tracing::debug;

use crate::AgentError;

/// Signed HTTP transport to the coordinator. One instance per agent; the
/// underlying reqwest client pools connections across calls.
pub(crate) struct Transport {
    http: reqwest::Client,
    app_id: String,
    secret: String,
    server_addr: String,
    debug: bool,
}

impl Transport {
    pub fn new(
        http: reqwest::Client,
        app_id: String,
        secret: String,
        server_addr: String,
        debug: bool,
    ) -> Self {
        let server_addr = server_addr.trim_end_matches('/').to_string();
        Self {
            http,
            app_id,
            secret,
            server_addr,
            debug,
        }
    }

    /// POST one signed call and unwrap the response envelope. The register
    /// path signs with the bootstrap secret, everything else with the
    /// session secret.
    async fn call(&self, path: &str, body: String) -> Result<Value, AgentError> {
        let date_time = timefmt::now_string();
        let secret = if path == API_REGISTER {
            BOOTSTRAP_SECRET
        } else {
            self.secret.as_str()
        };
        let sign = signing::compute_signature(&self.app_id, secret, &body, &date_time);
        let url = format!("{}{}", self.server_addr, path);
        if self.debug {
            debug!(%url, app_id = %self.app_id, "forge call");
        }
        let resp = self
            .http
            .post(&url)
            .header(HEADER_APP_ID, self.app_id.as_str())
            .header(HEADER_TIME, date_time.as_str())
            .header(HEADER_SIGN, sign.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AgentError::HttpStatus(status.as_u16()));
        }
        let envelope: Response = resp.json().await?;
        match envelope.code {
            CODE_SUCCESS => Ok(envelope.data),
            CODE_RETRY => Err(AgentError::Retryable(envelope.message)),
            code => Err(AgentError::Rejected {
                code,
                message: envelope.message,
            }),
        }
    }

    pub async fn register(&self) -> Result<Value, AgentError> {
        let body = serde_json::to_string(&RegisterRequest {
            app_id: self.app_id.clone(),
            secret: self.secret.clone(),
        })?;
        self.call(API_REGISTER, body).await
    }

    pub async fn ping(&self) -> Result<(), AgentError> {
        self.call(API_PING, "ping".to_string()).await.map(|_| ())
    }

    pub async fn get_task(&self) -> Result<Task, AgentError> {
        let data = self.call(API_GET_TASK, String::new()).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn report_task(&self, task: &Task) -> Result<Value, AgentError> {
        let body = serde_json::to_string(task)?;
        self.call(API_REPORT_TASK, body).await
    }
}
