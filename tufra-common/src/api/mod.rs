//! Client for the repository service REST API. The service processes
//! bootstrap, artifact and metadata requests asynchronously and hands out
//! task ids which are polled until the backend reports a terminal state.

use std::io::Write;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Request timeout, the backend may sit behind slow task queues.
pub const API_TIMEOUT: Duration = Duration::from_secs(300);
/// Delay between two task state polls.
pub const TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Endpoints of the repository service API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Bootstrap,
    Config,
    Task,
    Artifacts,
    ArtifactsDelete,
    ArtifactsPublish,
    Metadata,
    MetadataSign,
    MetadataSignDelete,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Bootstrap => "api/v1/bootstrap/",
            Endpoint::Config => "api/v1/config/",
            Endpoint::Task => "api/v1/task/",
            Endpoint::Artifacts => "api/v1/artifacts/",
            Endpoint::ArtifactsDelete => "api/v1/artifacts/delete",
            Endpoint::ArtifactsPublish => "api/v1/artifacts/publish/",
            Endpoint::Metadata => "api/v1/metadata/",
            Endpoint::MetadataSign => "api/v1/metadata/sign/",
            Endpoint::MetadataSignDelete => "api/v1/metadata/sign/delete",
        }
    }
}

/// Response envelope used by all service endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `data` member of the bootstrap state endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct BootstrapData {
    #[serde(default)]
    pub bootstrap: Option<bool>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// `data` member of the task state endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub status: Option<bool>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    server: Url,
}

impl ApiClient {
    pub fn new(server: Url, headers: &[(String, String)]) -> Result<Self, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidHeader(value.clone()))?;
            header_map.insert(name, value);
        }
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .default_headers(header_map)
            .build()?;
        Ok(ApiClient { http, server })
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, Error> {
        Ok(self.server.join(endpoint.path())?)
    }

    async fn get(&self, endpoint: Endpoint, query: &[(&str, &str)]) -> Result<reqwest::Response, Error> {
        let url = self.endpoint_url(endpoint)?;
        debug!("GET {url}");
        self.http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| self.connection_error(err))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        payload: &T,
    ) -> Result<reqwest::Response, Error> {
        let url = self.endpoint_url(endpoint)?;
        debug!("POST {url}");
        self.http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| self.connection_error(err))
    }

    fn connection_error(&self, err: reqwest::Error) -> Error {
        if err.is_connect() || err.is_timeout() {
            Error::ServerUnreachable(self.server.to_string())
        } else {
            err.into()
        }
    }

    async fn unexpected(endpoint: Endpoint, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Error::UnexpectedResponse {
            endpoint: endpoint.path().to_string(),
            status,
            body,
        }
    }

    /// Query the bootstrap state of the server.
    pub async fn bootstrap_status(&self) -> Result<BootstrapData, Error> {
        let response = self.get(Endpoint::Bootstrap, &[]).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(Error::BootstrapNotAllowed(self.server.to_string()))
            }
            StatusCode::OK => {}
            _ => return Err(Self::unexpected(Endpoint::Bootstrap, response).await),
        }
        let envelope: ApiResponse = response.json().await?;
        let data = envelope.data.ok_or(Error::MissingResponseField("data"))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Send `payload` to an endpoint and return the id of the task the
    /// service queued for it. The service answers payload submissions with
    /// 202 and a well-known message, anything else is surfaced verbatim.
    pub async fn send_payload<T: Serialize + ?Sized>(
        &self,
        endpoint: Endpoint,
        payload: &T,
        expected_msg: &str,
    ) -> Result<String, Error> {
        let response = self.post(endpoint, payload).await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::unexpected(endpoint, response).await);
        }
        let body = response.text().await?;
        let envelope: ApiResponse = serde_json::from_str(&body)?;
        if envelope.message.as_deref() != Some(expected_msg) {
            return Err(Error::UnexpectedResponse {
                endpoint: endpoint.path().to_string(),
                status: StatusCode::ACCEPTED.as_u16(),
                body,
            });
        }
        envelope
            .data
            .as_ref()
            .and_then(|data| data.get("task_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::MissingResponseField("task_id"))
    }

    /// Queue publishing of all unpublished artifacts.
    pub async fn publish_artifacts(&self) -> Result<String, Error> {
        let response = self
            .post(Endpoint::ArtifactsPublish, &Value::Null)
            .await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::unexpected(Endpoint::ArtifactsPublish, response).await);
        }
        let envelope: ApiResponse = response.json().await?;
        envelope
            .data
            .as_ref()
            .and_then(|data| data.get("task_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::MissingResponseField("task_id"))
    }

    /// Fetch the state of a single task.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskState, Error> {
        let response = self.get(Endpoint::Task, &[("task_id", task_id)]).await?;
        if response.status() != StatusCode::OK {
            return Err(Self::unexpected(Endpoint::Task, response).await);
        }
        let envelope: ApiResponse = response.json().await?;
        let data = envelope.data.ok_or(Error::MissingResponseField("data"))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch metadata that is pending signatures.
    pub async fn pending_metadata(&self) -> Result<serde_json::Map<String, Value>, Error> {
        let response = self.get(Endpoint::MetadataSign, &[]).await?;
        if response.status() != StatusCode::OK {
            return Err(Self::unexpected(Endpoint::MetadataSign, response).await);
        }
        let envelope: ApiResponse = response.json().await?;
        let pending = envelope
            .data
            .as_ref()
            .and_then(|data| data.get("metadata"))
            .and_then(Value::as_object)
            .cloned()
            .ok_or(Error::MissingResponseField("metadata"))?;
        Ok(pending)
    }

    /// Poll a task until it reaches a terminal state. Every newly observed
    /// state is reported once with `title` as prefix, repeats print a dot.
    /// `SUCCESS` is only treated as such when the task result says so.
    pub async fn task_status(
        &self,
        task_id: &str,
        title: &str,
        silent: bool,
    ) -> Result<TaskState, Error> {
        let mut seen: Vec<String> = Vec::new();
        loop {
            let task = self.get_task(task_id).await?;
            let state = task
                .state
                .clone()
                .ok_or(Error::MissingResponseField("state"))?;
            if seen.contains(&state) {
                if !silent {
                    print!(".");
                    std::io::stdout().flush().ok();
                }
            } else {
                if !silent {
                    println!("{title} {state}");
                }
                seen.push(state.clone());
            }
            match state.as_str() {
                "SUCCESS" => {
                    let result = task.result.clone().unwrap_or_default();
                    if result.status == Some(true) {
                        return Ok(task);
                    }
                    return Err(Error::TaskFailed {
                        task_id: task_id.to_string(),
                        reason: result
                            .message
                            .or(result.error)
                            .unwrap_or_else(|| "task result reported no success".to_string()),
                    });
                }
                "FAILURE" => {
                    return Err(Error::TaskFailed {
                        task_id: task_id.to_string(),
                        reason: serde_json::to_string(&task).unwrap_or_default(),
                    })
                }
                "ERRORED" => {
                    // ERRORED carries internal error details in the result.
                    return Err(Error::TaskFailed {
                        task_id: task_id.to_string(),
                        reason: task
                            .result
                            .and_then(|result| result.error)
                            .unwrap_or_else(|| "no error details received".to_string()),
                    });
                }
                _ => {}
            }
            tokio::time::sleep(TASK_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::Bootstrap.path(), "api/v1/bootstrap/");
        assert_eq!(Endpoint::ArtifactsDelete.path(), "api/v1/artifacts/delete");
        assert_eq!(
            Endpoint::MetadataSignDelete.path(),
            "api/v1/metadata/sign/delete"
        );
    }

    #[test]
    fn test_endpoint_url_join() {
        let client = ApiClient::new(Url::parse("https://api.example.org").unwrap(), &[])
            .expect("client construction failed");
        assert_eq!(
            client.endpoint_url(Endpoint::Artifacts).unwrap().as_str(),
            "https://api.example.org/api/v1/artifacts/"
        );
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        let result = ApiClient::new(
            Url::parse("https://api.example.org").unwrap(),
            &[("bad header".to_string(), "x".to_string())],
        );
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_task_state_parses_service_shape() {
        let data = serde_json::json!({
            "state": "SUCCESS",
            "result": {
                "status": true,
                "details": {"bootstrap": true},
            },
        });
        let task: TaskState = serde_json::from_value(data).expect("failed to parse task state");
        assert_eq!(task.state.as_deref(), Some("SUCCESS"));
        assert_eq!(task.result.and_then(|result| result.status), Some(true));
    }

    #[test]
    fn test_bootstrap_data_tolerates_missing_fields() {
        let data: BootstrapData = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(data.bootstrap.is_none());
    }
}
