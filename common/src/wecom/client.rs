// WeCom application API client: token lifecycle, media upload, file messages

use crate::config::WeComApiConfig;
use crate::errors::MessagingError;
use crate::models::{Credentials, MediaReference, Recipients};
use crate::wecom::token::{AccessToken, DEFAULT_EXPIRES_IN_SECONDS};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Every platform response carries `errcode`/`errmsg`; `errcode == 0` is success
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: String,
    #[serde(flatten)]
    body: T,
}

impl<T> Envelope<T> {
    fn into_result(self, operation: &'static str) -> Result<T, MessagingError> {
        match self.errcode {
            Some(0) => Ok(self.body),
            Some(errcode) => Err(MessagingError::Rejected {
                operation,
                errcode,
                errmsg: self.errmsg,
            }),
            None => Err(MessagingError::InvalidResponse {
                operation,
                reason: "missing errcode".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    media_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendBody {
    #[serde(default)]
    invaliduser: Option<String>,
    #[serde(default)]
    invalidparty: Option<String>,
}

/// Client bound to one set of application credentials.
///
/// The access token is cached per instance. Refreshes happen under a lock, so a
/// client shared between concurrent dispatches performs at most one refresh at a
/// time and never hands out a half-written token.
pub struct WeComClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for WeComClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeComClient")
            .field("base_url", &self.base_url)
            .field("corp_id", &self.credentials.corp_id)
            .field("agent_id", &self.credentials.agent_id)
            .finish()
    }
}

impl WeComClient {
    /// Create a client; every outbound call is bounded by the configured timeout
    pub fn new(credentials: Credentials, api: &WeComApiConfig) -> Result<Self, MessagingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()
            .map_err(|e| {
                MessagingError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Return a usable access token, fetching a new one when the cached token
    /// is missing or inside its expiry margin
    #[instrument(skip(self), fields(corp_id = %self.credentials.corp_id))]
    pub async fn authenticate(&self) -> Result<String, MessagingError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(Utc::now()) {
                debug!(expires_at = %token.expires_at(), "Reusing cached access token");
                return Ok(token.value().to_string());
            }
        }

        match self.fetch_token().await {
            Ok(token) => {
                info!(expires_at = %token.expires_at(), "Access token refreshed");
                let value = token.value().to_string();
                *cached = Some(token);
                Ok(value)
            }
            Err(e) => {
                error!(error = %e, "Failed to get access token");
                *cached = None;
                Err(e)
            }
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, MessagingError> {
        let request = self.client.get(self.endpoint("gettoken")).query(&[
            ("corpid", self.credentials.corp_id.as_str()),
            ("corpsecret", self.credentials.secret.as_str()),
        ]);

        let issued_at = Utc::now();
        let body: TokenBody = self.call("gettoken", request).await?;

        let value = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MessagingError::InvalidResponse {
                operation: "gettoken",
                reason: "missing access_token".to_string(),
            })?;
        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);

        AccessToken::issued(value, expires_in, issued_at).ok_or_else(|| {
            MessagingError::InvalidResponse {
                operation: "gettoken",
                reason: format!("expires_in out of range: {}", expires_in),
            }
        })
    }

    /// Upload a file as temporary media and return its media reference.
    ///
    /// A missing file fails before any network traffic.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn upload_file(&self, path: &Path) -> Result<MediaReference, MessagingError> {
        if !path.is_file() {
            error!("File not found");
            return Err(MessagingError::FileNotFound(path.display().to_string()));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!(error = %e, "Failed to read file");
            MessagingError::FileRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let size = bytes.len();

        let token = self.authenticate().await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("media", part);

        let request = self
            .client
            .post(self.endpoint("media/upload"))
            .query(&[("access_token", token.as_str()), ("type", "file")])
            .multipart(form);

        let body: UploadBody = self.call("media/upload", request).await.map_err(|e| {
            error!(error = %e, "Failed to upload media");
            e
        })?;

        let media_id = body
            .media_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                error!("Upload response carried no media_id");
                MessagingError::InvalidResponse {
                    operation: "media/upload",
                    reason: "missing media_id".to_string(),
                }
            })?;

        info!(media_id = %media_id, size_bytes = size, "File uploaded");
        Ok(MediaReference { media_id })
    }

    /// Send a file message referencing previously uploaded media
    #[instrument(skip(self, media), fields(media_id = %media.media_id))]
    pub async fn send_file_message(
        &self,
        media: MediaReference,
        recipients: &Recipients,
    ) -> Result<(), MessagingError> {
        let token = self.authenticate().await?;

        let payload = json!({
            "touser": recipients.to_user,
            "toparty": recipients.to_party,
            "msgtype": "file",
            "agentid": self.agent_id_value(),
            "file": { "media_id": media.media_id },
            "safe": 0,
        });

        let request = self
            .client
            .post(self.endpoint("message/send"))
            .query(&[("access_token", token.as_str())])
            .json(&payload);

        let body: SendBody = self.call("message/send", request).await.map_err(|e| {
            error!(error = %e, "Failed to send message");
            e
        })?;

        let invalid_users = body.invaliduser.unwrap_or_default();
        let invalid_parties = body.invalidparty.unwrap_or_default();
        if !invalid_users.is_empty() || !invalid_parties.is_empty() {
            warn!(
                invalid_users = %invalid_users,
                invalid_parties = %invalid_parties,
                "Some recipients were not reachable"
            );
        }

        info!(
            to_user = %recipients.to_user,
            to_party = %recipients.to_party,
            "File message sent"
        );
        Ok(())
    }

    /// The platform expects a numeric agent id; keep the raw string otherwise
    fn agent_id_value(&self) -> Value {
        let agent_id = self.credentials.agent_id.trim();
        agent_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(agent_id))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, MessagingError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(MessagingError::InvalidResponse {
                operation,
                reason: format!("HTTP {}: {}", status, text),
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| MessagingError::InvalidResponse {
                operation,
                reason: format!("{}: {}", e, text),
            })?;

        envelope.into_result(operation).map_err(|e| {
            debug!(operation, body = %text, "Platform returned an error envelope");
            e
        })
    }
}
