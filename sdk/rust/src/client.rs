use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Failure of a registry call.
#[derive(Debug)]
pub enum ClientError {
    /// The request never got an HTTP answer.
    Transport(reqwest::Error),
    /// The registry answered with a non-success status.
    Status { status: StatusCode, body: Value },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
        }
    }

    /// The generic message from the error body, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status { body, .. } => body.get("error").and_then(Value::as_str),
            ClientError::Transport(_) => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "transport error: {}", e),
            ClientError::Status { status, body } => {
                write!(f, "registry returned error status {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e)
    }
}

/// Thin client bound to one capability token.
///
/// Responses are returned as JSON values shaped exactly like the API's.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Same server, different caller.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: token.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ClientError> {
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(ClientError::Status { status, body });
        }
        Ok(body)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ClientError> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    async fn write<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<Value, ClientError> {
        self.send(self.request(method, path).json(body)).await
    }

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.send(self.client.get(format!("{}/health", self.base_url))).await
    }

    pub async fn session(&self) -> Result<Value, ClientError> {
        self.get("/api/v1/session", &[]).await
    }

    pub async fn register_hospital(
        &self,
        address: &str,
        name: &str,
        location: &str,
        contact_info: &str,
    ) -> Result<Value, ClientError> {
        let body = json!({
            "address": address,
            "name": name,
            "location": location,
            "contact_info": contact_info,
        });
        self.write(Method::POST, "/api/v1/hospitals", &body).await
    }

    pub async fn register_donor(
        &self,
        name: &str,
        age: u32,
        blood_type: &str,
        organ: &str,
        tissue_type: &str,
    ) -> Result<Value, ClientError> {
        let body = json!({
            "name": name,
            "age": age,
            "blood_type": blood_type,
            "organ": organ,
            "tissue_type": tissue_type,
        });
        self.write(Method::POST, "/api/v1/donors", &body).await
    }

    pub async fn register_recipient(
        &self,
        name: &str,
        age: u32,
        blood_type: &str,
        needed_organ: &str,
        tissue_type: &str,
        urgency_level: i64,
    ) -> Result<Value, ClientError> {
        let body = json!({
            "name": name,
            "age": age,
            "blood_type": blood_type,
            "needed_organ": needed_organ,
            "tissue_type": tissue_type,
            "urgency_level": urgency_level,
        });
        self.write(Method::POST, "/api/v1/recipients", &body).await
    }

    /// Donors, filtered by `query` pairs such as `("organ", "kidney")`.
    pub async fn donors(&self, query: &[(&str, String)]) -> Result<Value, ClientError> {
        self.get("/api/v1/donors", query).await
    }

    /// Recipients; accepts the same filters plus `sort` and `min_revision`.
    pub async fn recipients(&self, query: &[(&str, String)]) -> Result<Value, ClientError> {
        self.get("/api/v1/recipients", query).await
    }

    pub async fn candidates(&self, recipient_id: &str) -> Result<Value, ClientError> {
        self.get(&format!("/api/v1/recipients/{}/candidates", recipient_id), &[])
            .await
    }

    pub async fn match_organ(&self, donor_id: &str, recipient_id: &str) -> Result<Value, ClientError> {
        let body = json!({ "donor_id": donor_id, "recipient_id": recipient_id });
        self.write(Method::POST, "/api/v1/matches", &body).await
    }

    pub async fn confirm_retrieval(&self, donor_id: &str, recipient_id: &str) -> Result<Value, ClientError> {
        let body = json!({ "donor_id": donor_id, "recipient_id": recipient_id });
        self.write(Method::POST, "/api/v1/matches/retrieval", &body).await
    }

    pub async fn update_urgency(&self, recipient_id: &str, urgency_level: i64) -> Result<Value, ClientError> {
        let body = json!({ "urgency_level": urgency_level });
        self.write(
            Method::PUT,
            &format!("/api/v1/recipients/{}/urgency", recipient_id),
            &body,
        )
        .await
    }

    pub async fn matches(&self) -> Result<Value, ClientError> {
        self.get("/api/v1/matches", &[]).await
    }

    pub async fn stats(&self) -> Result<Value, ClientError> {
        self.get("/api/v1/stats", &[]).await
    }
}
