use std::sync::Arc;

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{ProviderCallError, ProviderClient, DEFAULT_QUALITY};
use crate::settings::ImageFormat;

#[derive(Debug, Clone)]
pub struct LocalBackendClient {
    origin: String,
    token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserUsage {
    pub images_processed: u64,
    pub backgrounds_removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_premium: bool,
    pub usage: UserUsage,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLimits {
    pub is_premium: bool,
    pub images_processed: u64,
    pub backgrounds_removed: u64,
    // None means unlimited.
    pub daily_limit: Option<u32>,
    pub background_removal_limit: u32,
}

pub fn user_limits(user: &User) -> UserLimits {
    UserLimits {
        is_premium: user.is_premium,
        images_processed: user.usage.images_processed,
        backgrounds_removed: user.usage.backgrounds_removed,
        daily_limit: if user.is_premium { None } else { Some(10) },
        background_removal_limit: if user.is_premium { 50 } else { 0 },
    }
}

pub trait BackendAuthOps: Send + Sync + 'static {
    fn login(&self, email: &str, password: &str) -> Result<AuthSession, ProviderCallError>;
    fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderCallError>;
    fn fetch_current_user(&self, token: &str) -> Result<User, ProviderCallError>;
    fn revoke_session(&self, token: &str) -> Result<(), ProviderCallError>;
    fn probe_health(&self) -> bool;
}

pub type SharedBackendAuthOps = Arc<dyn BackendAuthOps>;

pub fn default_backend_auth_ops(origin: impl Into<String>) -> SharedBackendAuthOps {
    Arc::new(LocalBackendClient::new(origin))
}

impl LocalBackendClient {
    pub fn new(origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn origin(&self) -> &str {
        self.origin.as_str()
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.origin, path)
    }

    fn client(&self) -> Result<Client, ProviderCallError> {
        Client::builder()
            .build()
            .map_err(|e| ProviderCallError::Upstream(format!("http client init failed: {e}")))
    }

    fn dispatch(&self, mut request: RequestBuilder) -> Result<Value, ProviderCallError> {
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .map_err(|e| ProviderCallError::Upstream(format!("HTTP request failed: {e}")))?;
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let envelope: Envelope = serde_json::from_str(body.as_str()).unwrap_or_default();

        if status.as_u16() == 401 {
            return Err(ProviderCallError::Unauthorized(
                envelope
                    .message
                    .unwrap_or_else(|| String::from("invalid or expired token")),
            ));
        }
        if !status.is_success() {
            let message = envelope
                .message
                .unwrap_or_else(|| body.trim().to_string());
            return Err(ProviderCallError::Upstream(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }
        envelope.data.ok_or_else(|| {
            ProviderCallError::Decode(String::from("response missing data payload"))
        })
    }

    fn post_api(&self, path: &str, body: &Value) -> Result<Value, ProviderCallError> {
        let request = self.client()?.post(self.api_url(path)).json(body);
        self.dispatch(request)
    }

    fn get_api(&self, path: &str) -> Result<Value, ProviderCallError> {
        let request = self.client()?.get(self.api_url(path));
        self.dispatch(request)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession, ProviderCallError> {
        let data = self.post_api(
            "/auth/login",
            &serde_json::json!({"email": email, "password": password}),
        )?;
        parse_auth_session(data)
    }

    pub fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderCallError> {
        let data = self.post_api(
            "/auth/register",
            &serde_json::json!({"name": name, "email": email, "password": password}),
        )?;
        parse_auth_session(data)
    }

    pub fn current_user(&self) -> Result<User, ProviderCallError> {
        let data = self.get_api("/auth/me")?;
        parse_user_payload(data)
    }

    pub fn logout(&self) -> Result<(), ProviderCallError> {
        let mut request = self.client()?.post(self.api_url("/auth/logout"));
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .map_err(|e| ProviderCallError::Upstream(format!("HTTP request failed: {e}")))?;
        let status = resp.status();
        // An already-invalid token still counts as logged out.
        if status.as_u16() == 401 || status.is_success() {
            return Ok(());
        }
        Err(ProviderCallError::Upstream(format!(
            "HTTP {}",
            status.as_u16()
        )))
    }

    pub fn probe_health(&self) -> bool {
        let Ok(client) = Client::builder().build() else {
            return false;
        };
        client
            .get(format!("{}/health", self.origin))
            .send()
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }
}

impl ProviderClient for LocalBackendClient {
    fn convert(&self, image_url: &str, format: ImageFormat) -> Result<String, ProviderCallError> {
        let data = self.post_api(
            "/images/convert",
            &serde_json::json!({
                "imageUrl": image_url,
                "format": format.as_str(),
                "quality": DEFAULT_QUALITY,
            }),
        )?;
        parse_processed_url(data)
    }

    fn remove_background(&self, image_url: &str) -> Result<String, ProviderCallError> {
        let data = self.post_api(
            "/images/remove-background",
            &serde_json::json!({
                "imageUrl": image_url,
                "quality": DEFAULT_QUALITY,
            }),
        )?;
        parse_processed_url(data)
    }

    fn health_check(&self) -> bool {
        self.probe_health()
    }
}

impl BackendAuthOps for LocalBackendClient {
    fn login(&self, email: &str, password: &str) -> Result<AuthSession, ProviderCallError> {
        LocalBackendClient::login(self, email, password)
    }

    fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderCallError> {
        LocalBackendClient::register(self, name, email, password)
    }

    fn fetch_current_user(&self, token: &str) -> Result<User, ProviderCallError> {
        self.clone().with_token(token).current_user()
    }

    fn revoke_session(&self, token: &str) -> Result<(), ProviderCallError> {
        self.clone().with_token(token).logout()
    }

    fn probe_health(&self) -> bool {
        LocalBackendClient::probe_health(self)
    }
}

fn parse_auth_session(data: Value) -> Result<AuthSession, ProviderCallError> {
    serde_json::from_value(data)
        .map_err(|e| ProviderCallError::Decode(format!("auth payload decode failed: {e}")))
}

fn parse_user_payload(data: Value) -> Result<User, ProviderCallError> {
    #[derive(Deserialize)]
    struct UserData {
        user: User,
    }
    serde_json::from_value::<UserData>(data)
        .map(|payload| payload.user)
        .map_err(|e| ProviderCallError::Decode(format!("user payload decode failed: {e}")))
}

fn parse_processed_url(data: Value) -> Result<String, ProviderCallError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ProcessedImage {
        processed_url: String,
    }
    #[derive(Deserialize)]
    struct ImagePayload {
        image: ProcessedImage,
    }
    serde_json::from_value::<ImagePayload>(data)
        .map(|payload| payload.image.processed_url)
        .map_err(|e| ProviderCallError::Decode(format!("image payload decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn api_urls_join_the_origin() {
        let client = LocalBackendClient::new("http://localhost:5001/");
        assert_eq!(client.origin(), "http://localhost:5001");
        assert_eq!(
            client.api_url("/images/convert"),
            "http://localhost:5001/api/images/convert"
        );
    }

    #[test]
    fn parses_processed_url_payload() {
        let url = parse_processed_url(serde_json::json!({
            "image": {"processedUrl": "https://cdn.example.com/out.webp", "id": "abc"}
        }))
        .expect("payload should parse");
        assert_eq!(url, "https://cdn.example.com/out.webp");

        let err = parse_processed_url(serde_json::json!({"image": {}}))
            .expect_err("missing url should fail");
        assert!(matches!(err, ProviderCallError::Decode(_)));
    }

    #[test]
    fn parses_auth_session_payload() {
        let session = parse_auth_session(serde_json::json!({
            "token": "tok-1",
            "user": {"id": "u1", "name": "Ada", "email": "ada@example.com"}
        }))
        .expect("payload should parse");
        assert_eq!(session.token, "tok-1");
        assert_eq!(session.user.name, "Ada");
        assert!(!session.user.is_premium);
    }

    #[test]
    fn parses_user_payload_with_usage() {
        let user = parse_user_payload(serde_json::json!({
            "user": {
                "id": "u1",
                "name": "Ada",
                "email": "ada@example.com",
                "isPremium": true,
                "usage": {"imagesProcessed": 12, "backgroundsRemoved": 4}
            }
        }))
        .expect("payload should parse");
        assert!(user.is_premium);
        assert_eq!(user.usage.images_processed, 12);
    }

    #[test]
    fn limits_depend_on_premium_flag() {
        let mut user = User::default();
        user.is_premium = false;
        let limits = user_limits(&user);
        assert_eq!(limits.daily_limit, Some(10));
        assert_eq!(limits.background_removal_limit, 0);

        user.is_premium = true;
        let limits = user_limits(&user);
        assert_eq!(limits.daily_limit, None);
        assert_eq!(limits.background_removal_limit, 50);
    }
}
