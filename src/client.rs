//! REST client for the CRM backend.
//!
//! Every call carries the session's bearer token. A 401 is surfaced as
//! [`ClientError::Unauthorized`] so the caller can drop the session.

use crate::crud::{record_id, RecordSource};
use crate::error_report::ErrorReport;
use crate::errors::ClientError;
use crate::session::{Session, User};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const API_PREFIX: &str = "/api/v1";
pub const VIEW_AS_HEADER: &str = "X-View-As-User-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Leads,
    Loans,
    Tasks,
    ReferralPartners,
    MumClients,
    Activities,
    TeamMembers,
    Users,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Leads => "leads",
            Resource::Loans => "loans",
            Resource::Tasks => "tasks",
            Resource::ReferralPartners => "referral-partners",
            Resource::MumClients => "mum-clients",
            Resource::Activities => "activities",
            Resource::TeamMembers => "team-members",
            Resource::Users => "admin/users",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<Session>,
    bearer: Option<String>,
}

impl CrmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            session: None,
            bearer: None,
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Authenticates with a bare token, for relaying on behalf of a caller
    /// whose session lives elsewhere.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges credentials for a bearer token and the signed-in user.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let token: TokenResponse = decode(check(response).await?).await?;

        let user = match token.user {
            Some(user) => user,
            None => {
                self.clone()
                    .with_bearer(token.access_token.clone())
                    .get_json(&format!("{API_PREFIX}/users/me"))
                    .await?
            }
        };
        debug!(user_id = user.id, "logged in");
        Ok(Session::new(token.access_token, user))
    }

    pub fn resource(&self, resource: Resource) -> ResourceClient {
        ResourceClient {
            client: self.clone(),
            resource,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.request(Method::GET, path).send().await?;
        decode(check(response).await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, path).json(body).send().await?;
        decode(check(response).await?).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::PATCH, path).json(body).send().await?;
        decode(check(response).await?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.request(Method::DELETE, path).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Posts a crash report and returns the backend's analysis verbatim.
    pub async fn report_error(&self, report: &ErrorReport) -> Result<Value, ClientError> {
        self.post_json("/auto-fix-error", report).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(session) = &self.session {
            builder = builder.bearer_auth(&session.token);
            if let Some(user_id) = session.view_as_user_id() {
                builder = builder.header(VIEW_AS_HEADER, user_id.to_string());
            }
        } else if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

/// One REST collection (`/api/v1/<resource>/`).
#[derive(Clone)]
pub struct ResourceClient {
    client: CrmClient,
    resource: Resource,
}

impl ResourceClient {
    fn collection_path(&self) -> String {
        format!("{API_PREFIX}/{}/", self.resource.path())
    }

    fn item_path(&self, id: &str) -> String {
        format!("{API_PREFIX}/{}/{id}", self.resource.path())
    }
}

#[async_trait]
impl RecordSource for ResourceClient {
    async fn list(&self) -> Result<Vec<Value>, ClientError> {
        self.client.get_json(&self.collection_path()).await
    }

    async fn create(&self, record: Value) -> Result<Value, ClientError> {
        let created: Value = self.client.post_json(&self.collection_path(), &record).await?;
        if record_id(&created).is_none() {
            warn!(resource = self.resource.path(), "created record has no id");
        }
        Ok(created)
    }

    async fn update(&self, id: &str, patch: Value) -> Result<Value, ClientError> {
        self.client.patch_json(&self.item_path(id), &patch).await
    }

    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client.delete(&self.item_path(id)).await
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        warn!("backend rejected bearer token");
        return Err(ClientError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

// Empty bodies (204s) decode as JSON null.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))?
    };
    serde_json::from_value(value).map_err(|err| ClientError::Decode(err.to_string()))
}
