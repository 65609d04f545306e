//! Identity Platform Client
//!
//! Service-role access to the platform's admin user API and its `profiles`
//! table. Every call is made once; nothing is retried.

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, error, info};

use super::errors::{parse_body, BackendError};
use super::types::{CreateUserRequest, ProfileRow, ProfileUpsert};
use crate::config::BackendConfig;

/// Client for the identity/profile platform
#[derive(Clone)]
pub struct IdentityClient {
    http_client: Client,
    base_url: String,
    service_role_key: String,
}

impl IdentityClient {
    /// Reuse the caller's reqwest client
    pub fn with_client(http_client: Client, config: &BackendConfig) -> Self {
        Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
    }

    /// Send, read the body, and turn a non-success status into `Upstream`
    async fn execute(&self, operation: &str, builder: RequestBuilder) -> Result<Value, BackendError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(operation = operation, status = status.as_u16(), body = %text, "Identity platform call failed");
            return Err(BackendError::from_status(status.as_u16(), &text));
        }

        debug!(operation = operation, status = status.as_u16(), "Identity platform call ok");
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(parse_body(&text))
    }

    /// Create a confirmed identity. Returns the raw payload; the id may be in any envelope.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Value, BackendError> {
        info!(email = email, "Creating identity");
        let body = CreateUserRequest {
            email,
            password,
            email_confirm: true,
        };
        let builder = self
            .http_client
            .post(self.url("/auth/v1/admin/users"))
            .json(&body);
        self.execute("create_user", builder).await
    }

    /// Look up identities by email. Returns the raw payload.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Value, BackendError> {
        let url = self.url(&format!(
            "/auth/v1/admin/users?email={}",
            urlencoding::encode(email)
        ));
        self.execute("find_user_by_email", self.http_client.get(url)).await
    }

    pub async fn get_user(&self, id: &str) -> Result<Value, BackendError> {
        let url = self.url(&format!("/auth/v1/admin/users/{}", id));
        self.execute("get_user", self.http_client.get(url)).await
    }

    pub async fn update_password(&self, id: &str, password: &str) -> Result<(), BackendError> {
        info!(user_id = id, "Updating password");
        let url = self.url(&format!("/auth/v1/admin/users/{}", id));
        let builder = self
            .http_client
            .put(url)
            .json(&serde_json::json!({ "password": password }));
        self.execute("update_password", builder).await.map(|_| ())
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
        info!(user_id = id, "Deleting identity");
        let url = self.url(&format!("/auth/v1/admin/users/{}", id));
        self.execute("delete_user", self.http_client.delete(url)).await.map(|_| ())
    }

    /// Insert or merge the profile row carrying `role`
    pub async fn upsert_role(&self, id: &str, role: &str) -> Result<(), BackendError> {
        info!(user_id = id, role = role, "Upserting profile role");
        let builder = self
            .http_client
            .post(self.url("/rest/v1/profiles"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&ProfileUpsert { id, role });
        self.execute("upsert_role", builder).await.map(|_| ())
    }

    /// Ids of every profile with `role`
    pub async fn profile_ids_with_role(&self, role: &str) -> Result<Vec<String>, BackendError> {
        let url = self.url(&format!(
            "/rest/v1/profiles?role=eq.{}&select=id",
            urlencoding::encode(role)
        ));
        let value = self.execute("profile_ids_with_role", self.http_client.get(url)).await?;
        let rows: Vec<ProfileRow> = match value {
            Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| BackendError::Decode(format!("profiles: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    pub async fn delete_profile(&self, id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("/rest/v1/profiles?id=eq.{}", urlencoding::encode(id)));
        self.execute("delete_profile", self.http_client.delete(url)).await.map(|_| ())
    }
}
