use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::services::upstream_message;
use crate::{AppConfig, AuthUser, IdentityProvider, ServiceError, ServiceResult};

pub const DEFAULT_USERS_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<AuthUser>,
}

/// Client for the auth service's admin REST API.
pub struct IdentityService {
    client: Client,
    auth_url: String,
    service_role_key: String,
    page_size: u32,
}

impl IdentityService {
    pub fn new(client: Client, auth_url: String, service_role_key: String) -> Self {
        Self {
            client,
            auth_url,
            service_role_key,
            page_size: DEFAULT_USERS_PAGE_SIZE,
        }
    }

    pub fn from_config(client: Client, config: &AppConfig) -> Self {
        Self::new(client, config.auth_url(), config.service_role_key.clone())
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn privileged(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn send(&self, builder: RequestBuilder) -> ServiceResult<String> {
        let response = builder.send().await.map_err(transport_error)?;
        read_body(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ServiceResult<T> {
        let body = self.send(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            ServiceError::Identity(format!("Resposta inválida do serviço de autenticação: {}", e))
        })
    }
}

async fn read_body(response: Response) -> ServiceResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        tracing::warn!("Auth service answered {}", status.as_u16());
        return Err(ServiceError::Identity(upstream_message(status.as_u16(), &body)));
    }
    Ok(body)
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    tracing::error!("❌ Auth service unreachable: {}", err);
    ServiceError::Identity(format!("Falha de comunicação com o serviço de autenticação: {}", err))
}

#[async_trait]
impl IdentityProvider for IdentityService {
    async fn create_user(&self, email: &str, password: &str) -> ServiceResult<AuthUser> {
        tracing::info!("Creating auth identity for {}", email);
        let request = self
            .privileged(self.client.post(format!("{}/admin/users", self.auth_url)))
            .json(&json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }));
        let user: AuthUser = self.send_json(request).await?;
        tracing::info!("✅ Auth identity {} created", user.id);
        Ok(user)
    }

    async fn get_user(&self, access_token: &str) -> ServiceResult<AuthUser> {
        let request = self
            .client
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(access_token);
        self.send_json(request).await
    }

    async fn update_password(&self, user_id: &str, password: &str) -> ServiceResult<()> {
        let request = self
            .privileged(self.client.put(format!("{}/admin/users/{}", self.auth_url, user_id)))
            .json(&json!({ "password": password }));
        self.send(request).await?;
        tracing::info!("✅ Password updated for {}", user_id);
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<AuthUser>> {
        let wanted = email.trim();
        let mut page = 1u32;
        loop {
            let request = self
                .privileged(self.client.get(format!("{}/admin/users", self.auth_url)))
                .query(&[("page", page.to_string()), ("per_page", self.page_size.to_string())]);
            let batch: UserPage = self.send_json(request).await?;
            tracing::debug!("Scanned user page {} ({} users)", page, batch.users.len());

            let found = batch.users.iter().find(|user| {
                user.email
                    .as_deref()
                    .map(|candidate| candidate.eq_ignore_ascii_case(wanted))
                    .unwrap_or(false)
            });
            if let Some(user) = found {
                return Ok(Some(user.clone()));
            }
            if (batch.users.len() as u32) < self.page_size {
                return Ok(None);
            }
            page += 1;
        }
    }
}
