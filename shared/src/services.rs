pub mod email_service;
pub mod identity_service;
pub mod memory_service;
pub mod store_service;

pub use email_service::*;
pub use identity_service::*;
pub use memory_service::*;
pub use store_service::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    AppConfig, AuthUser, BranchMovementFilter, EmailMessage, RawMovement, ServiceError,
    ServiceResult, UserRecord, UserSummary,
};

/// Managed authentication service, called with privileged credentials.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a confirmed identity with the given password.
    async fn create_user(&self, email: &str, password: &str) -> ServiceResult<AuthUser>;

    /// Resolve a session access token to the identity it belongs to.
    async fn get_user(&self, access_token: &str) -> ServiceResult<AuthUser>;

    async fn update_password(&self, user_id: &str, password: &str) -> ServiceResult<()>;

    async fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<AuthUser>>;
}

/// Which `usuarios` row a flag update targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserKey {
    Id(String),
    Email(String),
}

impl UserKey {
    pub fn column(&self) -> &'static str {
        match self {
            UserKey::Id(_) => "id",
            UserKey::Email(_) => "email",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            UserKey::Id(v) | UserKey::Email(v) => v,
        }
    }
}

/// Relational store holding profiles, pending registrations and stock movements.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn insert_user(&self, record: &UserRecord) -> ServiceResult<()>;

    /// Remove every pending registration with this email.
    async fn delete_pending_registration(&self, email: &str) -> ServiceResult<()>;

    async fn set_temporary_password(&self, key: &UserKey, temporary: bool) -> ServiceResult<()>;

    async fn find_profile_by_email(&self, email: &str) -> ServiceResult<Option<UserSummary>>;

    async fn flag_password_reset_request(&self, email: &str) -> ServiceResult<()>;

    /// Emails of every level-3 user.
    async fn admin_emails(&self) -> ServiceResult<Vec<String>>;

    /// Company owning the branch, if the branch exists.
    async fn branch_company(&self, filial_id: &str) -> ServiceResult<Option<String>>;

    /// Movements of one tank inside `[from, to]`, ascending by `data_mov`.
    async fn tank_movements(
        &self,
        tanque_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<RawMovement>>;

    /// Movements of one branch, ascending by `data_mov`.
    async fn branch_movements(&self, filter: &BranchMovementFilter) -> ServiceResult<Vec<RawMovement>>;
}

/// Transactional email API.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the message and return the provider's message id.
    async fn send(&self, message: &EmailMessage) -> ServiceResult<String>;
}

/// Dependencies a function works against, built once at cold start.
#[derive(Clone)]
pub struct Services {
    pub config: AppConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn DataStore>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl Services {
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DataStore>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            config,
            identity,
            store,
            mailer,
        }
    }

    /// Wire the REST clients. The mailer exists only when email settings do.
    pub fn from_config(config: AppConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceError::Configuration(format!("Falha ao iniciar cliente HTTP: {}", e)))?;

        let identity: Arc<dyn IdentityProvider> = Arc::new(IdentityService::from_config(client.clone(), &config));
        let store: Arc<dyn DataStore> = Arc::new(StoreService::from_config(client.clone(), &config));
        let mailer: Option<Arc<dyn Mailer>> = match config.email {
            Some(_) => Some(Arc::new(EmailService::from_config(client, &config)?)),
            None => None,
        };

        tracing::info!("Services initialized for {}", config.project_url);
        Ok(Self::new(config, identity, store, mailer))
    }

    /// Every dependency served by one in-memory backend.
    pub fn in_memory(config: AppConfig, backend: Arc<MemoryBackend>) -> Self {
        let mailer: Arc<dyn Mailer> = backend.clone();
        Self::new(config, backend.clone(), backend, Some(mailer))
    }

    pub fn mailer(&self) -> ServiceResult<&dyn Mailer> {
        self.mailer
            .as_deref()
            .ok_or_else(|| ServiceError::Configuration("Variável de ambiente ausente: RESEND_API_KEY".to_string()))
    }
}

/// Pull the human-readable message out of an upstream JSON error body.
pub(crate) fn upstream_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.trim().is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body.to_string()
    }
}
