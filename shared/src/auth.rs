use crate::{AppConfig, AuthUser, IdentityProvider, ServiceError, ServiceResult};

/// How a function decides whether a caller may invoke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// The bearer token must equal the project's public anonymous key.
    PublicKey,
    /// The bearer token must be a live session known to the auth service.
    Session,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Caller {
    App,
    User(AuthUser),
}

impl Caller {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Caller::User(user) => Some(user),
            Caller::App => None,
        }
    }
}

pub async fn authorize(
    policy: AccessPolicy,
    bearer: Option<&str>,
    config: &AppConfig,
    identity: &dyn IdentityProvider,
) -> ServiceResult<Caller> {
    let token = bearer.ok_or_else(|| {
        tracing::warn!("Request without bearer token");
        ServiceError::Unauthorized("Token de autenticação não encontrado".to_string())
    })?;

    match policy {
        AccessPolicy::PublicKey => {
            if token == config.anon_key()? {
                Ok(Caller::App)
            } else {
                tracing::warn!("Bearer token does not match the public key");
                Err(ServiceError::Unauthorized("Token de autenticação inválido".to_string()))
            }
        }
        AccessPolicy::Session => {
            let user = identity.get_user(token).await.map_err(|e| {
                tracing::warn!("Session rejected: {}", e);
                ServiceError::Unauthorized(format!("Usuário não autenticado: {}", e))
            })?;
            tracing::info!("Authenticated caller {}", user.id);
            Ok(Caller::User(user))
        }
    }
}

/// Resolve a session and return the caller's identity.
pub async fn require_session(
    bearer: Option<&str>,
    config: &AppConfig,
    identity: &dyn IdentityProvider,
) -> ServiceResult<AuthUser> {
    match authorize(AccessPolicy::Session, bearer, config, identity).await? {
        Caller::User(user) => Ok(user),
        Caller::App => Err(ServiceError::Unauthorized("Usuário não autenticado".to_string())),
    }
}
