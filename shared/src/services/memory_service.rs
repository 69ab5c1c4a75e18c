//! In-memory backend implementing every service trait, for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::utils::parse_timestamp;
use crate::{
    AuthUser, BranchMovementFilter, DataStore, EmailMessage, IdentityProvider, Mailer,
    RawMovement, ServiceError, ServiceResult, UserKey, UserRecord, UserSummary,
};

/// Operation names, as recorded in the call log and accepted by `fail_on`.
pub mod ops {
    pub const CREATE_USER: &str = "create_user";
    pub const GET_USER: &str = "get_user";
    pub const UPDATE_PASSWORD: &str = "update_password";
    pub const FIND_USER: &str = "find_user_by_email";
    pub const INSERT_USER: &str = "insert_user";
    pub const DELETE_PENDING: &str = "delete_pending_registration";
    pub const SET_TEMPORARY: &str = "set_temporary_password";
    pub const FIND_PROFILE: &str = "find_profile_by_email";
    pub const FLAG_RESET: &str = "flag_password_reset_request";
    pub const ADMIN_EMAILS: &str = "admin_emails";
    pub const BRANCH_COMPANY: &str = "branch_company";
    pub const TANK_MOVEMENTS: &str = "tank_movements";
    pub const BRANCH_MOVEMENTS: &str = "branch_movements";
    pub const SEND_EMAIL: &str = "send_email";
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    user: AuthUser,
    password: String,
}

#[derive(Debug, Clone)]
struct StoredProfile {
    record: UserRecord,
    reset_requested: bool,
}

#[derive(Debug, Clone)]
struct BranchMovement {
    filial_id: String,
    empresa_id: String,
    produto_id: Option<String>,
    movement: RawMovement,
}

#[derive(Debug, Default)]
struct MemoryState {
    identities: Vec<StoredIdentity>,
    sessions: HashMap<String, String>,
    profiles: Vec<StoredProfile>,
    pending: Vec<String>,
    companies: HashMap<String, String>,
    tank_movements: HashMap<String, Vec<RawMovement>>,
    branch_movements: Vec<BranchMovement>,
    sent: Vec<EmailMessage>,
    calls: Vec<&'static str>,
    failures: HashSet<&'static str>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

fn within(movement: &RawMovement, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    movement
        .data_mov
        .as_deref()
        .and_then(parse_timestamp)
        .map(|at| at >= from && at <= to)
        .unwrap_or(false)
}

fn by_timestamp(rows: &mut [RawMovement]) {
    rows.sort_by_key(|row| row.data_mov.as_deref().and_then(parse_timestamp));
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and fail it if a failure was injected for `op`.
    fn enter(&self, op: &'static str, failure: fn(String) -> ServiceError) -> ServiceResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failures.contains(op) {
            return Err(failure(format!("falha simulada em {}", op)));
        }
        Ok(state)
    }

    /// Make every later call of `op` fail with its dependency's error class.
    pub fn fail_on(&self, op: &'static str) {
        self.state().failures.insert(op);
    }

    pub fn add_identity(&self, email: &str, password: &str) -> AuthUser {
        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        self.state().identities.push(StoredIdentity {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    pub fn add_session(&self, token: &str, user_id: &str) {
        self.state().sessions.insert(token.to_string(), user_id.to_string());
    }

    pub fn add_profile(&self, record: UserRecord) {
        self.state().profiles.push(StoredProfile {
            record,
            reset_requested: false,
        });
    }

    pub fn add_pending(&self, email: &str) {
        self.state().pending.push(email.to_string());
    }

    pub fn add_branch(&self, filial_id: &str, empresa_id: &str) {
        self.state().companies.insert(filial_id.to_string(), empresa_id.to_string());
    }

    pub fn add_tank_movement(&self, tanque_id: &str, movement: RawMovement) {
        self.state()
            .tank_movements
            .entry(tanque_id.to_string())
            .or_default()
            .push(movement);
    }

    pub fn add_branch_movement(
        &self,
        filial_id: &str,
        empresa_id: &str,
        produto_id: Option<&str>,
        movement: RawMovement,
    ) {
        self.state().branch_movements.push(BranchMovement {
            filial_id: filial_id.to_string(),
            empresa_id: empresa_id.to_string(),
            produto_id: produto_id.map(str::to_string),
            movement,
        });
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.state().sent.clone()
    }

    pub fn identity(&self, email: &str) -> Option<AuthUser> {
        self.state()
            .identities
            .iter()
            .find(|i| i.user.email.as_deref() == Some(email))
            .map(|i| i.user.clone())
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        self.state()
            .identities
            .iter()
            .find(|i| i.user.email.as_deref() == Some(email))
            .map(|i| i.password.clone())
    }

    pub fn profile(&self, email: &str) -> Option<UserRecord> {
        self.state()
            .profiles
            .iter()
            .find(|p| p.record.email == email)
            .map(|p| p.record.clone())
    }

    pub fn reset_requested(&self, email: &str) -> bool {
        self.state()
            .profiles
            .iter()
            .any(|p| p.record.email == email && p.reset_requested)
    }

    pub fn pending(&self) -> Vec<String> {
        self.state().pending.clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn create_user(&self, email: &str, password: &str) -> ServiceResult<AuthUser> {
        let mut state = self.enter(ops::CREATE_USER, ServiceError::Identity)?;
        if state.identities.iter().any(|i| i.user.email.as_deref() == Some(email)) {
            return Err(ServiceError::Identity(
                "A user with this email address has already been registered".to_string(),
            ));
        }
        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        state.identities.push(StoredIdentity {
            user: user.clone(),
            password: password.to_string(),
        });
        Ok(user)
    }

    async fn get_user(&self, access_token: &str) -> ServiceResult<AuthUser> {
        let state = self.enter(ops::GET_USER, ServiceError::Identity)?;
        let user_id = state
            .sessions
            .get(access_token)
            .ok_or_else(|| ServiceError::Identity("invalid JWT".to_string()))?;
        state
            .identities
            .iter()
            .find(|i| &i.user.id == user_id)
            .map(|i| i.user.clone())
            .ok_or_else(|| ServiceError::Identity("User not found".to_string()))
    }

    async fn update_password(&self, user_id: &str, password: &str) -> ServiceResult<()> {
        let mut state = self.enter(ops::UPDATE_PASSWORD, ServiceError::Identity)?;
        let identity = state
            .identities
            .iter_mut()
            .find(|i| i.user.id == user_id)
            .ok_or_else(|| ServiceError::Identity("User not found".to_string()))?;
        identity.password = password.to_string();
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> ServiceResult<Option<AuthUser>> {
        let state = self.enter(ops::FIND_USER, ServiceError::Identity)?;
        Ok(state
            .identities
            .iter()
            .find(|i| {
                i.user
                    .email
                    .as_deref()
                    .map(|e| e.eq_ignore_ascii_case(email.trim()))
                    .unwrap_or(false)
            })
            .map(|i| i.user.clone()))
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn insert_user(&self, record: &UserRecord) -> ServiceResult<()> {
        let mut state = self.enter(ops::INSERT_USER, ServiceError::Store)?;
        if state.profiles.iter().any(|p| p.record.id == record.id) {
            return Err(ServiceError::Store(
                "duplicate key value violates unique constraint \"usuarios_pkey\"".to_string(),
            ));
        }
        state.profiles.push(StoredProfile {
            record: record.clone(),
            reset_requested: false,
        });
        Ok(())
    }

    async fn delete_pending_registration(&self, email: &str) -> ServiceResult<()> {
        let mut state = self.enter(ops::DELETE_PENDING, ServiceError::Store)?;
        state.pending.retain(|pending| pending != email);
        Ok(())
    }

    async fn set_temporary_password(&self, key: &UserKey, temporary: bool) -> ServiceResult<()> {
        let mut state = self.enter(ops::SET_TEMPORARY, ServiceError::Store)?;
        // An update matching no row succeeds, like the REST store.
        for profile in state.profiles.iter_mut() {
            let matches = match key {
                UserKey::Id(id) => &profile.record.id == id,
                UserKey::Email(email) => &profile.record.email == email,
            };
            if matches {
                profile.record.senha_temporaria = temporary;
            }
        }
        Ok(())
    }

    async fn find_profile_by_email(&self, email: &str) -> ServiceResult<Option<UserSummary>> {
        let state = self.enter(ops::FIND_PROFILE, ServiceError::Store)?;
        Ok(state
            .profiles
            .iter()
            .find(|p| p.record.email == email)
            .map(|p| UserSummary {
                id: p.record.id.clone(),
                nome: p.record.nome.clone(),
                email: p.record.email.clone(),
            }))
    }

    async fn flag_password_reset_request(&self, email: &str) -> ServiceResult<()> {
        let mut state = self.enter(ops::FLAG_RESET, ServiceError::Store)?;
        for profile in state.profiles.iter_mut().filter(|p| p.record.email == email) {
            profile.reset_requested = true;
        }
        Ok(())
    }

    async fn admin_emails(&self) -> ServiceResult<Vec<String>> {
        let state = self.enter(ops::ADMIN_EMAILS, ServiceError::Store)?;
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.record.nivel == 3)
            .map(|p| p.record.email.clone())
            .collect())
    }

    async fn branch_company(&self, filial_id: &str) -> ServiceResult<Option<String>> {
        let state = self.enter(ops::BRANCH_COMPANY, ServiceError::Store)?;
        Ok(state.companies.get(filial_id).cloned())
    }

    async fn tank_movements(
        &self,
        tanque_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<RawMovement>> {
        let state = self.enter(ops::TANK_MOVEMENTS, ServiceError::Store)?;
        let mut rows: Vec<RawMovement> = state
            .tank_movements
            .get(tanque_id)
            .map(|rows| rows.iter().filter(|m| within(m, from, to)).cloned().collect())
            .unwrap_or_default();
        by_timestamp(&mut rows);
        Ok(rows)
    }

    async fn branch_movements(&self, filter: &BranchMovementFilter) -> ServiceResult<Vec<RawMovement>> {
        let state = self.enter(ops::BRANCH_MOVEMENTS, ServiceError::Store)?;
        let mut rows: Vec<RawMovement> = state
            .branch_movements
            .iter()
            .filter(|m| m.filial_id == filter.filial_id && m.empresa_id == filter.empresa_id)
            .filter(|m| match &filter.produto_id {
                Some(produto) => m.produto_id.as_deref() == Some(produto.as_str()),
                None => true,
            })
            .filter(|m| within(&m.movement, filter.from, filter.to))
            .map(|m| m.movement.clone())
            .collect();
        by_timestamp(&mut rows);
        Ok(rows)
    }
}

#[async_trait]
impl Mailer for MemoryBackend {
    async fn send(&self, message: &EmailMessage) -> ServiceResult<String> {
        let mut state = self.enter(ops::SEND_EMAIL, ServiceError::Email)?;
        state.sent.push(message.clone());
        Ok(format!("mem-{}", state.sent.len()))
    }
}
