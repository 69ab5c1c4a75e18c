use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ServiceError, ServiceResult};

/// Access levels accepted when approving a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Operator = 1,
    Supervisor = 2,
    Administrator = 3,
}

impl From<AccessLevel> for u8 {
    fn from(level: AccessLevel) -> Self {
        level as u8
    }
}

impl AccessLevel {
    /// Accepts a JSON number or numeric string, like the mobile app sends.
    pub fn from_json(value: Option<&Value>) -> ServiceResult<Self> {
        let parsed = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n == 1.0 => Ok(AccessLevel::Operator),
            Some(n) if n == 2.0 => Ok(AccessLevel::Supervisor),
            Some(n) if n == 3.0 => Ok(AccessLevel::Administrator),
            _ => Err(ServiceError::Validation(format!(
                "Nível inválido: {}.",
                value.map(display_json).unwrap_or_else(|| "undefined".to_string())
            ))),
        }
    }
}

fn display_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Body of `approve-user`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveUserRequest {
    pub nome: Option<String>,
    pub email: Option<String>,
    pub celular: Option<String>,
    pub funcao: Option<String>,
    pub id_filial: Option<String>,
    pub nivel: Option<Value>,
}

/// Body of `set-permanent-password`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetPasswordRequest {
    pub nova_senha: Option<String>,
}

/// Body of `reset-password` and `request-password-reset`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailOnlyRequest {
    pub email: Option<String>,
}

/// Stock pair as sent by the app: `{ "amb": .., "vinte": .. }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockInput {
    pub amb: Option<Value>,
    pub vinte: Option<Value>,
}

/// Body of `export-tank-stock`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TankExportRequest {
    pub tanque_id: Option<String>,
    pub referencia_tanque: Option<String>,
    pub filial_id: Option<String>,
    pub nome_filial: Option<String>,
    pub data: Option<String>,
    pub estoque_inicial: Option<StockInput>,
    pub estoque_final: Option<StockInput>,
    #[serde(rename = "estoqueCACL")]
    pub estoque_cacl: Option<StockInput>,
    #[serde(rename = "possuiCACL")]
    pub possui_cacl: Option<bool>,
    pub valor_sobra_perda: Option<Value>,
    pub eh_sobra: Option<bool>,
}

/// Body of `export-branch-stock`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchExportRequest {
    pub filial_id: Option<String>,
    pub nome_filial: Option<String>,
    pub empresa_id: Option<String>,
    pub mes_filtro: Option<String>,
    pub produto_filtro: Option<String>,
}

/// Identity as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Row inserted into `usuarios` when a registration is approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub nome: String,
    pub email: String,
    pub celular: Option<String>,
    pub funcao: Option<String>,
    pub id_filial: Option<String>,
    pub nivel: u8,
    pub status: String,
    pub senha_temporaria: bool,
}

/// Projection of `usuarios` used by the password flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub nome: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    pub nome: Option<String>,
}

/// Movement row exactly as fetched; every quantity may be missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMovement {
    pub data_mov: Option<String>,
    #[serde(default)]
    pub cliente: Option<String>,
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub entrada_amb: Option<Value>,
    #[serde(default)]
    pub entrada_vinte: Option<Value>,
    #[serde(default)]
    pub saida_amb: Option<Value>,
    #[serde(default)]
    pub saida_vinte: Option<Value>,
    #[serde(default)]
    pub produtos: Option<ProductRef>,
}

/// Filter for the branch-wide movement query.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchMovementFilter {
    pub filial_id: String,
    pub empresa_id: String,
    pub produto_id: Option<String>,
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
}

/// Outbound email, in the shape the email API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}
