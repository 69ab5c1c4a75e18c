use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::services::upstream_message;
use crate::{
    AppConfig, BranchMovementFilter, DataStore, RawMovement, ServiceError, ServiceResult,
    UserKey, UserRecord, UserSummary,
};

pub const USERS_TABLE: &str = "usuarios";
pub const PENDING_TABLE: &str = "cadastros_pendentes";
pub const BRANCHES_TABLE: &str = "filiais";
pub const TANK_MOVEMENTS_TABLE: &str = "movimentacoes_tanque";
pub const BRANCH_MOVEMENTS_TABLE: &str = "movimentacoes";

const TANK_MOVEMENT_COLUMNS: &str =
    "data_mov,cliente,descricao,entrada_amb,entrada_vinte,saida_amb,saida_vinte";
const BRANCH_MOVEMENT_COLUMNS: &str =
    "data_mov,descricao,entrada_amb,entrada_vinte,saida_amb,saida_vinte,produtos!inner(nome)";

/// Administrator access level in `usuarios.nivel`.
const ADMIN_LEVEL: u8 = 3;

#[derive(Debug, Deserialize)]
struct EmailRow {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompanyRow {
    empresa_id: Option<String>,
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Client for the relational store's REST interface.
pub struct StoreService {
    client: Client,
    rest_url: String,
    service_role_key: String,
}

impl StoreService {
    pub fn new(client: Client, rest_url: String, service_role_key: String) -> Self {
        Self {
            client,
            rest_url,
            service_role_key,
        }
    }

    pub fn from_config(client: Client, config: &AppConfig) -> Self {
        Self::new(client, config.rest_url(), config.service_role_key.clone())
    }

    fn table(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn privileged(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    async fn send(&self, builder: RequestBuilder) -> ServiceResult<String> {
        let response = self
            .privileged(builder)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::warn!("Store answered {}", status.as_u16());
            return Err(ServiceError::Store(upstream_message(status.as_u16(), &body)));
        }
        Ok(body)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> ServiceResult<Vec<T>> {
        let body = self.send(self.client.get(self.table(table)).query(query)).await?;
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::Store(format!("Resposta inválida do banco: {}", e)))
    }

    async fn update(&self, table: &str, filter: (&str, String), changes: serde_json::Value) -> ServiceResult<()> {
        let request = self
            .client
            .patch(self.table(table))
            .query(&[filter])
            .header("Prefer", "return=minimal")
            .json(&changes);
        self.send(request).await.map(|_| ())
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    tracing::error!("❌ Store unreachable: {}", err);
    ServiceError::Store(format!("Falha de comunicação com o banco: {}", err))
}

#[async_trait]
impl DataStore for StoreService {
    async fn insert_user(&self, record: &UserRecord) -> ServiceResult<()> {
        let request = self
            .client
            .post(self.table(USERS_TABLE))
            .header("Prefer", "return=minimal")
            .json(record);
        self.send(request).await?;
        tracing::info!("✅ Profile row {} inserted", record.id);
        Ok(())
    }

    async fn delete_pending_registration(&self, email: &str) -> ServiceResult<()> {
        let request = self
            .client
            .delete(self.table(PENDING_TABLE))
            .query(&[("email", eq(email))]);
        self.send(request).await.map(|_| ())
    }

    async fn set_temporary_password(&self, key: &UserKey, temporary: bool) -> ServiceResult<()> {
        self.update(
            USERS_TABLE,
            (key.column(), eq(key.value())),
            json!({ "senha_temporaria": temporary }),
        )
        .await
    }

    async fn find_profile_by_email(&self, email: &str) -> ServiceResult<Option<UserSummary>> {
        let rows: Vec<UserSummary> = self
            .select(
                USERS_TABLE,
                &[
                    ("select", "id,nome,email".to_string()),
                    ("email", eq(email)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn flag_password_reset_request(&self, email: &str) -> ServiceResult<()> {
        self.update(USERS_TABLE, ("email", eq(email)), json!({ "redefinicao_senha": true }))
            .await
    }

    async fn admin_emails(&self) -> ServiceResult<Vec<String>> {
        let rows: Vec<EmailRow> = self
            .select(
                USERS_TABLE,
                &[
                    ("select", "email".to_string()),
                    ("nivel", eq(&ADMIN_LEVEL.to_string())),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.email)
            .filter(|email| !email.trim().is_empty())
            .collect())
    }

    async fn branch_company(&self, filial_id: &str) -> ServiceResult<Option<String>> {
        let rows: Vec<CompanyRow> = self
            .select(
                BRANCHES_TABLE,
                &[
                    ("select", "empresa_id".to_string()),
                    ("id", eq(filial_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|row| row.empresa_id))
    }

    async fn tank_movements(
        &self,
        tanque_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<RawMovement>> {
        let rows: Vec<RawMovement> = self
            .select(
                TANK_MOVEMENTS_TABLE,
                &[
                    ("select", TANK_MOVEMENT_COLUMNS.to_string()),
                    ("tanque_id", eq(tanque_id)),
                    ("data_mov", format!("gte.{}", instant(from))),
                    ("data_mov", format!("lte.{}", instant(to))),
                    ("order", "data_mov.asc".to_string()),
                ],
            )
            .await?;
        tracing::info!("Fetched {} movements for tank {}", rows.len(), tanque_id);
        Ok(rows)
    }

    async fn branch_movements(&self, filter: &BranchMovementFilter) -> ServiceResult<Vec<RawMovement>> {
        let mut query = vec![
            ("select", BRANCH_MOVEMENT_COLUMNS.to_string()),
            ("filial_id", eq(&filter.filial_id)),
            ("empresa_id", eq(&filter.empresa_id)),
            ("data_mov", format!("gte.{}", instant(filter.from))),
            ("data_mov", format!("lte.{}", instant(filter.to))),
        ];
        if let Some(produto_id) = &filter.produto_id {
            query.push(("produto_id", eq(produto_id)));
        }
        query.push(("order", "data_mov.asc".to_string()));

        let rows: Vec<RawMovement> = self.select(BRANCH_MOVEMENTS_TABLE, &query).await?;
        tracing::info!("Fetched {} movements for branch {}", rows.len(), filter.filial_id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    fn store(server: &MockServer) -> StoreService {
        StoreService::new(Client::new(), server.url("/rest/v1"), "srk".to_string())
    }

    #[tokio::test]
    async fn test_insert_user_posts_row() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rest/v1/usuarios")
                    .header("apikey", "srk")
                    .header("prefer", "return=minimal");
                then.status(201);
            })
            .await;

        let record = UserRecord {
            id: "u-1".to_string(),
            nome: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            celular: None,
            funcao: None,
            id_filial: None,
            nivel: 1,
            status: "ativo".to_string(),
            senha_temporaria: true,
        };
        store(&server).insert_user(&record).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_store_rejection_keeps_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/rest/v1/usuarios");
                then.status(400).json_body(json!({ "code": "42703", "message": "column does not exist" }));
            })
            .await;

        let err = store(&server)
            .set_temporary_password(&UserKey::Id("u-1".to_string()), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store");
        assert_eq!(err.to_string(), "column does not exist");
    }

    #[tokio::test]
    async fn test_flag_update_filters_by_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/rest/v1/usuarios")
                    .query_param("email", "eq.ana@example.com");
                then.status(204);
            })
            .await;

        store(&server)
            .set_temporary_password(&UserKey::Email("ana@example.com".to_string()), true)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_admin_emails_skip_blank_rows() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/usuarios")
                    .query_param("nivel", "eq.3");
                then.status(200).json_body(json!([
                    { "email": "boss@example.com" },
                    { "email": null },
                    { "email": " " },
                    { "email": "ops@example.com" }
                ]));
            })
            .await;

        let emails = store(&server).admin_emails().await.unwrap();
        assert_eq!(emails, vec!["boss@example.com", "ops@example.com"]);
    }

    #[tokio::test]
    async fn test_branch_company_lookup() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/filiais").query_param("id", "eq.f-1");
                then.status(200).json_body(json!([{ "empresa_id": "e-7" }]));
            })
            .await;

        assert_eq!(store(&server).branch_company("f-1").await.unwrap(), Some("e-7".to_string()));
    }

    #[tokio::test]
    async fn test_tank_movements_query() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/movimentacoes_tanque")
                    .query_param("tanque_id", "eq.t-1")
                    .query_param("data_mov", "gte.2024-05-10T00:00:00Z")
                    .query_param("data_mov", "lte.2024-05-10T23:59:59Z")
                    .query_param("order", "data_mov.asc");
                then.status(200).json_body(json!([
                    {
                        "data_mov": "2024-05-10T08:00:00+00:00",
                        "cliente": "Transportes Lima",
                        "descricao": null,
                        "entrada_amb": 1000,
                        "entrada_vinte": "990.5",
                        "saida_amb": null,
                        "saida_vinte": null
                    }
                ]));
            })
            .await;

        let from = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap();
        let rows = store(&server).tank_movements("t-1", from, to).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cliente.as_deref(), Some("Transportes Lima"));
        assert_eq!(rows[0].entrada_vinte, Some(json!("990.5")));
    }

    #[tokio::test]
    async fn test_branch_movements_product_filter() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/movimentacoes")
                    .query_param("filial_id", "eq.f-1")
                    .query_param("empresa_id", "eq.e-1")
                    .query_param("produto_id", "eq.p-2");
                then.status(200).json_body(json!([
                    { "data_mov": "2024-05-02T10:00:00Z", "descricao": "Recebimento", "produtos": { "nome": "Diesel S10" } }
                ]));
            })
            .await;

        let filter = BranchMovementFilter {
            filial_id: "f-1".to_string(),
            empresa_id: "e-1".to_string(),
            produto_id: Some("p-2".to_string()),
            from: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap(),
        };
        let rows = store(&server).branch_movements(&filter).await.unwrap();

        mock.assert_async().await;
        assert_eq!(rows[0].produtos.as_ref().and_then(|p| p.nome.as_deref()), Some("Diesel S10"));
    }
}
