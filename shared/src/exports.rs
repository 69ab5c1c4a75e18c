//! Stock ledger spreadsheet exports.

use chrono::{NaiveDate, Utc};

use crate::ledger::{
    accumulate, assemble, branch_filename, export_grid, normalize_all, tank_filename, ExportFile,
    ReportGrid, ReportLayout, ReportMetadata, ReportPeriod, ReportSummary, StockDelta, StockPair,
};
use crate::utils::{coerce_number, non_blank, parse_day};
use crate::{
    require_session, BranchExportRequest, BranchMovementFilter, HttpRequest, HttpResponse,
    RawMovement, ServiceError, ServiceResult, Services, TankExportRequest,
};

pub const NO_DATA_MESSAGE: &str = "Sem dados para o período";

/// Product filter value meaning "every product".
pub const ALL_PRODUCTS: &str = "todos";

/// Built report: the grid as laid out and the encoded file.
#[derive(Debug, Clone)]
pub struct StockExport {
    pub grid: ReportGrid,
    pub file: ExportFile,
}

/// Month filter as `YYYY-MM`, a date or a timestamp inside the month.
fn parse_month(raw: &str) -> ServiceResult<ReportPeriod> {
    let day = match parse_day(raw) {
        Ok(day) => day,
        Err(err) => NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d").map_err(|_| err)?,
    };
    ReportPeriod::month_of(day)
}

fn ensure_rows(rows: Vec<RawMovement>) -> ServiceResult<Vec<RawMovement>> {
    if rows.is_empty() {
        tracing::info!("No movements in the requested period");
        return Err(ServiceError::NoData(NO_DATA_MESSAGE.to_string()));
    }
    Ok(rows)
}

/// Summary block of the tank report. The reconciliation row needs the
/// `possuiCACL` flag; the surplus/shortage row needs a non-null value.
pub fn tank_summary(request: &TankExportRequest, opening: StockPair, computed_closing: StockPair) -> ReportSummary {
    let final_stock = match &request.estoque_final {
        Some(input) => StockPair::from_input(Some(input)),
        None => computed_closing,
    };
    let reconciliation = if request.possui_cacl.unwrap_or(false) {
        Some(StockPair::from_input(request.estoque_cacl.as_ref()))
    } else {
        None
    };
    let delta = match &request.valor_sobra_perda {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(StockDelta {
            amount: coerce_number(Some(value)),
            is_surplus: request.eh_sobra.unwrap_or(false),
        }),
    };

    ReportSummary {
        initial: opening,
        final_stock,
        reconciliation,
        delta,
    }
}

/// Ledger of one tank over one day, with the reconciliation summary.
pub async fn export_tank_stock(
    services: &Services,
    bearer: Option<&str>,
    request: &TankExportRequest,
) -> ServiceResult<StockExport> {
    let (tanque_id, _filial_id, raw_day) = match (
        non_blank(request.tanque_id.as_deref()),
        non_blank(request.filial_id.as_deref()),
        non_blank(request.data.as_deref()),
    ) {
        (Some(t), Some(f), Some(d)) => (t, f, d),
        _ => {
            return Err(ServiceError::Validation(
                "tanqueId, filialId e data são obrigatórios".to_string(),
            ))
        }
    };
    let period = ReportPeriod::Day(parse_day(raw_day)?);
    let (from, to) = period.bounds()?;

    require_session(bearer, &services.config, services.identity.as_ref()).await?;

    tracing::info!("Exporting tank {} for {}", tanque_id, period.describe());
    let rows = services
        .store
        .tank_movements(tanque_id, from, to)
        .await
        .map_err(|e| e.with_context("Erro ao buscar movimentações: "))?;
    let rows = ensure_rows(rows)?;

    let opening = StockPair::from_input(request.estoque_inicial.as_ref());
    let ledger = accumulate(opening, normalize_all(&rows));
    let summary = tank_summary(request, opening, ledger.closing);

    let reference = request.referencia_tanque.clone().unwrap_or_default();
    let metadata = ReportMetadata {
        reference: reference.clone(),
        location: request.nome_filial.clone().unwrap_or_default(),
        period,
        generated_at: Utc::now(),
    };
    let grid = assemble(ReportLayout::Tank, &metadata, &ledger, Some(&summary));
    let filename = tank_filename(if reference.trim().is_empty() { tanque_id } else { reference.as_str() });
    let file = export_grid(&grid, filename)?;

    tracing::info!("Tank export ready: {} ({} rows, {} bytes)", file.filename, ledger.rows.len(), file.bytes.len());
    Ok(StockExport { grid, file })
}

/// Ledger of a whole branch over one calendar month, starting from zero.
pub async fn export_branch_stock(
    services: &Services,
    bearer: Option<&str>,
    request: &BranchExportRequest,
) -> ServiceResult<StockExport> {
    let (filial_id, raw_month) = match (
        non_blank(request.filial_id.as_deref()),
        non_blank(request.mes_filtro.as_deref()),
    ) {
        (Some(f), Some(m)) => (f, m),
        _ => {
            return Err(ServiceError::Validation(
                "ID da filial e mês são obrigatórios".to_string(),
            ))
        }
    };
    let period = parse_month(raw_month)?;
    let (from, to) = period.bounds()?;
    let produto_id = non_blank(request.produto_filtro.as_deref())
        .filter(|p| !p.eq_ignore_ascii_case(ALL_PRODUCTS))
        .map(str::to_string);

    require_session(bearer, &services.config, services.identity.as_ref()).await?;

    let empresa_id = match non_blank(request.empresa_id.as_deref()) {
        Some(id) => id.to_string(),
        None => services
            .store
            .branch_company(filial_id)
            .await
            .map_err(|e| e.with_context("Erro ao buscar filial: "))?
            .ok_or_else(|| ServiceError::NotFound("Filial não encontrada.".to_string()))?,
    };

    let filter = BranchMovementFilter {
        filial_id: filial_id.to_string(),
        empresa_id,
        produto_id: produto_id.clone(),
        from,
        to,
    };
    tracing::info!("Exporting branch {} for {}", filial_id, period.describe());
    let rows = services
        .store
        .branch_movements(&filter)
        .await
        .map_err(|e| e.with_context("Erro ao buscar movimentações: "))?;
    let rows = ensure_rows(rows)?;

    let ledger = accumulate(StockPair::default(), normalize_all(&rows));

    let location = request.nome_filial.clone().unwrap_or_default();
    let metadata = ReportMetadata {
        reference: match produto_id {
            Some(_) => "Específico".to_string(),
            None => "Todos".to_string(),
        },
        location: location.clone(),
        period,
        generated_at: Utc::now(),
    };
    let grid = assemble(ReportLayout::Branch, &metadata, &ledger, None);
    let file = export_grid(&grid, branch_filename(&location, &period))?;

    tracing::info!("Branch export ready: {} ({} rows, {} bytes)", file.filename, ledger.rows.len(), file.bytes.len());
    Ok(StockExport { grid, file })
}

pub async fn handle_export_tank_stock(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: TankExportRequest = request.json_body()?;
    let export = export_tank_stock(services, request.bearer_token(), &body).await?;
    Ok(HttpResponse::spreadsheet(&export.file))
}

pub async fn handle_export_branch_stock(services: &Services, request: &HttpRequest) -> ServiceResult<HttpResponse> {
    let body: BranchExportRequest = request.json_body()?;
    let export = export_branch_stock(services, request.bearer_token(), &body).await?;
    Ok(HttpResponse::spreadsheet(&export.file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StockInput;
    use serde_json::json;

    fn request(value: serde_json::Value) -> TankExportRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_month_filter_forms() {
        let may = ReportPeriod::Month(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(parse_month("2024-05").unwrap(), may);
        assert_eq!(parse_month("2024-05-17").unwrap(), may);
        assert_eq!(parse_month("2024-05-01T00:00:00.000").unwrap(), may);
        assert_eq!(parse_month("maio").unwrap_err().to_string(), "Data inválida: \"maio\".");
    }

    #[test]
    fn test_summary_omits_optional_rows() {
        let req = request(json!({ "estoqueInicial": { "amb": 100, "vinte": 98 } }));
        let summary = tank_summary(&req, StockPair::new(100.0, 98.0), StockPair::new(120.0, 117.0));

        assert_eq!(summary.final_stock, StockPair::new(120.0, 117.0));
        assert!(summary.reconciliation.is_none());
        assert!(summary.delta.is_none());
    }

    #[test]
    fn test_summary_zero_delta_is_kept() {
        let req = request(json!({ "valorSobraPerda": 0, "ehSobra": false }));
        let summary = tank_summary(&req, StockPair::default(), StockPair::default());
        assert_eq!(summary.delta, Some(StockDelta { amount: 0.0, is_surplus: false }));

        let req = request(json!({ "valorSobraPerda": null, "ehSobra": true }));
        assert!(tank_summary(&req, StockPair::default(), StockPair::default()).delta.is_none());
    }

    #[test]
    fn test_summary_label_follows_flag_not_sign() {
        let req = request(json!({ "valorSobraPerda": -12, "ehSobra": true }));
        let delta = tank_summary(&req, StockPair::default(), StockPair::default()).delta.unwrap();
        assert!(delta.is_surplus);
        assert_eq!(delta.amount, -12.0);
    }

    #[test]
    fn test_summary_reconciliation_needs_flag() {
        let mut req = TankExportRequest {
            estoque_cacl: Some(StockInput { amb: None, vinte: Some(json!(1500)) }),
            estoque_final: Some(StockInput { amb: Some(json!(10)), vinte: Some(json!("9")) }),
            ..Default::default()
        };
        let summary = tank_summary(&req, StockPair::default(), StockPair::new(1.0, 1.0));
        assert!(summary.reconciliation.is_none());
        assert_eq!(summary.final_stock, StockPair::new(10.0, 9.0));

        req.possui_cacl = Some(true);
        let summary = tank_summary(&req, StockPair::default(), StockPair::default());
        assert_eq!(summary.reconciliation.map(|r| r.standard), Some(1500.0));
    }
}
