use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::ledger::balance::{BalancedLedger, LedgerRow, StockPair};
use crate::ledger::period::ReportPeriod;

/// Display format for flow and balance columns.
pub const GROUPED_THOUSANDS: &str = "#,##0";

/// One written cell. Blank separator rows are empty rows, not empty cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number { value: f64, grouped: bool },
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn grouped(value: f64) -> Self {
        Cell::Number { value, grouped: true }
    }

    pub fn plain(value: f64) -> Self {
        Cell::Number { value, grouped: false }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Which ledger the grid describes. Fixes columns, titles and widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLayout {
    /// A single tank over one day.
    Tank,
    /// Every product of a branch over one month; adds a product column.
    Branch,
}

const FLOW_HEADERS: [&str; 6] = [
    "Entrada (Amb.)",
    "Entrada (20ºC)",
    "Saída (Amb.)",
    "Saída (20ºC)",
    "Saldo (Amb.)",
    "Saldo (20ºC)",
];

impl ReportLayout {
    pub fn title(&self) -> &'static str {
        match self {
            ReportLayout::Tank => "RELATÓRIO DE ESTOQUE DO TANQUE",
            ReportLayout::Branch => "RELATÓRIO DE ESTOQUE",
        }
    }

    pub fn sheet_name(&self) -> &'static str {
        match self {
            ReportLayout::Tank => "Estoque Tanque",
            ReportLayout::Branch => "Estoque",
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = vec!["Data"];
        if *self == ReportLayout::Branch {
            headers.push("Produto");
        }
        headers.push("Descrição");
        headers.extend(FLOW_HEADERS);
        headers
    }

    /// Columns holding flows and running balances.
    pub fn numeric_columns(&self) -> Range<usize> {
        match self {
            ReportLayout::Tank => 2..8,
            ReportLayout::Branch => 3..9,
        }
    }

    pub fn column_widths(&self) -> &'static [f64] {
        match self {
            ReportLayout::Tank => &[12.0, 40.0, 16.0, 16.0, 16.0, 16.0, 16.0, 16.0],
            ReportLayout::Branch => &[12.0, 25.0, 30.0, 15.0, 15.0, 15.0, 15.0, 15.0, 15.0],
        }
    }

    pub fn centers_numbers(&self) -> bool {
        matches!(self, ReportLayout::Branch)
    }
}

/// Identifying information printed above the table.
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    /// Tank reference, or the product scope for branch reports.
    pub reference: String,
    pub location: String,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
}

/// Surplus (`is_surplus`) or shortage found when reconciling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockDelta {
    pub amount: f64,
    pub is_surplus: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub initial: StockPair,
    pub final_stock: StockPair,
    pub reconciliation: Option<StockPair>,
    pub delta: Option<StockDelta>,
}

#[derive(Debug, Clone)]
pub struct ReportGrid {
    pub layout: ReportLayout,
    pub rows: Vec<Vec<Cell>>,
    pub header_row: usize,
    pub data_rows: Range<usize>,
}

impl ReportGrid {
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

pub fn assemble(
    layout: ReportLayout,
    metadata: &ReportMetadata,
    ledger: &BalancedLedger,
    summary: Option<&ReportSummary>,
) -> ReportGrid {
    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(ledger.rows.len() + 16);

    rows.push(vec![Cell::text(layout.title())]);
    let generated = format!("Gerado em: {}", metadata.generated_at.format("%d/%m/%Y %H:%M:%S"));
    match layout {
        ReportLayout::Tank => {
            rows.push(vec![Cell::text(format!("Tanque: {}", metadata.reference))]);
            rows.push(vec![Cell::text(format!("Filial: {}", metadata.location))]);
            rows.push(vec![Cell::text(format!("Data: {}", metadata.period.describe()))]);
        }
        ReportLayout::Branch => {
            rows.push(vec![Cell::text(format!("Filial: {}", metadata.location))]);
            rows.push(vec![Cell::text(format!("Mês: {}", metadata.period.describe()))]);
            rows.push(vec![Cell::text(format!("Produto: {}", metadata.reference))]);
        }
    }
    rows.push(vec![Cell::text(generated)]);
    rows.push(Vec::new());

    let header_row = rows.len();
    rows.push(layout.headers().into_iter().map(Cell::text).collect());

    let first_data = rows.len();
    rows.extend(ledger.rows.iter().map(|row| data_row(layout, row)));
    let data_rows = first_data..rows.len();

    if let Some(summary) = summary {
        rows.push(Vec::new());
        rows.push(vec![Cell::text("Resumo")]);
        rows.push(vec![Cell::text("Estoque Inicial (20ºC)"), Cell::plain(summary.initial.standard)]);
        rows.push(vec![
            Cell::text("Estoque Final Calculado (20ºC)"),
            Cell::plain(summary.final_stock.standard),
        ]);
        if let Some(reconciliation) = summary.reconciliation {
            rows.push(vec![Cell::text("Saldo do CACL (20ºC)"), Cell::plain(reconciliation.standard)]);
        }
        if let Some(delta) = summary.delta {
            let label = if delta.is_surplus { "Sobra (20ºC)" } else { "Perda (20ºC)" };
            rows.push(vec![Cell::text(label), Cell::plain(delta.amount)]);
        }
    }

    ReportGrid {
        layout,
        rows,
        header_row,
        data_rows,
    }
}

fn data_row(layout: ReportLayout, row: &LedgerRow) -> Vec<Cell> {
    let record = &row.record;
    let mut cells = vec![Cell::text(record.date_label())];
    if layout == ReportLayout::Branch {
        cells.push(Cell::text(record.product.clone().unwrap_or_default()));
    }
    cells.push(Cell::text(record.label.clone()));
    cells.extend(
        [
            record.in_ambient,
            record.in_standard,
            record.out_ambient,
            record.out_standard,
            row.balance.ambient,
            row.balance.standard,
        ]
        .into_iter()
        .map(Cell::grouped),
    );
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance::accumulate;
    use crate::ledger::normalize::MovementRecord;
    use chrono::{NaiveDate, TimeZone};

    fn record(label: &str, product: Option<&str>, flows: [f64; 4]) -> MovementRecord {
        MovementRecord {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap()),
            timestamp_text: "2024-05-10T08:00:00+00:00".to_string(),
            product: product.map(str::to_string),
            label: label.to_string(),
            in_ambient: flows[0],
            in_standard: flows[1],
            out_ambient: flows[2],
            out_standard: flows[3],
        }
    }

    fn metadata(period: ReportPeriod, reference: &str) -> ReportMetadata {
        ReportMetadata {
            reference: reference.to_string(),
            location: "Paulínia".to_string(),
            period,
            generated_at: Utc.with_ymd_and_hms(2024, 5, 11, 14, 5, 9).unwrap(),
        }
    }

    fn day() -> ReportPeriod {
        ReportPeriod::Day(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
    }

    fn summary() -> ReportSummary {
        ReportSummary {
            initial: StockPair::new(100.0, 98.0),
            final_stock: StockPair::new(111.0, 109.0),
            reconciliation: None,
            delta: None,
        }
    }

    #[test]
    fn test_tank_grid_zones() {
        let ledger = accumulate(
            StockPair::default(),
            vec![
                record("Posto A", None, [10.0, 9.0, 0.0, 0.0]),
                record("Posto B", None, [0.0, 0.0, 4.0, 3.0]),
            ],
        );
        let grid = assemble(ReportLayout::Tank, &metadata(day(), "TQ-01"), &ledger, None);

        assert_eq!(grid.cell(0, 0).and_then(Cell::as_text), Some("RELATÓRIO DE ESTOQUE DO TANQUE"));
        assert_eq!(grid.cell(1, 0).and_then(Cell::as_text), Some("Tanque: TQ-01"));
        assert_eq!(grid.cell(2, 0).and_then(Cell::as_text), Some("Filial: Paulínia"));
        assert_eq!(grid.cell(3, 0).and_then(Cell::as_text), Some("Data: 10/05/2024"));
        assert_eq!(grid.cell(4, 0).and_then(Cell::as_text), Some("Gerado em: 11/05/2024 14:05:09"));
        assert!(grid.rows[5].is_empty());

        assert_eq!(grid.header_row, 6);
        let header: Vec<_> = grid.rows[6].iter().filter_map(Cell::as_text).collect();
        assert_eq!(
            header,
            vec![
                "Data",
                "Descrição",
                "Entrada (Amb.)",
                "Entrada (20ºC)",
                "Saída (Amb.)",
                "Saída (20ºC)",
                "Saldo (Amb.)",
                "Saldo (20ºC)"
            ]
        );

        assert_eq!(grid.data_rows, 7..9);
        assert_eq!(grid.rows.len(), 9);
        assert_eq!(grid.width(), 8);

        let second = &grid.rows[8];
        assert_eq!(second[0], Cell::text("10/05/2024"));
        assert_eq!(second[1], Cell::text("Posto B"));
        assert_eq!(second[4], Cell::grouped(4.0));
        assert_eq!(second[6], Cell::grouped(6.0));
        assert_eq!(second[7], Cell::grouped(6.0));
    }

    #[test]
    fn test_numeric_format_only_on_data_rows() {
        let ledger = accumulate(StockPair::default(), vec![record("x", None, [1.0, 1.0, 0.0, 0.0])]);
        let grid = assemble(ReportLayout::Tank, &metadata(day(), "TQ"), &ledger, Some(&summary()));

        for (r, row) in grid.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let grouped = matches!(cell, Cell::Number { grouped: true, .. });
                let expected = grid.data_rows.contains(&r) && grid.layout.numeric_columns().contains(&c);
                assert_eq!(grouped, expected, "cell ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn test_branch_layout_prefixes_product_column() {
        let ledger = accumulate(
            StockPair::default(),
            vec![record("Compra", Some("Diesel S10"), [500.0, 495.0, 0.0, 0.0])],
        );
        let period = ReportPeriod::Month(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let grid = assemble(ReportLayout::Branch, &metadata(period, "Todos"), &ledger, None);

        assert_eq!(grid.cell(1, 0).and_then(Cell::as_text), Some("Filial: Paulínia"));
        assert_eq!(grid.cell(2, 0).and_then(Cell::as_text), Some("Mês: 5/2024"));
        assert_eq!(grid.cell(3, 0).and_then(Cell::as_text), Some("Produto: Todos"));
        assert_eq!(grid.cell(6, 1).and_then(Cell::as_text), Some("Produto"));
        assert_eq!(grid.cell(7, 1).and_then(Cell::as_text), Some("Diesel S10"));
        assert_eq!(grid.cell(7, 2).and_then(Cell::as_text), Some("Compra"));
        assert_eq!(grid.cell(7, 8).and_then(Cell::as_number), Some(495.0));
        assert_eq!(grid.width(), ReportLayout::Branch.column_widths().len());
    }

    #[test]
    fn test_summary_without_optional_rows() {
        let ledger = accumulate(StockPair::default(), vec![record("x", None, [1.0, 1.0, 0.0, 0.0])]);
        let grid = assemble(ReportLayout::Tank, &metadata(day(), "TQ"), &ledger, Some(&summary()));

        let tail: Vec<_> = grid.rows[grid.data_rows.end..]
            .iter()
            .map(|row| row.first().and_then(Cell::as_text).unwrap_or(""))
            .collect();
        assert_eq!(tail, vec!["", "Resumo", "Estoque Inicial (20ºC)", "Estoque Final Calculado (20ºC)"]);
        assert!(grid.rows[grid.data_rows.end].is_empty());

        let initial = &grid.rows[grid.data_rows.end + 2];
        assert_eq!(initial[1], Cell::plain(98.0));
    }

    #[test]
    fn test_summary_reconciliation_and_zero_delta() {
        let ledger = accumulate(StockPair::default(), vec![record("x", None, [1.0, 1.0, 0.0, 0.0])]);
        let mut summary = summary();
        summary.reconciliation = Some(StockPair::new(0.0, 120.0));
        summary.delta = Some(StockDelta { amount: 0.0, is_surplus: false });

        let grid = assemble(ReportLayout::Tank, &metadata(day(), "TQ"), &ledger, Some(&summary));
        let last_two = &grid.rows[grid.rows.len() - 2..];

        assert_eq!(last_two[0], vec![Cell::text("Saldo do CACL (20ºC)"), Cell::plain(120.0)]);
        assert_eq!(last_two[1], vec![Cell::text("Perda (20ºC)"), Cell::plain(0.0)]);
    }

    #[test]
    fn test_delta_label_follows_flag_not_sign() {
        let ledger = accumulate(StockPair::default(), vec![record("x", None, [1.0, 1.0, 0.0, 0.0])]);
        let mut summary = summary();
        summary.delta = Some(StockDelta { amount: -35.0, is_surplus: true });

        let grid = assemble(ReportLayout::Tank, &metadata(day(), "TQ"), &ledger, Some(&summary));
        let last = grid.rows.last().unwrap();
        assert_eq!(last[0], Cell::text("Sobra (20ºC)"));
        assert_eq!(last[1], Cell::plain(-35.0));
    }
}
