//! Stock ledger report pipeline: normalize raw movements, carry the running
//! balance, lay the result out as a grid and encode it as xlsx.

pub mod balance;
pub mod export;
pub mod normalize;
pub mod period;
pub mod report;

pub use balance::{accumulate, BalancedLedger, LedgerRow, RunningBalance, StockPair};
pub use export::{branch_filename, encode_workbook, export_grid, tank_filename, ExportFile, XLSX_CONTENT_TYPE};
pub use normalize::{normalize_all, resolve_label, MovementRecord};
pub use period::ReportPeriod;
pub use report::{assemble, Cell, ReportGrid, ReportLayout, ReportMetadata, ReportSummary, StockDelta};
