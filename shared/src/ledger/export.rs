use rust_xlsxwriter::{Format, FormatAlign, Workbook};

use crate::ledger::period::ReportPeriod;
use crate::ledger::report::{Cell, ReportGrid, GROUPED_THOUSANDS};
use crate::utils::sanitize_filename;
use crate::ServiceResult;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A spreadsheet ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Serialize the grid into a single-sheet xlsx document held in memory.
pub fn encode_workbook(grid: &ReportGrid, sheet_name: &str, column_widths: &[f64]) -> ServiceResult<Vec<u8>> {
    let mut workbook = Workbook::new();

    let mut number_format = Format::new().set_num_format(GROUPED_THOUSANDS);
    if grid.layout.centers_numbers() {
        number_format = number_format.set_align(FormatAlign::Center);
    }

    {
        let worksheet = workbook.add_worksheet().set_name(sheet_name)?;

        for (r, row) in grid.rows.iter().enumerate() {
            let row32 = r as u32;
            for (c, cell) in row.iter().enumerate() {
                let col16 = c as u16;
                match cell {
                    Cell::Text(s) => {
                        worksheet.write_string(row32, col16, s)?;
                    }
                    Cell::Number { value, grouped: true } => {
                        worksheet.write_number_with_format(row32, col16, *value, &number_format)?;
                    }
                    Cell::Number { value, grouped: false } => {
                        worksheet.write_number(row32, col16, *value)?;
                    }
                }
            }
        }

        for (c, width) in column_widths.iter().enumerate() {
            worksheet.set_column_width(c as u16, *width)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    tracing::debug!("Encoded {} rows into {} bytes", grid.rows.len(), bytes.len());
    Ok(bytes)
}

/// Encode with the widths and sheet name of the grid's layout.
pub fn export_grid(grid: &ReportGrid, filename: String) -> ServiceResult<ExportFile> {
    let bytes = encode_workbook(grid, grid.layout.sheet_name(), grid.layout.column_widths())?;
    Ok(ExportFile { filename, bytes })
}

pub fn tank_filename(reference: &str) -> String {
    format!("estoque_tanque_{}.xlsx", sanitize_filename(reference))
}

pub fn branch_filename(location: &str, period: &ReportPeriod) -> String {
    let location = sanitize_filename(location);
    if location.is_empty() {
        format!("estoque_{}.xlsx", period.file_tag())
    } else {
        format!("estoque_{}_{}.xlsx", location, period.file_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance::{accumulate, StockPair};
    use crate::ledger::normalize::MovementRecord;
    use crate::ledger::report::{assemble, ReportLayout, ReportMetadata};
    use chrono::{NaiveDate, Utc};
    use std::io::{Cursor, Read};

    fn sample_grid(layout: ReportLayout) -> ReportGrid {
        let record = MovementRecord {
            timestamp: None,
            timestamp_text: "2024-05-10".to_string(),
            product: Some("Diesel".to_string()),
            label: "Cliente".to_string(),
            in_ambient: 1234.0,
            in_standard: 1200.0,
            out_ambient: 0.0,
            out_standard: 0.0,
        };
        let ledger = accumulate(StockPair::default(), vec![record]);
        let metadata = ReportMetadata {
            reference: "TQ 01".to_string(),
            location: "Base Sul".to_string(),
            period: ReportPeriod::Day(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()),
            generated_at: Utc::now(),
        };
        assemble(layout, &metadata, &ledger, None)
    }

    #[test]
    fn test_encode_produces_xlsx_archive() {
        for layout in [ReportLayout::Tank, ReportLayout::Branch] {
            let grid = sample_grid(layout);
            let bytes = encode_workbook(&grid, layout.sheet_name(), layout.column_widths()).unwrap();
            // xlsx is a zip container
            assert_eq!(&bytes[..2], b"PK");
            assert!(bytes.len() > 1000);
        }
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_grouped_format_in_encoded_styles() {
        let grid = sample_grid(ReportLayout::Tank);
        let bytes = encode_workbook(&grid, "Estoque Tanque", ReportLayout::Tank.column_widths()).unwrap();

        // `#,##0` is built-in number format 3; a custom entry would carry the code.
        let styles = read_part(&bytes, "xl/styles.xml");
        assert!(
            styles.contains("numFmtId=\"3\"") || styles.contains("formatCode=\"#,##0\""),
            "{}",
            styles
        );

        let workbook = read_part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains("name=\"Estoque Tanque\""));

        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<v>1234</v>"));
    }

    #[test]
    fn test_export_grid_keeps_filename() {
        let file = export_grid(&sample_grid(ReportLayout::Tank), tank_filename("TQ 01")).unwrap();
        assert_eq!(file.filename, "estoque_tanque_TQ_01.xlsx");
        assert!(!file.bytes.is_empty());
    }

    #[test]
    fn test_filenames() {
        let month = ReportPeriod::Month(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(tank_filename(" TQ 07 "), "estoque_tanque_TQ_07.xlsx");
        assert_eq!(branch_filename("Base Sul", &month), "estoque_Base_Sul_05-2024.xlsx");
        assert_eq!(branch_filename("", &month), "estoque_05-2024.xlsx");
    }
}
