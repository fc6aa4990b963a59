//! Spreadsheet export of student records.

use crate::record::StudentRecord;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet, XlsxError};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const HEADERS: [&str; 6] = ["NAME", "ID", "BRANCH", "STATUS", "TOTAL", "LAST MARKED"];
const TOTAL_COLUMN: usize = 4;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("xlsx: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    /// Format implied by the file extension, if recognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unsupported export format {other:?} (expected xlsx or csv)")),
        }
    }
}

/// One data row, in `HEADERS` order.
pub fn record_row(record: &StudentRecord) -> [String; 6] {
    [
        record.name.clone(),
        record.id.clone(),
        record.branch.clone(),
        record.status.map(|s| s.code().to_string()).unwrap_or_default(),
        record.total_attendance.to_string(),
        record.last_attendance_time.clone(),
    ]
}

/// Write a header row plus one row per record. Returns the number of data rows.
pub fn export_records(
    records: &BTreeMap<String, StudentRecord>,
    path: &Path,
    format: ExportFormat,
) -> Result<usize, ExportError> {
    match format {
        ExportFormat::Xlsx => write_xlsx(records.values(), path)?,
        ExportFormat::Csv => write_csv(records.values(), path)?,
    }
    tracing::info!(path = %path.display(), ?format, rows = records.len(), "records exported");
    Ok(records.len())
}

fn write_csv<'a>(records: impl Iterator<Item = &'a StudentRecord>, path: &Path) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(HEADERS)?;
    for record in records {
        wtr.write_record(record_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_xlsx<'a>(records: impl Iterator<Item = &'a StudentRecord>, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name("Students")?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0xFFFFFF))
        .set_background_color(Color::RGB(0x2F75B5))
        .set_pattern(FormatPattern::Solid)
        .set_border(FormatBorder::Thin);

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_with_format(0, col as u16, *header, &header_format)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();
    let bands = [Color::RGB(0xEAF3FB), Color::RGB(0xFFFFFF)];

    for (i, record) in records.enumerate() {
        let row = (i + 1) as u32;
        let band = bands[i % 2];
        for (col, value) in record_row(record).iter().enumerate() {
            if col == TOTAL_COLUMN {
                write_total(worksheet, row, col as u16, record.total_attendance, band)?;
            } else {
                let fmt = Format::new()
                    .set_background_color(band)
                    .set_pattern(FormatPattern::Solid)
                    .set_border(FormatBorder::Thin);
                worksheet.write_with_format(row, col as u16, value.as_str(), &fmt)?;
            }
            widths[col] = widths[col].max(value.chars().count());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width as f64 + 2.0)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_total(worksheet: &mut Worksheet, row: u32, col: u16, total: u32, band: Color) -> Result<(), XlsxError> {
    let fmt = Format::new()
        .set_align(FormatAlign::Right)
        .set_background_color(band)
        .set_pattern(FormatPattern::Solid)
        .set_border(FormatBorder::Thin);
    worksheet.write_with_format(row, col, f64::from(total), &fmt)?;
    Ok(())
}
