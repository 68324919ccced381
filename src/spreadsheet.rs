// 📊 Spreadsheet Codec - XLSX out to the operator, XLSX back in
//
// Columns are fixed and located by header name on the way back in.
// Dates travel as text in ledger format; ids and amounts as numbers so the
// operator can edit them as numbers.

use crate::dates::LedgerDateTime;
use crate::records::TransactionRecord;
use crate::validation::ValidationError;
use calamine::{Data, Reader, Xlsx, XlsxError as CalamineError};
use chrono::{TimeDelta, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

pub const SHEET_NAME: &str = "Transactions";

pub const COL_LOAN_ID: &str = "Loan ID";
pub const COL_TRANSACTION_ID: &str = "Transaction ID";
pub const COL_DATE: &str = "Transaction Date";
pub const COL_AMOUNT: &str = "Transaction Amount";
pub const COL_PAYMENT_TYPE: &str = "Payment Type ID";
pub const COL_CHANNEL_TYPE: &str = "Channel Type ID";

pub const HEADERS: [&str; 6] = [
    COL_LOAN_ID,
    COL_TRANSACTION_ID,
    COL_DATE,
    COL_AMOUNT,
    COL_PAYMENT_TYPE,
    COL_CHANNEL_TYPE,
];

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not write spreadsheet: {0}")]
    Write(#[from] XlsxError),

    #[error("could not read spreadsheet: {0}")]
    Unreadable(String),

    #[error("spreadsheet has {} problem(s), first: {}", .errors.len(), first_error(.errors))]
    Invalid {
        errors: Vec<ValidationError>,
        valid_rows: usize,
        invalid_rows: usize,
    },
}

fn first_error(errors: &[ValidationError]) -> String {
    errors.first().map(|e| e.to_string()).unwrap_or_default()
}

// ============================================================================
// ENCODE
// ============================================================================

pub fn encode(records: &[TransactionRecord]) -> Result<Vec<u8>, CodecError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in HEADERS.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *title, &bold)?;
        sheet.set_column_width(col, if *title == COL_DATE { 28 } else { 20 })?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_number(row, 0, record.loan_id as f64)?;
        sheet.write_number(row, 1, record.transaction_id as f64)?;
        sheet.write_string(row, 2, record.transaction_date.to_ledger_string())?;
        sheet.write_number_with_format(
            row,
            3,
            record.transaction_amount.to_f64().unwrap_or_default(),
            &money,
        )?;
        sheet.write_number(row, 4, record.payment_type_id as f64)?;
        sheet.write_number(row, 5, record.channel_type_id as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

// ============================================================================
// DECODE
// ============================================================================

/// Column index for each of `HEADERS`, in `HEADERS` order
struct ColumnMap([usize; 6]);

impl ColumnMap {
    fn locate(header: &[Data]) -> Result<Self, Vec<ValidationError>> {
        let names: Vec<String> = header.iter().map(|c| c.to_string().trim().to_string()).collect();
        let mut found = [0usize; 6];
        let mut missing = Vec::new();

        for (i, title) in HEADERS.iter().enumerate() {
            match names.iter().position(|n| n == title) {
                Some(col) => found[i] = col,
                None => missing.push(ValidationError::sheet(title, "required column is missing")),
            }
        }

        if missing.is_empty() {
            Ok(ColumnMap(found))
        } else {
            Err(missing)
        }
    }

    fn cell<'a>(&self, row: &'a [Data], which: usize) -> Option<&'a Data> {
        row.get(self.0[which])
    }
}

/// A decoded record and the 1-based sheet row it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub line: usize,
    pub record: TransactionRecord,
}

/// Parse a sheet produced by `encode` and edited by a human.
///
/// Every bad cell is reported, not just the first one.
pub fn decode(bytes: &[u8]) -> Result<Vec<TransactionRecord>, CodecError> {
    Ok(decode_rows(bytes)?.into_iter().map(|row| row.record).collect())
}

/// Like `decode`, keeping each record's sheet row number.
pub fn decode_rows(bytes: &[u8]) -> Result<Vec<SheetRow>, CodecError> {
    let mut workbook =
        Xlsx::new(Cursor::new(bytes)).map_err(|e: CalamineError| CodecError::Unreadable(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CodecError::Unreadable("workbook has no worksheets".to_string()))?
        .map_err(|e| CodecError::Unreadable(e.to_string()))?;

    // The used range can start below row 1 if the top rows were cleared.
    let header_line = range.start().map_or(1, |(row, _)| row as usize + 1);
    let mut rows = range.rows();
    let columns = match rows.next() {
        Some(header) => ColumnMap::locate(header),
        None => Err(HEADERS
            .iter()
            .map(|title| ValidationError::sheet(title, "required column is missing"))
            .collect()),
    }
    .map_err(|errors| CodecError::Invalid {
        errors,
        valid_rows: 0,
        invalid_rows: 0,
    })?;

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut invalid_rows = 0;

    for (i, row) in rows.enumerate() {
        let line = header_line + i + 1;
        if row.iter().all(is_blank) {
            continue;
        }
        match parse_row(row, &columns, line) {
            Ok(record) => records.push(SheetRow { line, record }),
            Err(mut row_errors) => {
                invalid_rows += 1;
                errors.append(&mut row_errors);
            }
        }
    }

    if errors.is_empty() {
        Ok(records)
    } else {
        Err(CodecError::Invalid {
            errors,
            valid_rows: records.len(),
            invalid_rows,
        })
    }
}

fn parse_row(row: &[Data], columns: &ColumnMap, line: usize) -> Result<TransactionRecord, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let loan_id = note(&mut errors, line, 0, parse_int(columns.cell(row, 0)));
    let transaction_id = note(&mut errors, line, 1, parse_int(columns.cell(row, 1)));
    let transaction_date = note(&mut errors, line, 2, parse_date(columns.cell(row, 2)));
    let transaction_amount = note(&mut errors, line, 3, parse_amount(columns.cell(row, 3)));
    let payment_type_id = note(&mut errors, line, 4, parse_int(columns.cell(row, 4)));
    let channel_type_id = note(&mut errors, line, 5, parse_int(columns.cell(row, 5)));

    match (loan_id, transaction_id, transaction_date, transaction_amount, payment_type_id, channel_type_id) {
        (Some(loan_id), Some(transaction_id), Some(transaction_date), Some(transaction_amount), Some(payment_type_id), Some(channel_type_id)) => {
            Ok(TransactionRecord {
                loan_id,
                transaction_id,
                transaction_date,
                transaction_amount,
                payment_type_id,
                channel_type_id,
            })
        }
        _ => Err(errors),
    }
}

/// Keep the value, or file the message under the column's header name.
fn note<T>(errors: &mut Vec<ValidationError>, line: usize, column: usize, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(message) => {
            errors.push(ValidationError::at_row(line, HEADERS[column], message));
            None
        }
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn parse_int(cell: Option<&Data>) -> Result<i64, String> {
    match cell {
        None | Some(Data::Empty) => Err("is empty".to_string()),
        Some(Data::Int(i)) => Ok(*i),
        Some(Data::Float(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(*f as i64),
        Some(Data::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Err("is empty".to_string());
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| format!("{s:?} is not a whole number"))
        }
        Some(other) => Err(format!("{other:?} is not a whole number")),
    }
}

fn parse_amount(cell: Option<&Data>) -> Result<Decimal, String> {
    match cell {
        None | Some(Data::Empty) => Err("is empty".to_string()),
        Some(Data::Int(i)) => Ok(Decimal::from(*i)),
        // f64's Display is the shortest string that round-trips, so 150.75
        // comes back as exactly 150.75
        Some(Data::Float(f)) => Decimal::from_str(&f.to_string()).map_err(|_| format!("{f} is not a valid amount")),
        Some(Data::String(s)) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                return Err("is empty".to_string());
            }
            Decimal::from_str(&cleaned).map_err(|_| format!("{:?} is not numeric", s.trim()))
        }
        Some(other) => Err(format!("{other:?} is not numeric")),
    }
}

fn parse_date(cell: Option<&Data>) -> Result<LedgerDateTime, String> {
    match cell {
        None | Some(Data::Empty) => Err("is empty".to_string()),
        Some(Data::String(s)) | Some(Data::DateTimeIso(s)) => LedgerDateTime::parse(s).map_err(|e| e.to_string()),
        // The editor turned the text into a real date cell
        Some(Data::DateTime(dt)) => dt
            .as_datetime()
            .and_then(|naive| (naive + TimeDelta::milliseconds(500)).with_nanosecond(0))
            .map(LedgerDateTime::new)
            .ok_or_else(|| format!("{dt:?} is not a valid date")),
        Some(other) => Err(format!("{other:?} is not a date")),
    }
}
