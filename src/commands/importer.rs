// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db::write_tx;
use crate::error::{ReconcileError, Result};
use crate::utils::{maybe_print_json, non_empty, parse_amount, parse_date, pretty_table};
use anyhow::Context;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingChoice {
    Auto,
    Utf8,
    ShiftJis,
}

impl FromStr for EncodingChoice {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(EncodingChoice::Auto),
            "utf8" | "utf_8" => Ok(EncodingChoice::Utf8),
            "shift_jis" | "sjis" | "cp932" => Ok(EncodingChoice::ShiftJis),
            other => Err(ReconcileError::Validation(format!(
                "Unknown encoding '{}' (use auto|utf-8|shift_jis)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Invalid,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    /// Line in the source file (header is line 1).
    pub line: u64,
    pub kind: IssueKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub batch_id: i64,
    pub encoding: &'static str,
    pub imported_count: usize,
    pub skipped_invalid: usize,
    pub skipped_duplicate: usize,
    pub issues: Vec<RowIssue>,
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("payments", sub)) => import_file(conn, sub),
        _ => Ok(()),
    }
}

fn import_file(conn: &mut Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let path = Path::new(sub.get_one::<String>("path").unwrap().trim());
    let encoding: EncodingChoice = sub
        .get_one::<String>("encoding")
        .map(|s| s.parse::<EncodingChoice>())
        .transpose()?
        .unwrap_or(EncodingChoice::Auto);
    let bytes = std::fs::read(path).with_context(|| format!("Open CSV {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let report = import_payments(conn, &bytes, &file_name, encoding)?;
    if !maybe_print_json(sub.get_flag("json"), false, &report)? {
        println!(
            "Imported {} payments from {} ({}); skipped {} invalid, {} duplicate",
            report.imported_count,
            path.display(),
            report.encoding,
            report.skipped_invalid,
            report.skipped_duplicate
        );
        if !report.issues.is_empty() {
            let rows = report
                .issues
                .iter()
                .map(|i| {
                    vec![
                        i.line.to_string(),
                        format!("{:?}", i.kind).to_lowercase(),
                        i.reason.clone(),
                    ]
                })
                .collect();
            println!("{}", pretty_table(&["Line", "Issue", "Detail"], rows));
        }
    }
    Ok(())
}

/// Import one uploaded bank file as a single batch. Every new row lands as
/// an `unmatched` payment; bad and duplicate rows are reported, not fatal.
/// The whole batch commits or nothing does.
pub fn import_payments(
    conn: &mut Connection,
    bytes: &[u8],
    file_name: &str,
    encoding: EncodingChoice,
) -> Result<ImportReport> {
    if !file_name.to_ascii_lowercase().ends_with(".csv") {
        return Err(ReconcileError::Validation(format!(
            "Only .csv files can be imported, got '{}'",
            file_name
        )));
    }
    let (text, encoding_used) = decode_payload(bytes, encoding)?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut records = rdr.records();
    let first = match records.next() {
        Some(first) => first?,
        None => {
            return Err(ReconcileError::Validation(format!(
                "No payment rows found in '{}'",
                file_name
            )));
        }
    };
    // Bank exports in the fixed layout may come without a header row.
    let (columns, leading_row) = if ColumnMap::is_fixed_layout_row(&first) {
        debug!("no header row, using fixed column layout");
        (ColumnMap::fixed(), Some(first))
    } else {
        (ColumnMap::detect(&first), None)
    };
    debug!(?columns, "detected payment columns");

    let tx = write_tx(conn)?;
    tx.execute(
        "INSERT INTO import_batches(file_name, encoding) VALUES (?1, ?2)",
        params![file_name, encoding_used],
    )?;
    let batch_id = tx.last_insert_rowid();

    let mut row_count = 0usize;
    let mut imported = 0usize;
    let mut issues = Vec::new();

    for result in leading_row.into_iter().map(Ok).chain(records) {
        row_count += 1;
        let rec = match result {
            Ok(rec) => rec,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                warn!(line, %err, "unreadable payment row");
                issues.push(RowIssue {
                    line,
                    kind: IssueKind::Invalid,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let line = rec.position().map(|p| p.line()).unwrap_or(0);

        let row = match columns.extract(&rec) {
            Ok(row) => row,
            Err(err) => {
                warn!(line, %err, "skipping invalid payment row");
                issues.push(RowIssue {
                    line,
                    kind: IssueKind::Invalid,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM payments
                 WHERE payment_date=?1 AND amount=?2 AND reference_number IS ?3 LIMIT 1",
                params![row.payment_date, row.amount, row.reference_number],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            let err = ReconcileError::Duplicate(format!(
                "{} {} {} already imported as payment {}",
                row.payment_date,
                row.amount,
                row.reference_number.as_deref().unwrap_or("-"),
                existing
            ));
            debug!(line, %err, "skipping duplicate payment row");
            issues.push(RowIssue {
                line,
                kind: IssueKind::Duplicate,
                reason: err.to_string(),
            });
            continue;
        }

        tx.execute(
            "INSERT INTO payments(payment_date, amount, payer_name, reference_number, bank_name, import_batch_id, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.payment_date,
                row.amount,
                row.payer_name,
                row.reference_number,
                row.bank_name,
                batch_id,
                row.notes
            ],
        )?;
        imported += 1;
    }

    if row_count == 0 {
        return Err(ReconcileError::Validation(format!(
            "No payment rows found in '{}'",
            file_name
        )));
    }

    let skipped_invalid = issues.iter().filter(|i| i.kind == IssueKind::Invalid).count();
    let skipped_duplicate = issues.len() - skipped_invalid;
    tx.execute(
        "UPDATE import_batches SET row_count=?1, imported_count=?2, skipped_invalid=?3, skipped_duplicate=?4
         WHERE id=?5",
        params![
            row_count as i64,
            imported as i64,
            skipped_invalid as i64,
            skipped_duplicate as i64,
            batch_id
        ],
    )?;
    tx.commit()?;

    info!(
        batch_id,
        file_name,
        encoding = encoding_used,
        imported,
        skipped_invalid,
        skipped_duplicate,
        "payment import committed"
    );
    Ok(ImportReport {
        batch_id,
        encoding: encoding_used,
        imported_count: imported,
        skipped_invalid,
        skipped_duplicate,
        issues,
    })
}

/// Decode the upload, preferring UTF-8 and falling back to Shift_JIS when the
/// bytes are not clean UTF-8.
pub fn decode_payload(bytes: &[u8], choice: EncodingChoice) -> Result<(Cow<'_, str>, &'static str)> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match choice {
        EncodingChoice::Utf8 => std::str::from_utf8(body)
            .map(|s| (Cow::Borrowed(s), "utf-8"))
            .map_err(|e| ReconcileError::Validation(format!("File is not valid UTF-8: {}", e))),
        EncodingChoice::ShiftJis => Ok((decode_sjis(bytes), "shift_jis")),
        EncodingChoice::Auto => match std::str::from_utf8(body) {
            Ok(s) if !s.contains('\u{FFFD}') => Ok((Cow::Borrowed(s), "utf-8")),
            _ => Ok((decode_sjis(bytes), "shift_jis")),
        },
    }
}

fn decode_sjis(bytes: &[u8]) -> Cow<'_, str> {
    let (text, had_errors) = encoding_rs::SHIFT_JIS.decode_without_bom_handling(bytes);
    if had_errors {
        warn!("Shift_JIS decode replaced malformed sequences");
    }
    text
}

#[derive(Debug)]
struct ParsedRow {
    payment_date: NaiveDate,
    amount: i64,
    payer_name: Option<String>,
    reference_number: Option<String>,
    bank_name: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub amount: Option<usize>,
    pub payer: Option<usize>,
    pub reference: Option<usize>,
    pub bank: Option<usize>,
    pub notes: Option<usize>,
}

// Checked in this order; "bank_name" must hit bank before "name" hits payer.
static HEADER_PATTERNS: Lazy<[(Field, Regex); 6]> = Lazy::new(|| {
    let re = |p: &str| Regex::new(p).unwrap();
    [
        (Field::Date, re(r"(?i)date|日付|入金日|振込日|取引日")),
        (Field::Amount, re(r"(?i)amount|金額|入金額|振込額|お預り金額")),
        (Field::Bank, re(r"(?i)bank|銀行|金融機関")),
        (Field::Notes, re(r"(?i)note|memo|備考")),
        (Field::Payer, re(r"(?i)payer|name|振込人|依頼人|支払人|名前|摘要")),
        (Field::Reference, re(r"(?i)ref|number|(^|[^a-z])no\.?($|[^a-z])|番号|参照|整理番号")),
    ]
});

#[derive(Debug, Clone, Copy)]
enum Field {
    Date,
    Amount,
    Payer,
    Reference,
    Bank,
    Notes,
}

impl ColumnMap {
    /// Locate columns from header labels; anything not recognised falls back
    /// to the fixed layout date, amount, payer, reference, bank.
    pub fn detect(header: &StringRecord) -> ColumnMap {
        let mut map = ColumnMap::default();
        for (i, label) in header.iter().enumerate() {
            let label = label.trim().trim_start_matches('\u{FEFF}');
            let hit = HEADER_PATTERNS
                .iter()
                .find(|(_, re)| re.is_match(label))
                .map(|(f, _)| *f);
            let slot = match hit {
                Some(Field::Date) => &mut map.date,
                Some(Field::Amount) => &mut map.amount,
                Some(Field::Payer) => &mut map.payer,
                Some(Field::Reference) => &mut map.reference,
                Some(Field::Bank) => &mut map.bank,
                Some(Field::Notes) => &mut map.notes,
                None => continue,
            };
            slot.get_or_insert(i);
        }

        let taken: Vec<usize> = [map.date, map.amount, map.payer, map.reference, map.bank, map.notes]
            .into_iter()
            .flatten()
            .collect();
        let fallback = |slot: &mut Option<usize>, pos: usize| {
            if slot.is_none() && !taken.contains(&pos) && pos < header.len() {
                *slot = Some(pos);
            }
        };
        fallback(&mut map.date, 0);
        fallback(&mut map.amount, 1);
        fallback(&mut map.payer, 2);
        fallback(&mut map.reference, 3);
        fallback(&mut map.bank, 4);
        map
    }

    /// The fixed layout date, amount, payer, reference, bank.
    pub fn fixed() -> ColumnMap {
        ColumnMap {
            date: Some(0),
            amount: Some(1),
            payer: Some(2),
            reference: Some(3),
            bank: Some(4),
            notes: None,
        }
    }

    /// A first row that already reads as a payment in the fixed layout is
    /// data, not a header.
    pub fn is_fixed_layout_row(rec: &StringRecord) -> bool {
        let date_ok = rec.get(0).is_some_and(|s| parse_date(s).is_ok());
        let amount_ok = rec.get(1).is_some_and(|s| parse_amount(s).is_ok());
        date_ok && amount_ok
    }

    fn extract(&self, rec: &StringRecord) -> Result<ParsedRow> {
        let field = |idx: Option<usize>| idx.and_then(|i| rec.get(i));

        let date_raw = field(self.date)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ReconcileError::Validation("payment date missing".into()))?;
        let amount_raw = field(self.amount)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ReconcileError::Validation("amount missing".into()))?;

        Ok(ParsedRow {
            payment_date: parse_date(date_raw)?,
            amount: parse_amount(amount_raw)?,
            payer_name: non_empty(field(self.payer)),
            reference_number: non_empty(field(self.reference)),
            bank_name: non_empty(field(self.bank)),
            notes: non_empty(field(self.notes)),
        })
    }
}
