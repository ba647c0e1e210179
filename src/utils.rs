// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{ReconcileError, Result};
use anyhow::Context;
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use unicode_normalization::UnicodeNormalization;

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%m/%d/%Y", "%Y%m%d"];

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ReconcileError::Validation(format!("Invalid date '{}'", s)))
}

/// Parse a bank amount such as `¥1,234,000` or `500000円` into minor units.
pub fn parse_amount(s: &str) -> Result<i64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '¥' | '￥' | '円' | ' '))
        .collect();
    let d = cleaned
        .parse::<Decimal>()
        .map_err(|_| ReconcileError::Validation(format!("Invalid amount '{}'", s.trim())))?;
    if !d.fract().is_zero() {
        return Err(ReconcileError::Validation(format!(
            "Amount '{}' has a fractional part",
            s.trim()
        )));
    }
    let v = d
        .to_i64()
        .ok_or_else(|| ReconcileError::Validation(format!("Amount '{}' out of range", s.trim())))?;
    if v <= 0 {
        return Err(ReconcileError::Validation(format!(
            "Amount must be positive, got {}",
            v
        )));
    }
    Ok(v)
}

pub fn parse_id(s: &str) -> anyhow::Result<i64> {
    s.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid id '{}'", s))
}

/// Empty or whitespace-only becomes `None`.
pub fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn fmt_amount(v: i64) -> String {
    let digits = v.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if v < 0 { format!("-{}", out) } else { out }
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> anyhow::Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

// Company-type markers as they appear on bank statements, already in NFKC form
// (half-width ｶ) folds to カ) before we get here).
const COMPANY_MARKERS: [&str; 8] = [
    "株式会社", "有限会社", "合同会社", "(株)", "(有)", "(合)", "カ)", "ユ)",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Fold a payer or company name into a comparable key: NFKC, company-type
/// markers removed, whitespace removed, Latin uppercased.
pub fn normalize_company_name(name: &str) -> String {
    let mut s: String = name.trim().nfkc().collect();
    for marker in COMPANY_MARKERS {
        s = s.replace(marker, "");
    }
    WHITESPACE.replace_all(&s, "").to_uppercase()
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// 1.0 for identical strings, 0.0 for nothing in common.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}
