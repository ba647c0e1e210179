// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{ReconcileError, Result};
use crate::models::{PaymentRecord, PaymentStatus};
use crate::utils::{fmt_amount, maybe_print_json, pretty_table};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 200;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let query = PaymentQuery {
        status: sub
            .get_one::<String>("status")
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()?,
        page: *sub.get_one::<usize>("page").unwrap_or(&1),
        per_page: *sub.get_one::<usize>("per_page").unwrap_or(&DEFAULT_PER_PAGE),
    };
    let page = list_payments(conn, &query)?;
    if jsonl_flag {
        maybe_print_json(false, true, &page.items)?;
        return Ok(());
    }
    if !maybe_print_json(json_flag, false, &page)? {
        let rows: Vec<Vec<String>> = page
            .items
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.payment_date.clone(),
                    fmt_amount(r.amount),
                    r.payer_name.clone().unwrap_or_default(),
                    r.reference_number.clone().unwrap_or_default(),
                    r.bank_name.clone().unwrap_or_default(),
                    r.status.to_string(),
                    r.invoice_number.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Date", "Amount", "Payer", "Reference", "Bank", "Status", "Invoice"],
                rows,
            )
        );
        println!("Page {}/{} ({} payments)", page.page, page.pages.max(1), page.total);
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let id = crate::utils::parse_id(sub.get_one::<String>("id").unwrap())?;
    let rec = get_payment(conn, id)?;
    let events = crate::audit::events_for(conn, id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "payment": rec, "events": events }))?
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for PaymentQuery {
    fn default() -> Self {
        PaymentQuery {
            status: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRow {
    pub id: i64,
    pub invoice_id: Option<i64>,
    pub invoice_number: Option<String>,
    pub payment_date: String,
    pub amount: i64,
    pub payer_name: Option<String>,
    pub reference_number: Option<String>,
    pub bank_name: Option<String>,
    pub status: PaymentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}

pub fn get_payment(conn: &Connection, id: i64) -> Result<PaymentRecord> {
    let sql = format!("SELECT {} FROM payments WHERE id=?1", PaymentRecord::COLUMNS);
    conn.query_row(&sql, params![id], PaymentRecord::from_row)
        .optional()?
        .ok_or_else(|| ReconcileError::NotFound(format!("Payment {}", id)))
}

/// Newest payments first, optionally narrowed to one status.
pub fn list_payments(conn: &Connection, q: &PaymentQuery) -> Result<Page<PaymentRow>> {
    if q.page == 0 {
        return Err(ReconcileError::Validation("page starts at 1".into()));
    }
    if q.per_page == 0 || q.per_page > MAX_PER_PAGE {
        return Err(ReconcileError::Validation(format!(
            "per_page must be within 1..={}",
            MAX_PER_PAGE
        )));
    }

    let filter = if q.status.is_some() { " WHERE p.status=?1" } else { "" };
    let total: i64 = match q.status {
        Some(s) => conn.query_row(
            &format!("SELECT COUNT(*) FROM payments p{}", filter),
            params![s],
            |r| r.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM payments p", [], |r| r.get(0))?,
    };

    let sql = format!(
        "SELECT p.id, p.invoice_id, i.invoice_number, p.payment_date, p.amount, p.payer_name,
                p.reference_number, p.bank_name, p.status, p.notes
         FROM payments p LEFT JOIN invoices i ON p.invoice_id=i.id{}
         ORDER BY p.payment_date DESC, p.id DESC LIMIT {} OFFSET {}",
        filter,
        q.per_page,
        (q.page - 1) * q.per_page
    );
    let mut stmt = conn.prepare(&sql)?;
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<PaymentRow> {
        Ok(PaymentRow {
            id: r.get(0)?,
            invoice_id: r.get(1)?,
            invoice_number: r.get(2)?,
            payment_date: r.get(3)?,
            amount: r.get(4)?,
            payer_name: r.get(5)?,
            reference_number: r.get(6)?,
            bank_name: r.get(7)?,
            status: r.get(8)?,
            notes: r.get(9)?,
        })
    };
    let rows = match q.status {
        Some(s) => stmt.query_map(params![s], map_row)?,
        None => stmt.query_map([], map_row)?,
    };
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }

    let total = total as usize;
    Ok(Page {
        items,
        total,
        page: q.page,
        per_page: q.per_page,
        pages: total.div_ceil(q.per_page),
    })
}
