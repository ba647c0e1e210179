// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::invoices::{InvoiceBook, invoice_by_number};
use crate::models::{Invoice, InvoiceStatus};
use crate::utils::{fmt_amount, maybe_print_json, non_empty, parse_amount, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, params};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let number = sub.get_one::<String>("number").unwrap().trim();
            let amount = parse_amount(sub.get_one::<String>("amount").unwrap())?;
            let client = non_empty(sub.get_one::<String>("client").map(|s| s.as_str()));
            let status = sub
                .get_one::<String>("status")
                .map(|s| s.parse::<InvoiceStatus>())
                .transpose()?
                .unwrap_or(InvoiceStatus::Sent);
            conn.execute(
                "INSERT INTO invoices(invoice_number, total_amount, status, client_name) VALUES (?1, ?2, ?3, ?4)",
                params![number, amount, status, client],
            )?;
            println!(
                "Added invoice '{}' for {} ({})",
                number,
                fmt_amount(amount),
                status
            );
        }
        Some(("list", sub)) => {
            let data: Vec<Invoice> = match sub.get_one::<String>("status") {
                Some(s) => conn.find_by_status(s.parse()?)?,
                None => {
                    let sql = format!("SELECT {} FROM invoices ORDER BY id", Invoice::COLUMNS);
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map([], Invoice::from_row)?;
                    rows.collect::<rusqlite::Result<_>>()?
                }
            };
            if !maybe_print_json(sub.get_flag("json"), false, &data)? {
                let rows = data
                    .iter()
                    .map(|i| {
                        vec![
                            i.id.to_string(),
                            i.invoice_number.clone(),
                            fmt_amount(i.total_amount),
                            i.status.to_string(),
                            i.client_name.clone().unwrap_or_default(),
                            i.paid_at.clone().unwrap_or_default(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Number", "Total", "Status", "Client", "Paid"], rows)
                );
            }
        }
        Some(("status", sub)) => {
            let number = sub.get_one::<String>("number").unwrap().trim();
            let status: InvoiceStatus = sub.get_one::<String>("set").unwrap().parse()?;
            let inv = invoice_by_number(conn, number)?;
            conn.set_status(inv.id, status)?;
            println!("Invoice '{}': {} -> {}", number, inv.status, status);
        }
        _ => {}
    }
    Ok(())
}
