// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;
use serde_json::json;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("payments", sub)) => export_payments(conn, sub),
        _ => Ok(()),
    }
}

fn export_payments(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();

    let mut stmt = conn.prepare(
        "SELECT p.id, p.payment_date, p.amount, p.payer_name, p.reference_number, p.bank_name,
                p.status, i.invoice_number, p.import_batch_id
         FROM payments p
         LEFT JOIN invoices i ON p.invoice_id=i.id
         ORDER BY p.payment_date, p.id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, i64>(2)?,
            r.get::<_, Option<String>>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, String>(6)?,
            r.get::<_, Option<String>>(7)?,
            r.get::<_, i64>(8)?,
        ))
    })?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id", "payment_date", "amount", "payer_name", "reference_number", "bank_name",
                "status", "invoice_number", "import_batch_id",
            ])?;
            for row in rows {
                let (id, d, amt, payer, reference, bank, status, inv, batch) = row?;
                wtr.write_record([
                    id.to_string(),
                    d,
                    amt.to_string(),
                    payer.unwrap_or_default(),
                    reference.unwrap_or_default(),
                    bank.unwrap_or_default(),
                    status,
                    inv.unwrap_or_default(),
                    batch.to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let mut items = Vec::new();
            for row in rows {
                let (id, d, amt, payer, reference, bank, status, inv, batch) = row?;
                items.push(json!({
                    "id": id, "payment_date": d, "amount": amt, "payer_name": payer,
                    "reference_number": reference, "bank_name": bank, "status": status,
                    "invoice_number": inv, "import_batch_id": batch
                }));
            }
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => {
            return Err(anyhow::anyhow!("Unknown format: {} (use csv|json)", fmt));
        }
    }
    println!("Exported payments to {}", out);
    Ok(())
}
