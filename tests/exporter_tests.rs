// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use payrecon::commands::importer::{self, EncodingChoice};
use payrecon::commands::{doctor, exporter, invoices, matching};
use payrecon::settings::MatchConfig;
use payrecon::{cli, db};
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn base_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&mut conn).unwrap();
    conn.execute(
        "INSERT INTO invoices(invoice_number, total_amount, status) VALUES ('INV-100', 500000, 'sent')",
        [],
    )
    .unwrap();
    importer::import_payments(
        &mut conn,
        b"date,amount,payer,reference,bank\n\
2024-05-10,500000,ACME CORP,INV-100 payment,Mizuho\n\
2024-05-11,100000,Globex,,MUFG\n",
        "bank.csv",
        EncodingChoice::Auto,
    )
    .unwrap();
    matching::auto_match(&mut conn, &MatchConfig::default()).unwrap();
    conn
}

#[test]
fn export_payments_as_json() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("payments.json");
    let out_str = out_path.to_string_lossy().to_string();

    let matches = cli::build_cli().get_matches_from([
        "payrecon", "export", "payments", "--format", "json", "--out", &out_str,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(&conn, export_m).unwrap();
    } else {
        panic!("no export subcommand");
    }

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(
        parsed,
        json!([
            {
                "id": 1, "payment_date": "2024-05-10", "amount": 500000,
                "payer_name": "ACME CORP", "reference_number": "INV-100 payment",
                "bank_name": "Mizuho", "status": "matched",
                "invoice_number": "INV-100", "import_batch_id": 1
            },
            {
                "id": 2, "payment_date": "2024-05-11", "amount": 100000,
                "payer_name": "Globex", "reference_number": null,
                "bank_name": "MUFG", "status": "unmatched",
                "invoice_number": null, "import_batch_id": 1
            }
        ])
    );
}

#[test]
fn export_payments_as_csv() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("payments.csv");
    let out_str = out_path.to_string_lossy().to_string();

    let matches = cli::build_cli().get_matches_from([
        "payrecon", "export", "payments", "--out", &out_str,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(&conn, export_m).unwrap();
    } else {
        panic!("no export subcommand");
    }

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    assert_eq!(
        rdr.headers().unwrap().iter().collect::<Vec<_>>(),
        vec![
            "id", "payment_date", "amount", "payer_name", "reference_number", "bank_name",
            "status", "invoice_number", "import_batch_id"
        ]
    );
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][6], "matched");
    assert_eq!(&rows[0][7], "INV-100");
    assert_eq!(&rows[1][4], "");
}

#[test]
fn invoice_commands_drive_status() {
    let conn = base_conn();
    let matches = cli::build_cli().get_matches_from([
        "payrecon", "invoice", "add", "--number", "INV-200", "--amount", "¥12,000", "--client", "Initech",
    ]);
    if let Some(("invoice", m)) = matches.subcommand() {
        invoices::handle(&conn, m).unwrap();
    } else {
        panic!("no invoice subcommand");
    }
    let (total, status, client): (i64, String, Option<String>) = conn
        .query_row(
            "SELECT total_amount, status, client_name FROM invoices WHERE invoice_number='INV-200'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!((total, status.as_str(), client.as_deref()), (12000, "sent", Some("Initech")));

    let matches = cli::build_cli().get_matches_from([
        "payrecon", "invoice", "status", "--number", "INV-200", "--set", "overdue",
    ]);
    if let Some(("invoice", m)) = matches.subcommand() {
        invoices::handle(&conn, m).unwrap();
    } else {
        panic!("no invoice subcommand");
    }
    let status: String = conn
        .query_row("SELECT status FROM invoices WHERE invoice_number='INV-200'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(status, "overdue");

    let matches = cli::build_cli().get_matches_from([
        "payrecon", "invoice", "status", "--number", "INV-404", "--set", "paid",
    ]);
    if let Some(("invoice", m)) = matches.subcommand() {
        assert!(invoices::handle(&conn, m).is_err());
    } else {
        panic!("no invoice subcommand");
    }
}

#[test]
fn doctor_flags_invoice_moved_under_a_match() {
    let conn = base_conn();
    assert!(doctor::diagnose(&conn).unwrap().is_empty());

    conn.execute("UPDATE invoices SET status='overdue' WHERE invoice_number='INV-100'", [])
        .unwrap();
    let issues = doctor::diagnose(&conn).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0][0], "matched_invoice_not_sent");
}
