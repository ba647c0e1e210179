// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use payrecon::commands::importer::{self, EncodingChoice, IssueKind};
use payrecon::{ReconcileError, cli, db};
use rusqlite::Connection;
use std::io::Write;
use tempfile::Builder;

fn base_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&mut conn).unwrap();
    conn
}

fn payment_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM payments", [], |r| r.get(0))
        .unwrap()
}

const BANK_CSV: &str = "date,amount,payer,reference,bank\n\
2024-05-10,500000,ACME CORP,INV-100 payment,Mizuho\n\
2024-05-11,100000,Globex,REF-999,MUFG\n";

#[test]
fn imported_payments_start_unmatched_and_unlinked() {
    let mut conn = base_conn();
    let report =
        importer::import_payments(&mut conn, BANK_CSV.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 2);
    assert_eq!(report.skipped_invalid, 0);
    assert_eq!(report.skipped_duplicate, 0);
    assert_eq!(report.encoding, "utf-8");

    let bad: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM payments WHERE status!='unmatched' OR invoice_id IS NOT NULL",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(bad, 0);

    let (payer, reference, bank, batch): (String, String, String, i64) = conn
        .query_row(
            "SELECT payer_name, reference_number, bank_name, import_batch_id FROM payments WHERE amount=500000",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(payer, "ACME CORP");
    assert_eq!(reference, "INV-100 payment");
    assert_eq!(bank, "Mizuho");
    assert_eq!(batch, report.batch_id);
}

#[test]
fn reimporting_same_file_imports_nothing() {
    let mut conn = base_conn();
    importer::import_payments(&mut conn, BANK_CSV.as_bytes(), "bank.csv", EncodingChoice::Auto)
        .unwrap();
    let second =
        importer::import_payments(&mut conn, BANK_CSV.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(second.imported_count, 0);
    assert_eq!(second.skipped_duplicate, 2);
    assert_eq!(second.skipped_invalid, 0);
    assert!(second.issues.iter().all(|i| i.kind == IssueKind::Duplicate));
    assert_eq!(payment_count(&conn), 2);

    let batches: i64 = conn
        .query_row("SELECT COUNT(*) FROM import_batches", [], |r| r.get(0))
        .unwrap();
    assert_eq!(batches, 2);
}

#[test]
fn duplicates_inside_one_file_are_skipped() {
    let mut conn = base_conn();
    let csv = "date,amount,payer,reference,bank\n\
2024-05-10,1000,A,,X\n\
2024-05-10,1000,B,,Y\n\
2024-05-10,1000,C,R-1,Z\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "dup.csv", EncodingChoice::Auto)
            .unwrap();
    // Missing references compare equal to each other.
    assert_eq!(report.imported_count, 2);
    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(report.issues[0].line, 3);
}

#[test]
fn invalid_rows_are_skipped_and_reported_by_line() {
    let mut conn = base_conn();
    let csv = "date,amount,payer,reference,bank\n\
2024-05-01,1000,A,R1,B\n\
,2000,B,R2,B\n\
2024-05-02,abc,C,R3,B\n\
2024-05-03,0,D,R4,B\n\
2024-05-04,\"3,000\",E,R5,B\n\
2024-05-05,-50,F,R6,B\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 2);
    assert_eq!(report.skipped_invalid, 4);
    assert_eq!(report.skipped_duplicate, 0);
    let lines: Vec<u64> = report.issues.iter().map(|i| i.line).collect();
    assert_eq!(lines, vec![3, 4, 5, 7]);
    assert!(report.issues[0].reason.contains("date missing"));
    assert!(report.issues[1].reason.contains("Invalid amount 'abc'"));

    let amount: i64 = conn
        .query_row("SELECT amount FROM payments WHERE reference_number='R5'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(amount, 3000);

    let (rows, imported, invalid): (i64, i64, i64) = conn
        .query_row(
            "SELECT row_count, imported_count, skipped_invalid FROM import_batches WHERE id=?1",
            [report.batch_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!((rows, imported, invalid), (6, 2, 4));
}

#[test]
fn japanese_headers_and_decorated_amounts() {
    let mut conn = base_conn();
    let csv = "取引日,お預り金額,振込人名,整理番号,銀行名\n\
2024/05/10,\"¥1,234,000\",カ)ヤマダ,INV-7,みずほ銀行\n\
2024年05月11日,5000円,スズキ,,りそな銀行\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "nyukin.CSV", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 2);

    let (date, payer, bank): (String, String, String) = conn
        .query_row(
            "SELECT payment_date, payer_name, bank_name FROM payments WHERE amount=1234000",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(date, "2024-05-10");
    assert_eq!(payer, "カ)ヤマダ");
    assert_eq!(bank, "みずほ銀行");

    let reference: Option<String> = conn
        .query_row("SELECT reference_number FROM payments WHERE amount=5000", [], |r| r.get(0))
        .unwrap();
    assert_eq!(reference, None);
}

#[test]
fn shift_jis_file_is_detected_and_decoded() {
    let mut conn = base_conn();
    let text = "日付,金額,振込人,参照番号,銀行\r\n2024-06-01,88000,ｶ)ﾔﾏﾀﾞｼｮｳｼﾞ,INV-42,三井住友\r\n";
    let (bytes, _, had_errors) = encoding_rs::SHIFT_JIS.encode(text);
    assert!(!had_errors);
    assert!(std::str::from_utf8(&bytes).is_err());

    let report =
        importer::import_payments(&mut conn, &bytes, "sjis.csv", EncodingChoice::Auto).unwrap();
    assert_eq!(report.encoding, "shift_jis");
    assert_eq!(report.imported_count, 1);

    let (payer, bank): (String, String) = conn
        .query_row("SELECT payer_name, bank_name FROM payments", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(payer, "ｶ)ﾔﾏﾀﾞｼｮｳｼﾞ");
    assert_eq!(bank, "三井住友");

    let enc: String = conn
        .query_row("SELECT encoding FROM import_batches", [], |r| r.get(0))
        .unwrap();
    assert_eq!(enc, "shift_jis");
}

#[test]
fn declared_utf8_rejects_shift_jis_bytes() {
    let mut conn = base_conn();
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("日付,金額\n2024-06-01,100\n");
    let err = importer::import_payments(&mut conn, &bytes, "sjis.csv", EncodingChoice::Utf8)
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert_eq!(payment_count(&conn), 0);
}

#[test]
fn rejects_non_csv_upload() {
    let mut conn = base_conn();
    let err = importer::import_payments(&mut conn, BANK_CSV.as_bytes(), "bank.xlsx", EncodingChoice::Auto)
        .unwrap_err();
    assert!(err.to_string().contains("Only .csv files"));
}

#[test]
fn file_without_rows_creates_no_batch() {
    let mut conn = base_conn();
    let err = importer::import_payments(
        &mut conn,
        b"date,amount,payer,reference,bank\n",
        "empty.csv",
        EncodingChoice::Auto,
    )
    .unwrap_err();
    assert!(err.to_string().contains("No payment rows"));
    let batches: i64 = conn
        .query_row("SELECT COUNT(*) FROM import_batches", [], |r| r.get(0))
        .unwrap();
    assert_eq!(batches, 0);
}

#[test]
fn unknown_headers_fall_back_to_fixed_columns() {
    let mut conn = base_conn();
    let csv = "c1,c2,c3,c4,c5\n2024-05-10,700,Payer,REF-1,Bank\n2024-05-11,800\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "x.csv", EncodingChoice::Auto).unwrap();
    assert_eq!(report.imported_count, 2);
    let (payer, reference): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT payer_name, reference_number FROM payments WHERE amount=800",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(payer, None);
    assert_eq!(reference, None);
}

#[test]
fn importer_trims_cli_path_argument() {
    let mut conn = base_conn();

    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{}", BANK_CSV).unwrap();
    file.flush().unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let padded = format!("  {}  ", path);
    let cli = cli::build_cli();
    let matches = cli.get_matches_from(["payrecon", "import", "payments", "--path", &padded]);
    if let Some(("import", import_m)) = matches.subcommand() {
        importer::handle(&mut conn, import_m).unwrap();
    } else {
        panic!("no import subcommand");
    }
    assert_eq!(payment_count(&conn), 2);
}

#[test]
fn cli_rejects_unknown_encoding() {
    let mut conn = base_conn();
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{}", BANK_CSV).unwrap();
    file.flush().unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let cli = cli::build_cli();
    let matches = cli.get_matches_from([
        "payrecon",
        "import",
        "payments",
        "--path",
        &path,
        "--encoding",
        "latin1",
    ]);
    if let Some(("import", import_m)) = matches.subcommand() {
        let err = importer::handle(&mut conn, import_m).unwrap_err();
        assert!(err.to_string().contains("Unknown encoding 'latin1'"));
    } else {
        panic!("no import subcommand");
    }
    assert_eq!(payment_count(&conn), 0);
}

#[test]
fn headerless_file_keeps_its_first_payment() {
    let mut conn = base_conn();
    let csv = "2024-05-10,500000,ACME,INV-100,Mizuho\n2024-05-11,600000,Globex,INV-200,MUFG\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 2);
    assert!(report.issues.is_empty());
    assert_eq!(payment_count(&conn), 2);

    let (payer, reference, bank): (String, String, String) = conn
        .query_row(
            "SELECT payer_name, reference_number, bank_name FROM payments WHERE amount=500000",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!((payer.as_str(), reference.as_str(), bank.as_str()), ("ACME", "INV-100", "Mizuho"));

    let rows: i64 = conn
        .query_row("SELECT row_count FROM import_batches", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn headerless_file_reports_bad_rows_by_line() {
    let mut conn = base_conn();
    let csv = "2024-05-10,1000,A,R1,B\n2024-05-11,oops,B,R2,B\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 1);
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.issues[0].line, 2);
}

#[test]
fn number_label_anywhere_in_header_is_the_reference() {
    let mut conn = base_conn();
    let csv = "Transfer No.,Date,Amount,Payer\nT-77,2024-05-10,4500,Initech\n";
    let report =
        importer::import_payments(&mut conn, csv.as_bytes(), "bank.csv", EncodingChoice::Auto)
            .unwrap();
    assert_eq!(report.imported_count, 1);
    let (reference, payer): (String, String) = conn
        .query_row("SELECT reference_number, payer_name FROM payments", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(reference, "T-77");
    assert_eq!(payer, "Initech");
}

#[test]
fn failure_mid_batch_leaves_nothing_behind() {
    let mut conn = base_conn();
    conn.execute_batch(
        "CREATE TRIGGER fail_on_222 BEFORE INSERT ON payments WHEN NEW.amount = 222
         BEGIN SELECT RAISE(ABORT, 'disk gone'); END;",
    )
    .unwrap();
    let csv = "date,amount,payer,reference,bank\n\
2024-05-10,111,A,R1,B\n\
2024-05-11,222,B,R2,B\n\
2024-05-12,333,C,R3,B\n";
    let err = importer::import_payments(&mut conn, csv.as_bytes(), "bank.csv", EncodingChoice::Auto)
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Persistence(_)), "{:?}", err);
    assert!(!err.is_conflict());

    assert_eq!(payment_count(&conn), 0);
    let batches: i64 = conn
        .query_row("SELECT COUNT(*) FROM import_batches", [], |r| r.get(0))
        .unwrap();
    assert_eq!(batches, 0);
}
