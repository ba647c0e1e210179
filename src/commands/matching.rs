// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::audit::{last_event, record_event};
use crate::commands::payments::get_payment;
use crate::db::write_tx;
use crate::error::{ReconcileError, Result};
use crate::invoices::{InvoiceBook, is_claimed, unclaimed_sent};
use crate::models::{
    EventAction, Invoice, InvoiceStatus, MatchCandidate, MatchConfidence, MatchSignal,
    PaymentRecord, PaymentStatus,
};
use crate::settings::{MatchConfig, match_config};
use crate::utils::{
    fmt_amount, maybe_print_json, normalize_company_name, parse_id, pretty_table,
    similarity_ratio,
};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Auto-match rules, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExactAmountAndReference,
    UniqueExactAmount,
    UniqueWithinTolerance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleDecision {
    /// Exactly one candidate; index into the pool.
    Unique(MatchRule, usize),
    Ambiguous(MatchRule, Vec<i64>),
    NoMatch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutoMatchOutcome {
    Matched {
        payment_id: i64,
        invoice_id: i64,
        invoice_number: String,
        rule: MatchRule,
        confidence: MatchConfidence,
    },
    Ambiguous {
        payment_id: i64,
        rule: MatchRule,
        invoice_ids: Vec<i64>,
    },
    Unmatched {
        payment_id: i64,
    },
    Conflict {
        payment_id: i64,
        invoice_id: i64,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoMatchReport {
    pub evaluated: usize,
    pub matched: usize,
    pub ambiguous: usize,
    pub unmatched: usize,
    pub outcomes: Vec<AutoMatchOutcome>,
}

impl AutoMatchReport {
    pub fn message(&self) -> String {
        if self.evaluated == 0 {
            return "No unmatched payments to reconcile".to_string();
        }
        format!(
            "Matched {} of {} unmatched payments; {} ambiguous, {} left unmatched",
            self.matched, self.evaluated, self.ambiguous, self.unmatched
        )
    }
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    match m.subcommand() {
        Some(("auto", sub)) => {
            let cfg = match_config(conn)?;
            let report = auto_match(conn, &cfg)?;
            if !maybe_print_json(sub.get_flag("json"), false, &report)? {
                println!("{}", report.message());
            }
        }
        Some(("manual", sub)) => {
            let payment_id = parse_id(sub.get_one::<String>("payment").unwrap())?;
            let invoice_id = parse_id(sub.get_one::<String>("invoice").unwrap())?;
            let operator = sub.get_one::<String>("operator").map(|s| s.as_str());
            let rec = manual_match(conn, payment_id, invoice_id, operator)?;
            println!("Matched payment {} to invoice {}", rec.id, invoice_id);
        }
        Some(("candidates", sub)) => {
            let payment_id = parse_id(sub.get_one::<String>("payment").unwrap())?;
            let limit = *sub.get_one::<usize>("limit").unwrap_or(&10);
            let cfg = match_config(conn)?;
            let list = candidates(conn, payment_id, &cfg, limit)?;
            if !maybe_print_json(sub.get_flag("json"), false, &list)? {
                let rows = list
                    .iter()
                    .map(|c| {
                        vec![
                            c.invoice_id.to_string(),
                            c.invoice_number.clone(),
                            fmt_amount(c.total_amount),
                            c.score.to_string(),
                            format!("{:?}", c.confidence).to_lowercase(),
                            c.signals
                                .iter()
                                .map(|s| format!("{:?}", s))
                                .collect::<Vec<_>>()
                                .join(", "),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "Invoice", "Total", "Score", "Confidence", "Signals"],
                        rows
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn reference_contains(payment: &PaymentRecord, invoice: &Invoice) -> bool {
    match payment.reference_number.as_deref() {
        Some(r) if !invoice.invoice_number.is_empty() => r.contains(&invoice.invoice_number),
        _ => false,
    }
}

/// `number` occurs in `reference` with no letter or digit on either side.
fn reference_has_token(reference: &str, number: &str) -> bool {
    if number.is_empty() {
        return false;
    }
    reference.match_indices(number).any(|(i, _)| {
        let before = reference[..i].chars().next_back();
        let after = reference[i + number.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

impl MatchRule {
    const ORDER: [MatchRule; 3] = [
        MatchRule::ExactAmountAndReference,
        MatchRule::UniqueExactAmount,
        MatchRule::UniqueWithinTolerance,
    ];

    fn accepts(&self, payment: &PaymentRecord, invoice: &Invoice, cfg: &MatchConfig) -> bool {
        match self {
            MatchRule::ExactAmountAndReference => {
                invoice.total_amount == payment.amount && reference_contains(payment, invoice)
            }
            MatchRule::UniqueExactAmount => invoice.total_amount == payment.amount,
            MatchRule::UniqueWithinTolerance => {
                (payment.amount - invoice.total_amount).abs()
                    <= cfg.tolerance_for(invoice.total_amount)
            }
        }
    }
}

/// Apply the auto-match rules to one payment against the current pool.
/// Stops at the first rule that produces any candidate: one candidate wins,
/// several make the payment ambiguous.
pub fn select_invoice(payment: &PaymentRecord, pool: &[Invoice], cfg: &MatchConfig) -> RuleDecision {
    for rule in MatchRule::ORDER {
        let hits: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, inv)| rule.accepts(payment, inv, cfg))
            .map(|(i, _)| i)
            .collect();
        match hits.len() {
            0 => continue,
            1 => return RuleDecision::Unique(rule, hits[0]),
            _ => {}
        }
        // "INV-100" also contains "INV-10"; a whole-token hit settles it.
        if rule == MatchRule::ExactAmountAndReference {
            let reference = payment.reference_number.as_deref().unwrap_or_default();
            let whole: Vec<usize> = hits
                .iter()
                .copied()
                .filter(|&i| reference_has_token(reference, &pool[i].invoice_number))
                .collect();
            if let [only] = whole[..] {
                return RuleDecision::Unique(rule, only);
            }
        }
        return RuleDecision::Ambiguous(rule, hits.iter().map(|&i| pool[i].id).collect());
    }
    RuleDecision::NoMatch
}

/// One auto-match pass over every unmatched payment, oldest first. Matches
/// are proposals (`matched`); invoices stay `sent` until a confirm.
pub fn auto_match(conn: &mut Connection, cfg: &MatchConfig) -> Result<AutoMatchReport> {
    let tx = write_tx(conn)?;

    let sql = format!(
        "SELECT {} FROM payments WHERE status='unmatched' ORDER BY payment_date ASC, id ASC",
        PaymentRecord::COLUMNS
    );
    let payments: Vec<PaymentRecord> = {
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map([], PaymentRecord::from_row)?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let mut pool = unclaimed_sent(&tx)?;
    let mut report = AutoMatchReport {
        evaluated: payments.len(),
        ..Default::default()
    };

    for payment in &payments {
        match select_invoice(payment, &pool, cfg) {
            RuleDecision::Unique(rule, idx) => {
                let invoice = &pool[idx];
                let claim = tx.execute(
                    "UPDATE payments SET status='matched', invoice_id=?1 WHERE id=?2 AND status='unmatched'",
                    params![invoice.id, payment.id],
                );
                let reason = match claim.map_err(ReconcileError::from) {
                    Ok(1) => None,
                    Ok(_) => Some(format!("payment {} changed concurrently", payment.id)),
                    Err(e) if e.is_conflict() => Some(e.to_string()),
                    Err(e) => return Err(e),
                };
                if let Some(reason) = reason {
                    warn!(payment_id = payment.id, invoice_id = invoice.id, %reason, "auto-match lost a race");
                    report.unmatched += 1;
                    report.outcomes.push(AutoMatchOutcome::Conflict {
                        payment_id: payment.id,
                        invoice_id: invoice.id,
                        reason,
                    });
                    continue;
                }
                record_event(&tx, payment.id, EventAction::MatchedAuto, Some(invoice.id), None, None)?;
                debug!(payment_id = payment.id, invoice = %invoice.invoice_number, ?rule, "auto-matched");

                let invoice = pool.remove(idx);
                report.matched += 1;
                report.outcomes.push(AutoMatchOutcome::Matched {
                    payment_id: payment.id,
                    invoice_id: invoice.id,
                    invoice_number: invoice.invoice_number,
                    rule,
                    confidence: if rule == MatchRule::UniqueWithinTolerance
                        && payment.amount != invoice.total_amount
                    {
                        MatchConfidence::Fuzzy
                    } else {
                        MatchConfidence::Exact
                    },
                });
            }
            RuleDecision::Ambiguous(rule, invoice_ids) => {
                warn!(payment_id = payment.id, ?rule, ?invoice_ids, "ambiguous match, left for manual review");
                let already_flagged = last_event(&tx, payment.id)?
                    .is_some_and(|ev| ev.action == EventAction::FlaggedAmbiguous);
                if !already_flagged {
                    record_event(&tx, payment.id, EventAction::FlaggedAmbiguous, None, None, None)?;
                }
                report.ambiguous += 1;
                report.outcomes.push(AutoMatchOutcome::Ambiguous {
                    payment_id: payment.id,
                    rule,
                    invoice_ids,
                });
            }
            RuleDecision::NoMatch => {
                report.unmatched += 1;
                report.outcomes.push(AutoMatchOutcome::Unmatched {
                    payment_id: payment.id,
                });
            }
        }
    }

    tx.commit()?;
    info!(
        evaluated = report.evaluated,
        matched = report.matched,
        ambiguous = report.ambiguous,
        unmatched = report.unmatched,
        "auto-match pass committed"
    );
    Ok(report)
}

/// Link a payment to an operator-chosen invoice.
pub fn manual_match(
    conn: &mut Connection,
    payment_id: i64,
    invoice_id: i64,
    operator: Option<&str>,
) -> Result<PaymentRecord> {
    let tx = write_tx(conn)?;
    let payment = get_payment(&tx, payment_id)?;
    if payment.status != PaymentStatus::Unmatched {
        return Err(ReconcileError::Conflict(format!(
            "Payment {} is already {}",
            payment_id, payment.status
        )));
    }
    let invoice = tx
        .get_by_id(invoice_id)?
        .ok_or_else(|| ReconcileError::NotFound(format!("Invoice {}", invoice_id)))?;
    if invoice.status != InvoiceStatus::Sent {
        return Err(ReconcileError::Conflict(format!(
            "Invoice {} is {}, only sent invoices can be matched",
            invoice.invoice_number, invoice.status
        )));
    }
    if is_claimed(&tx, invoice_id)? {
        return Err(ReconcileError::Conflict(format!(
            "Invoice {} is already matched to another payment",
            invoice.invoice_number
        )));
    }

    let n = tx.execute(
        "UPDATE payments SET status='matched', invoice_id=?1 WHERE id=?2 AND status='unmatched'",
        params![invoice_id, payment_id],
    )?;
    if n != 1 {
        return Err(ReconcileError::Conflict(format!(
            "Payment {} changed concurrently",
            payment_id
        )));
    }
    record_event(&tx, payment_id, EventAction::MatchedManual, Some(invoice_id), None, operator)?;
    let updated = get_payment(&tx, payment_id)?;
    tx.commit()?;
    info!(payment_id, invoice = %invoice.invoice_number, ?operator, "manual match committed");
    Ok(updated)
}

/// Score one invoice for a payment, 0..=100. Amount carries 50, payer name
/// against the billed company 30, reference 20.
pub fn score_candidate(
    payment: &PaymentRecord,
    invoice: &Invoice,
    cfg: &MatchConfig,
) -> Option<MatchCandidate> {
    let mut signals = Vec::new();
    let mut score: u32 = 0;

    let diff = (payment.amount - invoice.total_amount).abs();
    if diff == 0 {
        score += 50;
        signals.push(MatchSignal::ExactAmount);
    } else if diff <= cfg.tolerance_for(invoice.total_amount) {
        score += 30;
        signals.push(MatchSignal::AmountWithinTolerance);
    }

    if let (Some(payer), Some(company)) = (payment.payer_name.as_deref(), invoice.client_name.as_deref()) {
        let (name_score, signal) = payer_name_score(payer, company);
        if name_score > 0 {
            score += name_score;
            signals.extend(signal);
        }
    }

    if let Some(reference) = payment.reference_number.as_deref() {
        let number = invoice.invoice_number.as_str();
        if !number.is_empty() && (reference.contains(number) || number.contains(reference)) {
            score += 20;
            signals.push(MatchSignal::ReferenceMatch);
        }
    }

    if score == 0 {
        return None;
    }
    let confidence = if signals.contains(&MatchSignal::ExactAmount) {
        MatchConfidence::Exact
    } else {
        MatchConfidence::Fuzzy
    };
    Some(MatchCandidate {
        invoice_id: invoice.id,
        invoice_number: invoice.invoice_number.clone(),
        total_amount: invoice.total_amount,
        score: score.min(100) as u8,
        confidence,
        signals,
    })
}

fn payer_name_score(payer: &str, company: &str) -> (u32, Option<MatchSignal>) {
    let (payer, company) = (payer.trim(), company.trim());
    if payer.is_empty() || company.is_empty() {
        return (0, None);
    }
    let payer_upper = payer.to_uppercase();
    if payer.contains(company) || payer_upper.contains(&company.to_uppercase()) {
        return (30, Some(MatchSignal::PayerNameMatch));
    }
    let mut best = (0, None);
    if company
        .split_whitespace()
        .any(|part| payer_upper.contains(&part.to_uppercase()))
    {
        best = (15, Some(MatchSignal::PayerNameSimilar));
    }

    let norm_payer = normalize_company_name(payer);
    let norm_company = normalize_company_name(company);
    if norm_payer.is_empty() || norm_company.is_empty() {
        return best;
    }
    if norm_payer == norm_company {
        return (30, Some(MatchSignal::PayerNameMatch));
    }
    let ratio = similarity_ratio(&norm_payer, &norm_company);
    let fuzzy = if ratio >= 0.7 {
        20
    } else if ratio >= 0.5 {
        10
    } else {
        0
    };
    if fuzzy > best.0 {
        best = (fuzzy, Some(MatchSignal::PayerNameSimilar));
    }
    best
}

/// Ranked invoices an operator can pick from for a manual match.
pub fn candidates(
    conn: &Connection,
    payment_id: i64,
    cfg: &MatchConfig,
    limit: usize,
) -> Result<Vec<MatchCandidate>> {
    let payment = get_payment(conn, payment_id)?;
    let mut out: Vec<MatchCandidate> = unclaimed_sent(conn)?
        .iter()
        .filter_map(|inv| score_candidate(&payment, inv, cfg))
        .collect();
    out.sort_by(|a, b| b.score.cmp(&a.score).then(a.invoice_id.cmp(&b.invoice_id)));
    out.truncate(limit);
    Ok(out)
}
