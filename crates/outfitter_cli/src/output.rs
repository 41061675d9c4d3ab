//! Console rendering and report persistence.
//!
//! This is the single disclose-once path for secrets: freshly created
//! token values and the webhook secret are printed here, on stdout, and
//! nowhere else. The log stream never carries them.

use std::io;
use std::path::Path;

use outfitter::ActionReport;
use outfitter::report::{CheckResult, CheckStatus};

const RULE: &str =
    "================================================================================";

/// Mask a personal access token for display: first 8 and last 4
/// characters only.
fn mask_token(token: &str) -> String {
    if token.len() <= 12 {
        return "********".to_string();
    }
    format!("{}...{}", &token[..8], &token[token.len() - 4..])
}

/// Render the per-target configuration summaries after an apply run.
pub fn print_summaries(report: &ActionReport, personal_token: &str) {
    println!();
    println!("{RULE}");
    println!("CONFIGURATION SUMMARY");
    println!("{RULE}");
    println!();
    println!("Provide the following values to finish wiring up the integration:");
    println!();

    for (idx, summary) in report.configuration_summary.iter().enumerate() {
        println!("--- Root group {}: {} ---", idx + 1, summary.group_path);
        println!("  Group ID:           {}", summary.group_id);
        if summary.personal_access_token_used {
            println!("  Access token:       personal access token (from environment)");
            println!("                      value: {}", mask_token(personal_token));
            println!("                      scopes: api, read_repository");
        } else if let Some(token) = &summary.group_access_token {
            println!("  Group access token: {token}");
            println!("                      SAVE THIS - shown only once");
            println!("                      scopes: api, read_repository");
        } else {
            println!("  Group access token: already exists (not shown)");
            println!("                      scopes: api, read_repository");
        }
        println!("  Webhook URL:        {}", summary.webhook_url);
        println!("  Webhook secret:     {}", summary.webhook_secret);
        if summary.webhook_secret_auto_generated {
            println!("                      AUTO-GENERATED - save this");
        }
        println!();
    }

    for (idx, summary) in report.project_configuration_summary.iter().enumerate() {
        println!("--- Project {}: {} ---", idx + 1, summary.project_path);
        println!("  Project ID:         {}", summary.project_id);
        if summary.covered_by_group_webhook {
            println!(
                "  Group coverage:     covered by a group webhook (project webhook also configured)"
            );
        }
        if let Some(token) = &summary.project_access_token {
            println!("  Project token:      {token}");
            println!("                      SAVE THIS - shown only once");
        } else {
            println!("  Project token:      already exists (not shown)");
        }
        println!("  Webhook URL:        {}", summary.webhook_url);
        println!("  Webhook secret:     {}", summary.webhook_secret);
        println!();
    }

    println!("{RULE}");
    println!();
}

/// Closing statistics, to the log stream.
pub fn log_statistics(report: &ActionReport) {
    tracing::info!(
        groups_processed = report.groups_processed,
        groups_skipped = report.groups_skipped,
        projects_processed = report.projects_processed,
        projects_skipped = report.projects_skipped,
        "targets"
    );
    tracing::info!(
        tokens_created = report.tokens_created.len(),
        tokens_verified = report.tokens_verified.len(),
        "tokens"
    );
    tracing::info!(
        created = report.webhooks_created.len(),
        updated = report.webhooks_updated.len(),
        unchanged = report.webhooks_unchanged.len(),
        "webhooks"
    );
    if !report.errors.is_empty() {
        tracing::warn!(errors = report.errors.len(), "run finished with errors");
        for entry in &report.errors {
            tracing::warn!(
                error_target = %entry.target,
                manual_action_required = entry.manual_action_required,
                "{}",
                entry.message
            );
        }
    }
}

/// Tally check results as (passed, warned, failed).
fn check_totals(results: &[CheckResult]) -> (usize, usize, usize) {
    results.iter().fold((0, 0, 0), |(p, w, f), r| match r.status {
        CheckStatus::Pass => (p + 1, w, f),
        CheckStatus::Warn => (p, w + 1, f),
        CheckStatus::Fail => (p, w, f + 1),
    })
}

/// Render the check-mode results table.
pub fn print_check_table(results: &[CheckResult]) {
    println!();
    println!("{RULE}");
    println!("CONFIGURATION CHECK RESULTS");
    println!("{RULE}");
    println!();
    println!("{:<8}{:<35}{:<18}{}", "Status", "Target", "Check", "Details");
    println!("{:<8}{:<35}{:<18}{}", "------", "------", "-----", "-------");

    for r in results {
        println!(
            "{:<8}{:<35}{:<18}{}",
            r.status, r.target, r.check_name, r.message
        );
    }

    let (passed, warned, failed) = check_totals(results);
    println!();
    println!("Total: {passed} passed, {warned} warnings, {failed} failed");
    println!("{RULE}");
}

/// Persist the full report as pretty JSON.
pub fn write_report(path: &Path, report: &ActionReport) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "report saved");
    Ok(())
}
