//! Status command - show classification coverage

use anyhow::Result;
use colored::Colorize;

use super::{block_on, get_context};
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let threshold = ctx.config.rerank.confidence_threshold;
    let status = block_on(ctx.status_service.get_status(threshold))??;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Classification Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Unclassified", &status.unclassified_transactions.to_string()]);
    table.add_row(vec!["Classified", &status.classified_transactions.to_string()]);
    table.add_row(vec!["  by rule", &status.by_status.rule.to_string()]);
    table.add_row(vec!["  by AI", &status.by_status.ai.to_string()]);
    table.add_row(vec!["  by you", &status.by_status.user_modified.to_string()]);
    table.add_row(vec![
        format!("Below {}", output::format_confidence(threshold)),
        status.low_confidence.to_string(),
    ]);
    table.add_row(vec!["Categories", &status.total_categories.to_string()]);
    table.add_row(vec!["Vendor rules", &status.total_vendors.to_string()]);
    table.add_row(vec!["Check patterns", &status.active_check_patterns.to_string()]);
    println!("{}", table);

    if let Some(path) = ctx.store.db_path() {
        println!("{}", format!("Database: {}", path.display()).dimmed());
    }

    if let Some(checkpoint) = &status.checkpoint {
        println!();
        let since = checkpoint
            .last_processed_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "the start".to_string());
        output::warning(&format!(
            "An interrupted run processed {} transaction(s) up to {}; `cw classify` resumes it",
            checkpoint.total_processed, since
        ));
    }

    Ok(())
}
