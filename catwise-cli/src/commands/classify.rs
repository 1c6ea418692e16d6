//! Classify command - run the classification pipeline

use std::sync::Arc;

use anyhow::{Context, Result};
use catwise_core::{ClassificationSummary, Error};
use chrono::NaiveDate;
use clap::Args;
use colored::Colorize;

use super::{block_on, ctrl_c_token, get_context};
use crate::output;
use crate::prompter::DialoguerPrompter;

#[derive(Args)]
pub struct ClassifyArgs {
    /// Only classify transactions on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Merchants per ranking request
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Parallel ranking workers
    #[arg(long)]
    pub workers: Option<usize>,
    /// Auto-accept threshold (0-1)
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Persist uncertain results without asking
    #[arg(long)]
    pub skip_review: bool,
    /// Output as JSON (implies no interactive review)
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ClassifyArgs) -> Result<()> {
    let mut ctx = get_context()?;

    let config = &mut ctx.config.classification;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.parallel_workers = workers;
    }
    if let Some(threshold) = args.threshold {
        config.auto_accept_threshold = threshold;
    }
    if args.skip_review {
        config.skip_manual_review = true;
    }

    let mut service = ctx.classification_service().context("Invalid classification settings")?;
    let progress = (!args.json).then(|| output::spinner("Classifying transactions"));
    if !args.json && !service.config().skip_manual_review {
        let prompter = match &progress {
            Some(progress) => DialoguerPrompter::with_progress(progress.clone()),
            None => DialoguerPrompter::new(),
        };
        service = service.with_prompter(Arc::new(prompter));
    }

    let from = args.from;
    let result = block_on(async move {
        let cancel = ctrl_c_token();
        service.run(from, &cancel).await
    })?;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(Error::Cancelled) => {
            output::warning("Cancelled. Progress was saved; run `cw classify` again to resume.");
            return Ok(());
        }
        Err(Error::NoCategories) => {
            anyhow::bail!("No categories yet. Add one with `cw categories add <name>` first.");
        }
        Err(e) => return Err(e).context("Classification failed"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ClassificationSummary) {
    if let Some(date) = summary.resumed_from {
        output::info(&format!("Resumed from checkpoint at {}", date));
    }
    if summary.transactions == 0 {
        output::success("Nothing to classify");
        return;
    }

    println!("{}", "Classification Summary".bold());
    let mut table = output::create_table();
    table.add_row(vec!["Transactions", &summary.transactions.to_string()]);
    table.add_row(vec!["Merchants", &summary.merchants.to_string()]);
    table.add_row(vec!["By rule", &summary.rule_classified.to_string()]);
    table.add_row(vec!["Auto-accepted", &summary.auto_classified.to_string()]);
    table.add_row(vec!["Reviewed", &summary.reviewed.to_string()]);
    table.add_row(vec!["Skipped", &summary.skipped.to_string()]);
    table.add_row(vec!["Failed", &summary.failed.to_string()]);
    table.add_row(vec!["Pending review", &summary.pending.to_string()]);
    println!("{}", table);

    if summary.failed > 0 {
        output::warning(&format!(
            "{} transaction(s) could not be ranked; they stay unclassified for the next run",
            summary.failed
        ));
    }
    if summary.pending > 0 {
        output::info(&format!(
            "{} transaction(s) need review; run `cw classify` without --json or --skip-review",
            summary.pending
        ));
    }
}
