//! Rerank command - revisit low-confidence classifications

use std::sync::Arc;

use anyhow::{Context, Result};
use catwise_core::services::RerankService;
use catwise_core::Error;
use colored::Colorize;

use super::{block_on, ctrl_c_token, get_context};
use crate::output;
use crate::prompter::DialoguerPrompter;

pub fn run(confidence_threshold: Option<f64>, review: bool, json: bool) -> Result<()> {
    let mut ctx = get_context()?;
    if let Some(threshold) = confidence_threshold {
        ctx.config.rerank.confidence_threshold = threshold;
    }

    let progress = (!json).then(|| output::spinner("Re-ranking classifications"));
    let service = if review && !json {
        let prompter = match &progress {
            Some(progress) => DialoguerPrompter::with_progress(progress.clone()),
            None => DialoguerPrompter::new(),
        };
        let classifier = ctx.classification_service()?.with_prompter(Arc::new(prompter));
        RerankService::new(classifier, ctx.config.rerank.clone())
    } else {
        ctx.rerank_service().context("Invalid rerank settings")?
    };

    let result = block_on(async move {
        let cancel = ctrl_c_token();
        service.run(&cancel).await
    })?;
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let summary = match result {
        Ok(summary) => summary,
        Err(Error::Cancelled) => {
            output::warning("Cancelled");
            return Ok(());
        }
        Err(e) => return Err(e).context("Rerank failed"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.evaluated == 0 {
        output::success(&format!(
            "No classifications below {}",
            output::format_confidence(ctx.config.rerank.confidence_threshold)
        ));
        return Ok(());
    }

    println!("{}", "Rerank Summary".bold());
    let mut table = output::create_table();
    table.add_row(vec!["Evaluated", &summary.evaluated.to_string()]);
    table.add_row(vec!["Improved", &summary.improved.to_string()]);
    table.add_row(vec!["Unchanged", &summary.unchanged.to_string()]);
    table.add_row(vec!["Applied", &summary.auto_applied.to_string()]);
    table.add_row(vec!["Reviewed", &summary.reviewed.to_string()]);
    table.add_row(vec!["Failed", &summary.failed.to_string()]);
    table.add_row(vec![
        "Mean confidence gain".to_string(),
        format!("{:+.2}", summary.mean_confidence_delta),
    ]);
    println!("{}", table);

    Ok(())
}
