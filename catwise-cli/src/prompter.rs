//! Interactive review prompter built on dialoguer

use std::io;

use async_trait::async_trait;
use catwise_core::ports::{PendingClassification, ReviewPrompter};
use catwise_core::{CategoryChoice, Error, Result, ReviewDecision};
use colored::Colorize;
use dialoguer::{Input, Select};
use indicatif::ProgressBar;

use crate::output::{create_table, format_confidence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    AcceptSuggestion,
    ChooseExisting,
    CreateNew,
    Skip,
}

/// Asks the person at the terminal to confirm each uncertain merchant
///
/// Esc or Ctrl-C at any prompt cancels the whole run.
#[derive(Default)]
pub struct DialoguerPrompter {
    progress: Option<ProgressBar>,
}

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear this spinner before the first prompt
    pub fn with_progress(progress: ProgressBar) -> Self {
        Self {
            progress: Some(progress),
        }
    }
}

#[async_trait]
impl ReviewPrompter for DialoguerPrompter {
    async fn review(&self, pending: &PendingClassification) -> Result<ReviewDecision> {
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        let pending = pending.clone();
        tokio::task::spawn_blocking(move || prompt(&pending))
            .await
            .map_err(|e| Error::review(format!("Prompt task failed: {}", e)))?
    }
}

fn prompt(pending: &PendingClassification) -> Result<ReviewDecision> {
    print_pending(pending);

    let options = review_options(pending);
    let labels: Vec<&str> = options.iter().map(|(label, _)| label.as_str()).collect();
    let index = Select::new()
        .with_prompt("Category")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?
        .ok_or(Error::Cancelled)?;

    match options[index].1 {
        Action::AcceptSuggestion => {
            let name = pending.suggested_category.clone().unwrap_or_default();
            Ok(accept(CategoryChoice::Existing(name)))
        }
        Action::ChooseExisting => {
            let names: Vec<&str> = pending.categories.iter().map(|c| c.name.as_str()).collect();
            let index = Select::new()
                .with_prompt("Choose a category")
                .items(&names)
                .default(0)
                .interact_opt()
                .map_err(map_prompt_error)?
                .ok_or(Error::Cancelled)?;
            Ok(accept(CategoryChoice::Existing(names[index].to_string())))
        }
        Action::CreateNew => {
            let name: String = Input::new()
                .with_prompt("New category name")
                .interact_text()
                .map_err(map_prompt_error)?;
            let description: String = Input::new()
                .with_prompt("Description (leave empty to generate)")
                .allow_empty(true)
                .interact_text()
                .map_err(map_prompt_error)?;
            let description = description.trim();
            Ok(accept(CategoryChoice::CreateNew {
                name: name.trim().to_string(),
                description: (!description.is_empty()).then(|| description.to_string()),
            }))
        }
        Action::Skip => Ok(ReviewDecision::Skip),
    }
}

fn accept(choice: CategoryChoice) -> ReviewDecision {
    ReviewDecision::Accept { choice, notes: None }
}

fn review_options(pending: &PendingClassification) -> Vec<(String, Action)> {
    let mut options = Vec::with_capacity(4);
    if let Some(suggested) = &pending.suggested_category {
        let label = if pending.is_new_category {
            format!("Create and use \"{}\" (new category)", suggested)
        } else {
            format!("Accept \"{}\"", suggested)
        };
        options.push((label, Action::AcceptSuggestion));
    }
    if !pending.categories.is_empty() {
        options.push(("Choose another category".to_string(), Action::ChooseExisting));
    }
    options.push(("Create a new category".to_string(), Action::CreateNew));
    options.push(("Skip for now".to_string(), Action::Skip));
    options
}

fn map_prompt_error(error: dialoguer::Error) -> Error {
    match error {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => Error::Cancelled,
        other => Error::review(other.to_string()),
    }
}

fn print_pending(pending: &PendingClassification) {
    let Some(tx) = pending.representative() else {
        return;
    };

    println!();
    println!("{}", tx.display_merchant().bold());
    println!("  {}  {}  {}", tx.date, tx.amount, tx.raw_name.dimmed());
    if pending.similar_count > 0 {
        println!("  {}", format!("+{} similar transactions", pending.similar_count).dimmed());
    }

    if !pending.rankings.is_empty() {
        let mut table = create_table();
        table.set_header(vec!["Category", "Score", ""]);
        for ranking in pending.rankings.iter() {
            let flag = if ranking.is_new { "new" } else { "" };
            table.add_row(vec![ranking.category.clone(), format_confidence(ranking.score), flag.to_string()]);
        }
        println!("{}", table);
    }

    for pattern in &pending.check_patterns {
        println!(
            "  {}",
            format!("Check pattern \"{}\" suggests {}", pattern.name, pattern.category).dimmed()
        );
    }
}
