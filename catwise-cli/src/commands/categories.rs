//! Categories command - list and create categories

use anyhow::{Context, Result};
use catwise_core::ports::ClassificationStore;
use catwise_core::{Category, CategoryType};
use clap::Subcommand;
use colored::Colorize;

use super::{block_on, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a category
    Add {
        /// Category name
        name: String,
        /// Category type (expense, income, system)
        #[arg(long = "type", default_value = "expense")]
        category_type: CategoryType,
        /// Description shown to the ranking oracle
        #[arg(long, short)]
        description: Option<String>,
        /// Generate the description with the ranking oracle
        #[arg(long, conflicts_with = "description")]
        describe: bool,
    },
}

pub fn run(command: CategoryCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        CategoryCommands::List { json } => {
            let categories = block_on(ctx.store.get_categories())??;
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
                return Ok(());
            }
            if categories.is_empty() {
                println!("{}", "No categories yet".dimmed());
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Name", "Type", "Description"]);
            for category in &categories {
                table.add_row(vec![
                    category.name.clone(),
                    category.category_type.to_string(),
                    category.description.clone(),
                ]);
            }
            println!("{}", table);
        }
        CategoryCommands::Add {
            name,
            category_type,
            description,
            describe,
        } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                anyhow::bail!("Category name cannot be empty");
            }

            let description = if describe {
                let ranking = ctx.ranking_client()?;
                block_on(async { ranking.describe_category(&name).await })?
                    .context("Failed to generate a description")?
            } else {
                description.unwrap_or_default()
            };

            let category = Category::new(&name, category_type).with_description(description);
            block_on(ctx.store.create_category(&category))??;
            output::success(&format!("Created {} category '{}'", category.category_type, category.name));
            if !category.description.is_empty() {
                println!("  {}", category.description.dimmed());
            }
        }
    }

    Ok(())
}
