//! Patterns command - manage check patterns

use anyhow::Result;
use catwise_core::ports::ClassificationStore;
use catwise_core::CheckPattern;
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;

use super::{block_on, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum PatternCommands {
    /// List check patterns
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recognize recurring checks by amount and day of month
    Add {
        /// Pattern name
        name: String,
        /// Existing category name
        category: String,
        /// Smallest matching amount
        #[arg(long)]
        min: Option<Decimal>,
        /// Largest matching amount
        #[arg(long)]
        max: Option<Decimal>,
        /// First matching day of the month
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=31))]
        day_min: Option<u32>,
        /// Last matching day of the month
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=31))]
        day_max: Option<u32>,
        /// Score added to the category's ranking (0-1)
        #[arg(long, default_value_t = 0.3)]
        boost: f64,
    },
}

pub fn run(command: PatternCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        PatternCommands::List { json } => {
            let patterns = block_on(ctx.store.get_check_patterns())??;
            if json {
                println!("{}", serde_json::to_string_pretty(&patterns)?);
                return Ok(());
            }
            if patterns.is_empty() {
                println!("{}", "No check patterns yet".dimmed());
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Name", "Category", "Amount", "Days", "Boost", "Uses", "Active"]);
            for p in &patterns {
                table.add_row(vec![
                    p.name.clone(),
                    p.category.clone(),
                    format_range(p.amount_min, p.amount_max),
                    format_range(p.day_of_month_min, p.day_of_month_max),
                    format!("{:.2}", p.confidence_boost),
                    p.use_count.to_string(),
                    if p.active { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{}", table);
        }
        PatternCommands::Add {
            name,
            category,
            min,
            max,
            day_min,
            day_max,
            boost,
        } => {
            if !(0.0..=1.0).contains(&boost) {
                anyhow::bail!("Boost must be between 0 and 1");
            }
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    anyhow::bail!("--min must not exceed --max");
                }
            }
            let Some(category) = block_on(ctx.store.find_category(&category))?? else {
                anyhow::bail!("Category '{}' not found. Create it with `cw categories add`.", category);
            };

            let mut pattern = CheckPattern::new(name.trim(), &category.name).with_boost(boost);
            pattern.amount_min = min.map(|m| m.abs());
            pattern.amount_max = max.map(|m| m.abs());
            pattern.day_of_month_min = day_min;
            pattern.day_of_month_max = day_max;

            ctx.store.insert_check_pattern(&pattern)?;
            output::success(&format!("Added check pattern '{}' for {}", pattern.name, category.name));
        }
    }

    Ok(())
}

fn format_range<T: std::fmt::Display>(min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (None, None) => "any".to_string(),
        (Some(min), None) => format!("{}+", min),
        (None, Some(max)) => format!("up to {}", max),
        (Some(min), Some(max)) => format!("{} - {}", min, max),
    }
}
