//! Vendors command - manage merchant rules

use anyhow::Result;
use catwise_core::ports::ClassificationStore;
use catwise_core::Vendor;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;

use super::{block_on, get_context};
use crate::output;

#[derive(Subcommand)]
pub enum VendorCommands {
    /// List vendor rules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Always classify a merchant into a category
    Add {
        /// Merchant name as it appears on transactions
        merchant: String,
        /// Existing category name
        category: String,
    },
    /// Remove a vendor rule
    Remove {
        /// Merchant name
        merchant: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub fn run(command: VendorCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        VendorCommands::List { json } => {
            let vendors = block_on(ctx.store.get_vendors())??;
            if json {
                println!("{}", serde_json::to_string_pretty(&vendors)?);
                return Ok(());
            }
            if vendors.is_empty() {
                println!("{}", "No vendor rules yet".dimmed());
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Merchant", "Category", "Uses", "Updated"]);
            for vendor in &vendors {
                table.add_row(vec![
                    vendor.name.clone(),
                    vendor.category.clone(),
                    vendor.use_count.to_string(),
                    vendor.last_updated.format("%Y-%m-%d %H:%M").to_string(),
                ]);
            }
            println!("{}", table);
        }
        VendorCommands::Add { merchant, category } => {
            let Some(category) = block_on(ctx.store.find_category(&category))?? else {
                anyhow::bail!("Category '{}' not found. Create it with `cw categories add`.", category);
            };
            let vendor = Vendor::new(&merchant, &category.name);
            if vendor.name.is_empty() {
                anyhow::bail!("Merchant name cannot be empty");
            }
            block_on(ctx.store.save_vendor(&vendor))??;
            output::success(&format!("'{}' will be classified as {}", vendor.name, category.name));
        }
        VendorCommands::Remove { merchant, force } => {
            if !force
                && !Confirm::new()
                    .with_prompt(format!("Remove the vendor rule for '{}'?", merchant))
                    .default(false)
                    .interact()?
            {
                println!("{}", "Cancelled".dimmed());
                return Ok(());
            }

            if ctx.store.delete_vendor(&merchant)? {
                output::success(&format!("Removed vendor rule for '{}'", merchant));
            } else {
                output::warning(&format!("No vendor rule for '{}'", merchant));
            }
        }
    }

    Ok(())
}
