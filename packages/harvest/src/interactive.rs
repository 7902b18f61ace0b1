#![allow(clippy::module_name_repetitions)]

//! Interactive menu for the harvester.
//!
//! Provides a `dialoguer` interface for running a harvest or a merge
//! without memorizing CLI flags.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, MultiSelect, Select};
use stayscout_cli_utils::MultiProgress;
use stayscout_sink::TOTAL_FILE;
use stayscout_sink::merge::MergeOutcome;
use tokio_util::sync::CancellationToken;

use crate::config::{RunConfig, RunOverrides, default_localities};

/// Top-level actions available in the interactive menu.
enum HarvestAction {
    RunHarvest,
    MergeOutputs,
    ListLocalities,
}

impl HarvestAction {
    const ALL: &[Self] = &[Self::RunHarvest, Self::MergeOutputs, Self::ListLocalities];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunHarvest => "Run harvest",
            Self::MergeOutputs => "Merge outputs",
            Self::ListLocalities => "List localities",
        }
    }
}

/// Prompts for an action and runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails, the configuration is invalid, or
/// the selected operation fails to start.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = HarvestAction::ALL.iter().map(HarvestAction::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match HarvestAction::ALL[idx] {
        HarvestAction::RunHarvest => run_harvest(multi).await?,
        HarvestAction::MergeOutputs => merge_outputs()?,
        HarvestAction::ListLocalities => {
            for locality in default_localities()? {
                println!("{locality}");
            }
        }
    }

    Ok(())
}

/// Prompts for localities and limits, then harvests.
async fn run_harvest(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let base = RunConfig::load(None)?;
    let all = default_localities()?;

    let selected = MultiSelect::new()
        .with_prompt("Select localities (space=toggle, a=all, enter=confirm)")
        .items(&all)
        .max_length(20)
        .interact()?;

    if selected.is_empty() {
        println!("No localities selected.");
        return Ok(());
    }

    let limit: usize = Input::new()
        .with_prompt("Listings per locality (0 for unlimited)")
        .default(base.result_cap)
        .interact_text()?;

    let output_dir: String = Input::new()
        .with_prompt("Output directory")
        .default(base.output_dir.display().to_string())
        .interact_text()?;

    let config = base
        .with_overrides(RunOverrides {
            localities: Some(selected.iter().map(|&i| all[i].clone()).collect()),
            limit: Some(limit),
            output_dir: Some(PathBuf::from(output_dir)),
            ..RunOverrides::default()
        })
        .validated()?;

    let cancel = CancellationToken::new();
    crate::spawn_interrupt_listener(cancel.clone())?;
    crate::run_harvest(&config, Some(multi), &cancel).await?;
    Ok(())
}

/// Prompts for the merge input and output, then merges.
fn merge_outputs() -> Result<(), Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt("Directory with datasets")
        .default("output".to_string())
        .interact_text()?;
    let input = PathBuf::from(input);

    let default_output = input.join("merged").join(TOTAL_FILE);
    let output: String = Input::new()
        .with_prompt("Merged file")
        .default(default_output.display().to_string())
        .interact_text()?;
    let output = PathBuf::from(output);

    if output.exists()
        && !Confirm::new()
            .with_prompt(format!("{} exists. Overwrite?", output.display()))
            .default(true)
            .interact()?
    {
        return Ok(());
    }

    let include_total = input.join(TOTAL_FILE).exists()
        && Confirm::new()
            .with_prompt(format!("Also merge {TOTAL_FILE} alongside the locality files?"))
            .default(false)
            .interact()?;

    if crate::run_merge(&input, &output, include_total)? == MergeOutcome::NothingToMerge {
        println!("Nothing to merge in {}.", input.display());
    }
    Ok(())
}
