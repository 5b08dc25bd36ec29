//! The `sheetsmith generate` command.

use std::path::PathBuf;

use anyhow::Result;

use sheetsmith_core::actions::{handle_generate_problems, ActionResult};

use super::{build_pipeline, finish, read_analysis, Target};
use crate::output::print_problems;

pub async fn execute(
    target: &Target,
    analysis: PathBuf,
    count: u32,
    prompt: Option<String>,
    json: bool,
) -> Result<()> {
    let analysis_json = read_analysis(&analysis)?;
    let pipeline = build_pipeline(target)?;

    let result = match prompt.as_deref() {
        Some(prompt) => ActionResult::from(
            pipeline
                .generate_from_json(&analysis_json, Some(count), Some(prompt))
                .await,
        ),
        None => handle_generate_problems(&pipeline, &analysis_json, count).await,
    };

    let problems = finish(result, json)?;
    if !json {
        print_problems(&problems);
    }
    Ok(())
}
