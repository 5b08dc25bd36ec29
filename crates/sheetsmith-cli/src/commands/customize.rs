//! The `sheetsmith customize` command.

use std::path::PathBuf;

use anyhow::Result;

use sheetsmith_core::actions::handle_customize_problems;

use super::{build_pipeline, finish, read_analysis, Target};
use crate::output::print_problems;

pub async fn execute(
    target: &Target,
    analysis: PathBuf,
    prompt: String,
    count: u32,
    json: bool,
) -> Result<()> {
    let analysis_json = read_analysis(&analysis)?;
    let pipeline = build_pipeline(target)?;

    let result = handle_customize_problems(&pipeline, &analysis_json, &prompt, count).await;
    let problems = finish(result, json)?;
    if !json {
        print_problems(&problems);
    }
    Ok(())
}
