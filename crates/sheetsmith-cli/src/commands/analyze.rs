//! The `sheetsmith analyze` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use sheetsmith_core::actions::handle_analyze_worksheet;

use super::{build_pipeline, finish, load_image, Target};
use crate::output::print_analysis;

pub async fn execute(
    target: &Target,
    image: PathBuf,
    remove_handwriting: bool,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let photo = load_image(&image)?;
    let pipeline = build_pipeline(target)?;

    eprintln!("Analyzing {}...", image.display());
    let result = handle_analyze_worksheet(&pipeline, &photo, remove_handwriting).await;
    let analysis = finish(result, json)?;

    if !json {
        print_analysis(&analysis);
    }

    if let Some(path) = output {
        let content = serde_json::to_string_pretty(&analysis)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write analysis: {}", path.display()))?;
        eprintln!("Analysis saved to: {}", path.display());
    }

    Ok(())
}
