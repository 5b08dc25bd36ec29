//! The `sheetsmith run` command: one session from photo to problems.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use sheetsmith_core::{GeneratedProblemSet, SessionContext, WorksheetAnalysis};

use super::{build_pipeline, load_image, Target};
use crate::output::{print_analysis, print_problems};

/// JSON shape printed by `run --json`.
#[derive(Serialize)]
struct SessionReport<'a> {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    analysis: &'a WorksheetAnalysis,
    problems: &'a GeneratedProblemSet,
}

pub async fn execute(
    target: &Target,
    image: PathBuf,
    count: u32,
    prompt: Option<String>,
    remove_handwriting: bool,
    json: bool,
) -> Result<()> {
    let photo = load_image(&image)?;
    let pipeline = build_pipeline(target)?;

    let mut session = SessionContext::new();
    session.set_uploaded_image(photo);
    tracing::debug!(session = %session.id, "session started");

    eprintln!("Analyzing {}...", image.display());
    session.analyze(&pipeline, remove_handwriting).await?;

    match prompt.as_deref() {
        Some(_) => eprintln!("Generating {count} customized problems..."),
        None => eprintln!("Generating {count} problems..."),
    }
    session.generate(&pipeline, count, prompt.as_deref()).await?;

    let (Some(analysis), Some(problems)) = (&session.analysis, &session.generated) else {
        anyhow::bail!("session finished without results");
    };

    if json {
        let report = SessionReport {
            session_id: session.id,
            started_at: session.created_at,
            analysis,
            problems,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_analysis(analysis);
        println!();
        print_problems(problems);
    }

    Ok(())
}
