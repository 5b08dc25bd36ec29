//! The `sheetsmith init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("sheetsmith.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("worksheets")?;
    write_if_missing(
        Path::new("worksheets/sample-analysis.json"),
        SAMPLE_ANALYSIS,
    )?;

    println!("\nNext steps:");
    println!("  1. Edit sheetsmith.toml with your API keys (or export GEMINI_API_KEY)");
    println!("  2. Run: sheetsmith generate --analysis worksheets/sample-analysis.json");
    println!("  3. Run: sheetsmith run --image <worksheet photo>");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# sheetsmith configuration

default_provider = "gemini"
default_model = "gemini-2.0-flash"
temperature = 0.7
timeout_secs = 60
max_retries = 0

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;

const SAMPLE_ANALYSIS: &str = r#"{
  "identified_concepts": [
    {
      "subject": "Math",
      "main_topic": "Addition",
      "specific_concept": "Adding 2-digit numbers with carrying"
    }
  ],
  "identified_question_formats": ["Solve and show work"],
  "example_questions": ["27 + 15 = ?", "38 + 46 = ?", "59 + 23 = ?"],
  "answer_bank_present": true,
  "worksheet_directions": "Solve each problem. Use the answer bank to check your work.",
  "additional_notes_for_generation": ""
}
"#;
