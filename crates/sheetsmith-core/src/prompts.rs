//! Prompt templates for the analyzer and generator stages.
//!
//! The customizer has no template of its own: it folds the user's
//! instructions into the analysis and reuses the generator prompt.

use crate::model::MAX_EXAMPLE_QUESTIONS;

/// Render the analyzer prompt. The worksheet image travels as an attachment.
pub fn analyze_prompt(remove_handwriting: bool) -> String {
    let mut prompt = String::from(
        "You are an AI assistant that analyzes a worksheet image.\n\
         Your goal is to extract structured information to help generate new practice problems.\n\n\
         The photo of the worksheet is attached to this message.\n",
    );

    if remove_handwriting {
        prompt.push_str(
            "Disregard any handwriting on the worksheet (student answers, doodles, \
             teacher marks). Analyze only the printed content.\n",
        );
    }

    prompt.push_str(&format!(
        r#"
Analyze the worksheet and output a JSON object strictly adhering to the following structure:
{{
  "identified_concepts": [
    {{
      "subject": "string", // e.g., "Math", "Grammar", "Science"
      "main_topic": "string", // e.g., "Addition", "Nouns", "Photosynthesis"
      "specific_concept": "string" // e.g., "Adding 2-digit numbers with carrying", "Proper Nouns"
    }}
    // One object per distinct concept, in the order they appear on the worksheet. No duplicates.
  ],
  "identified_question_formats": [
    "string" // e.g., "Solve and show work", "Fill-in-the-blank", "Multiple choice (A, B, C, D)"
  ],
  "example_questions": [
    "string" // Up to {MAX_EXAMPLE_QUESTIONS} actual questions copied verbatim from the worksheet. These are critical.
  ],
  "answer_bank_present": boolean, // true if an answer bank is visible on the worksheet, false otherwise.
  "worksheet_directions": "string", // General directions on the worksheet. Empty string or omitted if none.
  "additional_notes_for_generation": "" // Always an empty string in the initial analysis.
}}

Focus on accuracy and completeness based on the provided image.
"#
    ));

    prompt
}

/// Render the generator prompt for an analysis already serialized to JSON.
pub fn generate_prompt(analysis_json: &str, count: u32, custom_prompt: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert educator. Generate practice problems based on the following worksheet analysis.\n\n\
         Worksheet Analysis (JSON):\n{analysis_json}\n\n\
         Number of Problems to Generate: {count}\n"
    );

    if let Some(custom) = custom_prompt.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\nCustom Prompt: {custom}\n"));
    }

    prompt.push_str(
        r#"
Follow the format and concepts of the original worksheet.
Distribute the problems across all identified concepts and question formats as appropriate.
If 'additional_notes_for_generation' in the analysis is not empty, follow those notes; they describe the style, difficulty or focus the student wants.

Your output MUST be a JSON object with the following structure:
{
  "problems": [
    {
      "question": "Newly generated question text here?",
      "answer": "Solution/Answer for question here"
    }
  ],
  "answer_bank_present": <boolean value copied from the analysis field answer_bank_present>,
  "answerBank": ["array of strings"]
}
Include "answerBank" ONLY IF answer_bank_present in the analysis is true. If included, it must contain exactly the 'answer' strings of the problems above, in a random order. If answer_bank_present is false, do NOT include the "answerBank" field at all.
"#,
    );

    prompt
}
