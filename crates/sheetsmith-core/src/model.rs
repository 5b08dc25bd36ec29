//! Core data model types for sheetsmith.
//!
//! A `WorksheetAnalysis` is produced by the analyzer stage and is the only
//! artifact handed to the generator and customizer stages, which produce a
//! `GeneratedProblemSet`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound on `example_questions` in a single analysis.
pub const MAX_EXAMPLE_QUESTIONS: usize = 100;

/// Separator placed between customization notes when more than one is appended.
pub const NOTES_DELIMITER: &str = "\n\n";

/// A concept covered by the worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifiedConcept {
    /// e.g. "Math", "Grammar".
    pub subject: String,
    /// e.g. "Multiplication", "Pronouns".
    pub main_topic: String,
    /// e.g. "2-digit by 2-digit multiplication".
    pub specific_concept: String,
}

impl fmt::Display for IdentifiedConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.subject, self.main_topic, self.specific_concept
        )
    }
}

/// Structured extraction of a worksheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetAnalysis {
    /// Concepts in worksheet order, no duplicates.
    pub identified_concepts: Vec<IdentifiedConcept>,
    /// Question styles (e.g. "fill-in-the-blank", "multiple choice (A, B, C, D)").
    pub identified_question_formats: Vec<String>,
    /// Verbatim questions from the worksheet, at most [`MAX_EXAMPLE_QUESTIONS`].
    pub example_questions: Vec<String>,
    /// Whether the worksheet shows an answer bank. Set once by the analyzer.
    pub answer_bank_present: bool,
    /// General directions printed on the worksheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet_directions: Option<String>,
    /// Free-text hints for generation. Only ever appended to.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub additional_notes_for_generation: String,
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl WorksheetAnalysis {
    /// Parse an analysis from its JSON form and validate it.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let analysis: WorksheetAnalysis =
            serde_json::from_str(json).map_err(|e| e.to_string())?;
        analysis.validate().map_err(|violations| violations.join("; "))?;
        Ok(analysis)
    }

    /// Check the invariants serde cannot express.
    ///
    /// Returns every violation found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut violations = Vec::new();

        if self.example_questions.len() > MAX_EXAMPLE_QUESTIONS {
            violations.push(format!(
                "example_questions has {} entries, at most {MAX_EXAMPLE_QUESTIONS} allowed",
                self.example_questions.len()
            ));
        }

        for (i, concept) in self.identified_concepts.iter().enumerate() {
            if self.identified_concepts[..i].contains(concept) {
                violations.push(format!("duplicate concept: {concept}"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Append user instructions to `additional_notes_for_generation`.
    ///
    /// Existing notes are kept; the new text goes after [`NOTES_DELIMITER`].
    pub fn append_notes(&mut self, notes: &str) {
        if self.additional_notes_for_generation.is_empty() {
            self.additional_notes_for_generation = notes.to_string();
        } else {
            self.additional_notes_for_generation.push_str(NOTES_DELIMITER);
            self.additional_notes_for_generation.push_str(notes);
        }
    }

    /// Consuming variant of [`append_notes`](Self::append_notes).
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.append_notes(notes);
        self
    }
}

/// A single generated question with its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub question: String,
    pub answer: String,
}

/// Output of the generator and customizer stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProblemSet {
    #[serde(alias = "customizedProblems")]
    pub problems: Vec<Problem>,
    /// Copied from the input analysis.
    pub answer_bank_present: bool,
    /// Shuffled answers. Present iff `answer_bank_present`.
    #[serde(
        rename = "answerBank",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub answer_bank: Option<Vec<String>>,
}

impl GeneratedProblemSet {
    /// Answers in generation order.
    pub fn answers(&self) -> Vec<&str> {
        self.problems.iter().map(|p| p.answer.as_str()).collect()
    }
}

/// A parsed `data:<mime>;base64,<data>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub data: &'a str,
}

impl<'a> DataUri<'a> {
    /// Split a base64 data URI into its MIME type and payload.
    ///
    /// Only the syntax is checked; the payload is not decoded.
    pub fn parse(uri: &'a str) -> Result<Self, String> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| "data URI must start with 'data:'".to_string())?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| "data URI is missing the ',' separator".to_string())?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| "data URI must be base64 encoded".to_string())?;
        if mime_type.is_empty() || !mime_type.contains('/') {
            return Err(format!("data URI has an invalid MIME type: '{mime_type}'"));
        }
        if data.is_empty() {
            return Err("data URI has no payload".to_string());
        }
        Ok(Self { mime_type, data })
    }
}

/// Image formats the CLI knows how to turn into data URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Pdf,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            "gif" => Ok(ImageFormat::Gif),
            "pdf" => Ok(ImageFormat::Pdf),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}
