//! Human-readable rendering of analyses and problem sets.

use comfy_table::{Cell, ContentArrangement, Table};

use sheetsmith_core::{GeneratedProblemSet, WorksheetAnalysis};

pub fn print_analysis(analysis: &WorksheetAnalysis) {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Subject", "Topic", "Concept"]);
    for concept in &analysis.identified_concepts {
        table.add_row(vec![
            Cell::new(&concept.subject),
            Cell::new(&concept.main_topic),
            Cell::new(&concept.specific_concept),
        ]);
    }
    println!("{table}");

    if !analysis.identified_question_formats.is_empty() {
        println!(
            "Question formats: {}",
            analysis.identified_question_formats.join(", ")
        );
    }
    println!("Example questions: {}", analysis.example_questions.len());
    println!(
        "Answer bank: {}",
        if analysis.answer_bank_present {
            "yes"
        } else {
            "no"
        }
    );
    if let Some(directions) = analysis
        .worksheet_directions
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        println!("Directions: {directions}");
    }
}

pub fn print_problems(set: &GeneratedProblemSet) {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Question", "Answer"]);
    for (i, problem) in set.problems.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&problem.question),
            Cell::new(&problem.answer),
        ]);
    }
    println!("{table}");

    if let Some(bank) = &set.answer_bank {
        println!("Answer bank: {}", bank.join(" | "));
    }
}
