//! Prompt construction for follow-up questions and the advice report.
//!
//! Everything here is a pure function of its inputs. The report cache relies
//! on identical sessions producing byte-identical prompts.

use super::model::{Profile, QuestionAnswer, Specialty};

/// System message for the advice report.
pub const ADVICE_SYSTEM_PROMPT: &str = "You are a helpful health assistant.";

/// System message for follow-up question generation.
pub const QUESTION_SYSTEM_PROMPT: &str = "\
You write one short follow-up question for a patient intake form.
Reply with the question only: no numbering, no quotes, no commentary.";

/// The four headings every report must contain, in order.
pub const REPORT_SECTIONS: [&str; 4] = [
    "Initial Assessment",
    "Recommendations",
    "Management Plan",
    "Critical Considerations",
];

/// Role framing and focus instruction for a specialty.
fn role_and_focus(specialty: &Specialty) -> (String, &'static str) {
    match specialty {
        Specialty::Nutritionist => (
            "Certified Clinical Nutritionist".to_string(),
            "Calculate BMI and classify it. Provide a structured, clear weekly nutrition plan. \
             Include hydration tips, meal timings, and snacks.",
        ),
        Specialty::Physician => (
            "Experienced General Physician".to_string(),
            "Provide a detailed but simple explanation of possible conditions and suggested next \
             steps including home care and medications.",
        ),
        Specialty::MentalHealth => (
            "Clinical Psychologist".to_string(),
            "Deliver empathetic, actionable mental health advice with daily coping tools and \
             therapy suggestions.",
        ),
        Specialty::Orthopedic => (
            "Senior Orthopedic Surgeon".to_string(),
            "Give analysis of musculoskeletal symptoms and recommend posture, exercise, or \
             diagnostics needed.",
        ),
        Specialty::Dentist => (
            "Professional Dental Surgeon".to_string(),
            "Outline potential dental diagnoses and hygienic practices with cost-effective \
             treatment paths.",
        ),
        Specialty::Other(name) => (
            format!("Healthcare Expert ({})", name.trim()),
            "Provide helpful health suggestions.",
        ),
    }
}

/// Label for the problem line in each template.
fn concern_label(specialty: &Specialty) -> &'static str {
    match specialty {
        Specialty::Nutritionist => "HEALTH CONCERN",
        Specialty::Physician => "PATIENT COMPLAINT",
        Specialty::MentalHealth => "CONCERN",
        Specialty::Orthopedic => "COMPLAINT",
        Specialty::Dentist => "DENTAL ISSUE",
        Specialty::Other(_) => "ISSUE",
    }
}

/// Render the transcript as numbered question/answer pairs.
fn render_answers(answers: &[QuestionAnswer]) -> String {
    if answers.is_empty() {
        return "(no follow-up answers provided)".to_string();
    }
    answers
        .iter()
        .enumerate()
        .map(|(i, qa)| format!("Q{n}: {q}\nA{n}: {a}", n = i + 1, q = qa.question, a = qa.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_profile(profile: &Profile) -> String {
    format!(
        "USER PROFILE:\n\
         - Age: {age}\n\
         - Weight: {weight} kg\n\
         - Height: {height} cm\n\
         - Gender: {gender}\n\
         - BMI: {bmi:.1} ({category})\n",
        age = profile.age,
        weight = profile.weight_kg,
        height = profile.height_cm,
        gender = profile.gender,
        bmi = profile.bmi,
        category = profile.bmi_category,
    )
}

/// Build the advice prompt for a completed (or skipped) intake.
///
/// The profile is only rendered for specialties that collect one.
pub fn build_advice_prompt(
    specialty: &Specialty,
    profile: Option<&Profile>,
    problem: &str,
    answers: &[QuestionAnswer],
) -> String {
    let (role, focus) = role_and_focus(specialty);

    let profile_block = match profile {
        Some(p) if specialty.requires_profile() => render_profile(p),
        _ => String::new(),
    };

    let sections = REPORT_SECTIONS
        .iter()
        .map(|s| format!("### {s}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "ROLE: {role}\n\
         {profile_block}\
         {label}: {problem}\n\
         FOLLOW-UP RESPONSES:\n{answers}\n\n\
         TASK:\n{focus}\n\n\
         Structure your response in markdown with exactly these four sections, \
         each introduced by its heading:\n{sections}\n\
         Keep the language simple and practical. Do not diagnose with certainty; \
         point out when the patient should see a professional in person.",
        label = concern_label(specialty),
        problem = problem.trim(),
        answers = render_answers(answers),
    )
}

/// Build the user prompt that asks for follow-up question `question_number`
/// (1-based).
pub fn build_question_prompt(
    specialty: &Specialty,
    problem: &str,
    prior: &[QuestionAnswer],
    question_number: usize,
) -> String {
    let (role, _) = role_and_focus(specialty);
    let history = if prior.is_empty() {
        String::new()
    } else {
        format!("\nAlready asked and answered:\n{}\n", render_answers(prior))
    };

    format!(
        "You are a {role} taking a patient history.\n\
         Patient concern: {problem}\n\
         {history}\n\
         Write follow-up question number {question_number}. It must be about 6-7 words, \
         must not repeat an earlier question, and should help you give better advice.",
        problem = problem.trim(),
    )
}
