//! Turns a line of terminal input into a consultation action.
//!
//! Slash commands work in every phase; anything else is read according to
//! what the current phase is asking for.

use crate::consult::{Action, Gender, Phase, ProfileForm, SessionState, Specialty};
use crate::error::ConsultError;

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Apply an action to the consultation.
    Action(Action),
    /// Save the current report to the export directory.
    Export,
    /// Show the command list.
    Help,
    /// Leave the program.
    Quit,
    /// Blank line; just re-render.
    Empty,
}

pub struct InputParser;

impl InputParser {
    /// Parse `line` in the context of `state`.
    pub fn parse(line: &str, state: &SessionState) -> Result<Input, ConsultError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Input::Empty);
        }
        if trimmed.starts_with('/') {
            return Ok(parse_command(trimmed));
        }

        let action = match state.phase {
            Phase::SpecialtySelect => Action::SelectSpecialty {
                specialty: parse_specialty(trimmed)?,
            },
            Phase::ProfileCollect => Action::SubmitProfile {
                form: parse_profile(trimmed)?,
            },
            Phase::ProblemInput => Action::SubmitProblem {
                text: trimmed.to_string(),
            },
            Phase::FollowUpQA => Action::SubmitAnswer {
                question: state.answers.len(),
                text: trimmed.to_string(),
            },
            Phase::ReportReady => return Ok(Input::Help),
        };
        Ok(Input::Action(action))
    }
}

/// Slash commands. Unknown commands show help.
fn parse_command(trimmed: &str) -> Input {
    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (trimmed, ""),
    };

    match command.to_lowercase().as_str() {
        "/menu" | "/reset" => Input::Action(Action::FullReset),
        "/fresh" | "/new" => Input::Action(Action::StartFresh),
        "/results" | "/skip" => Input::Action(Action::SkipToResults {
            pending_answer: (!rest.is_empty()).then(|| rest.to_string()),
        }),
        "/retry" => Input::Action(Action::RetryReport),
        "/export" | "/save" => Input::Export,
        "/quit" | "/exit" => Input::Quit,
        _ => Input::Help,
    }
}

/// A menu number (1-based) or a specialty name.
fn parse_specialty(input: &str) -> Result<Specialty, ConsultError> {
    if let Ok(n) = input.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| Specialty::MENU.get(i).cloned())
            .ok_or_else(|| {
                ConsultError::validation(
                    "specialty",
                    format!("pick a number from 1 to {}", Specialty::MENU.len()),
                )
            });
    }
    input.parse()
}

/// `age weight height gender`, e.g. `30 70 175 female`.
fn parse_profile(input: &str) -> Result<ProfileForm, ConsultError> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let [age, weight, height, gender] = parts.as_slice() else {
        return Err(ConsultError::validation(
            "profile",
            "enter: age weight(kg) height(cm) gender",
        ));
    };
    Ok(ProfileForm {
        age: age.to_string(),
        weight_kg: weight.to_string(),
        height_cm: height.to_string(),
        gender: Some(gender.parse::<Gender>()?),
    })
}
