//! Consultation state machine: phases and the session record.

use serde::{Deserialize, Serialize};

use super::model::{Profile, QuestionAnswer, Specialty};

/// The phases of a consultation.
///
/// SpecialtySelect → ProfileCollect (Nutritionist only) → ProblemInput →
/// FollowUpQA → ReportReady.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    SpecialtySelect,
    ProfileCollect,
    ProblemInput,
    #[serde(rename = "follow_up_qa")]
    FollowUpQA,
    ReportReady,
}

impl Phase {
    /// Check if a forward transition from `self` to `target` is valid.
    /// Resets are not transitions in this sense; they are always allowed.
    pub fn can_transition_to(&self, target: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, target),
            (SpecialtySelect, ProfileCollect)
                | (SpecialtySelect, ProblemInput)
                | (ProfileCollect, ProblemInput)
                | (ProblemInput, FollowUpQA)
                | (FollowUpQA, FollowUpQA)
                | (FollowUpQA, ReportReady)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SpecialtySelect => "specialty_select",
            Self::ProfileCollect => "profile_collect",
            Self::ProblemInput => "problem_input",
            Self::FollowUpQA => "follow_up_qa",
            Self::ReportReady => "report_ready",
        };
        write!(f, "{s}")
    }
}

/// One consultation in progress. Owned by the flow controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub specialty: Option<Specialty>,
    pub phase: Phase,
    pub problem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    /// Generated follow-up questions, index-addressed.
    pub questions: Vec<String>,
    /// One entry per answered question, in order.
    pub answers: Vec<QuestionAnswer>,
    /// Raw report text, cached once generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Set when `report` holds the failure message instead of advice.
    #[serde(default)]
    pub report_failed: bool,
    pub max_questions: usize,
}

impl SessionState {
    /// A fresh session on the specialty menu.
    pub fn new(max_questions: usize) -> Self {
        Self {
            specialty: None,
            phase: Phase::SpecialtySelect,
            problem: String::new(),
            profile: None,
            questions: Vec::new(),
            answers: Vec::new(),
            report: None,
            report_failed: false,
            max_questions,
        }
    }

    /// Index of the question awaiting an answer, if one has been generated.
    pub fn pending_question(&self) -> Option<usize> {
        let idx = self.answers.len();
        (self.phase == Phase::FollowUpQA && idx < self.questions.len()).then_some(idx)
    }

    /// Whether entering FollowUpQA must generate the question at
    /// `questions.len()`. Derived from shape alone so re-entry never
    /// generates twice.
    pub fn needs_question(&self) -> bool {
        self.phase == Phase::FollowUpQA
            && self.questions.len() == self.answers.len()
            && self.questions.len() < self.max_questions
    }

    /// Whether entering ReportReady must generate the report.
    pub fn needs_report(&self) -> bool {
        self.phase == Phase::ReportReady && self.report.is_none()
    }

    /// The phase a consultation of the current specialty starts its cycle in.
    pub fn entry_phase(&self) -> Phase {
        match &self.specialty {
            None => Phase::SpecialtySelect,
            Some(s) if s.requires_profile() && self.profile.is_none() => Phase::ProfileCollect,
            Some(_) => Phase::ProblemInput,
        }
    }

    /// Clear the question/answer/report cycle, keeping specialty, problem and
    /// profile.
    pub(crate) fn clear_cycle(&mut self) {
        self.questions.clear();
        self.answers.clear();
        self.report = None;
        self.report_failed = false;
    }

    /// Check the structural invariants. Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.answers.len() > self.questions.len() {
            return Err(format!(
                "{} answers for {} questions",
                self.answers.len(),
                self.questions.len()
            ));
        }
        if self.questions.len() > self.max_questions {
            return Err(format!(
                "{} questions exceeds the limit of {}",
                self.questions.len(),
                self.max_questions
            ));
        }
        if self.specialty.is_none() && self.phase != Phase::SpecialtySelect {
            return Err(format!("no specialty in phase {}", self.phase));
        }
        if self.specialty.as_ref().is_some_and(|s| s.requires_profile())
            && self.profile.is_none()
            && matches!(self.phase, Phase::FollowUpQA | Phase::ReportReady)
        {
            return Err(format!("profile missing in phase {}", self.phase));
        }
        if self.report.is_some() && self.phase != Phase::ReportReady {
            return Err(format!("report cached in phase {}", self.phase));
        }
        if self.report_failed && self.report.is_none() {
            return Err("report marked failed but none cached".to_string());
        }
        Ok(())
    }
}
