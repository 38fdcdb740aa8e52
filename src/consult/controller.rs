//! FlowController: applies user actions to a consultation and runs the
//! guarded generation steps on entry to each phase.
//!
//! Transitions are a pure reducer, [`reduce`], over [`SessionState`]. The
//! controller owns the state, swaps in the reducer's result, then "enters"
//! the new phase: if the state shape says a question or the report is
//! missing, exactly one adapter call fills it. Re-entering the same phase
//! (a re-render, [`Action::Refresh`]) finds nothing missing and makes no
//! call, so the host can re-run the control path as often as it likes.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConsultError, ExportError};

use super::generators::{
    AdviceGenerator, QuestionGenerator, error_report, fallback_question,
};
use super::model::{Profile, ProfileForm, QuestionAnswer, Specialty};
use super::prompts::build_advice_prompt;
use super::report::{ReportExport, ReportSection, parse_sections};
use super::state::{Phase, SessionState};

/// A user action. Each one is consumed in a single transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Pick a specialty from the menu.
    SelectSpecialty { specialty: Specialty },
    /// Submit the nutrition profile form.
    SubmitProfile { form: ProfileForm },
    /// Submit the free-text problem description.
    SubmitProblem { text: String },
    /// Answer the question at index `question` (0-based, as displayed).
    SubmitAnswer { question: usize, text: String },
    /// Stop asking and produce the report. A non-empty `pending_answer`
    /// for the displayed question is recorded first.
    SkipToResults {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pending_answer: Option<String>,
    },
    /// Same specialty (and profile), new problem.
    StartFresh,
    /// Back to the specialty menu with everything cleared.
    FullReset,
    /// Drop a failed report so the next entry asks for it again.
    RetryReport,
    /// Re-render without a user action.
    Refresh,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectSpecialty { .. } => "select_specialty",
            Self::SubmitProfile { .. } => "submit_profile",
            Self::SubmitProblem { .. } => "submit_problem",
            Self::SubmitAnswer { .. } => "submit_answer",
            Self::SkipToResults { .. } => "skip_to_results",
            Self::StartFresh => "start_fresh",
            Self::FullReset => "full_reset",
            Self::RetryReport => "retry_report",
            Self::Refresh => "refresh",
        }
    }

    /// Resets may jump to any phase; other actions follow the phase order.
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::StartFresh | Self::FullReset)
    }
}

fn expect_phase(state: &SessionState, phase: Phase, action: &Action) -> Result<(), ConsultError> {
    if state.phase == phase {
        Ok(())
    } else {
        Err(ConsultError::InvalidTransition {
            phase: state.phase.to_string(),
            action: action.name().to_string(),
        })
    }
}

/// Apply `action` to `state`, returning the next state.
///
/// Never calls out; generation happens when the controller enters the new
/// phase. On error the caller keeps `state` as it was.
pub fn reduce(state: &SessionState, action: &Action) -> Result<SessionState, ConsultError> {
    let mut next = state.clone();

    match action {
        Action::SelectSpecialty { specialty } => {
            expect_phase(state, Phase::SpecialtySelect, action)?;
            next = SessionState::new(state.max_questions);
            next.specialty = Some(specialty.normalized()?);
            next.phase = next.entry_phase();
        }

        Action::SubmitProfile { form } => {
            expect_phase(state, Phase::ProfileCollect, action)?;
            next.profile = Some(Profile::from_form(form)?);
            next.phase = Phase::ProblemInput;
        }

        Action::SubmitProblem { text } => {
            expect_phase(state, Phase::ProblemInput, action)?;
            let problem = text.trim();
            if problem.is_empty() {
                return Err(ConsultError::validation(
                    "problem",
                    "please describe your health concern",
                ));
            }
            next.problem = problem.to_string();
            next.clear_cycle();
            next.phase = Phase::FollowUpQA;
        }

        Action::SubmitAnswer { question, text } => {
            expect_phase(state, Phase::FollowUpQA, action)?;
            let pending = state
                .pending_question()
                .ok_or(ConsultError::NoPendingQuestion)?;
            if *question != pending {
                return Err(ConsultError::StaleAnswer {
                    expected: pending,
                    got: *question,
                });
            }
            let answer = text.trim();
            if answer.is_empty() {
                return Err(ConsultError::validation("answer", "please type an answer"));
            }
            next.answers
                .push(QuestionAnswer::new(state.questions[pending].clone(), answer));
            if next.answers.len() >= next.max_questions {
                next.phase = Phase::ReportReady;
            }
        }

        Action::SkipToResults { pending_answer } => {
            expect_phase(state, Phase::FollowUpQA, action)?;
            let salvaged = pending_answer.as_deref().map(str::trim).filter(|a| !a.is_empty());
            if let (Some(idx), Some(answer)) = (state.pending_question(), salvaged) {
                next.answers
                    .push(QuestionAnswer::new(state.questions[idx].clone(), answer));
            }
            // Drop the displayed-but-unanswered question.
            let answered = next.answers.len();
            next.questions.truncate(answered);
            next.phase = Phase::ReportReady;
        }

        Action::StartFresh => {
            if state.specialty.is_some() {
                next.clear_cycle();
                next.phase = next.entry_phase();
            }
        }

        Action::FullReset => {
            next = SessionState::new(state.max_questions);
        }

        Action::RetryReport => {
            expect_phase(state, Phase::ReportReady, action)?;
            if !state.report_failed {
                return Err(ConsultError::InvalidTransition {
                    phase: state.phase.to_string(),
                    action: action.name().to_string(),
                });
            }
            next.report = None;
            next.report_failed = false;
        }

        Action::Refresh => {}
    }

    Ok(next)
}

/// The question currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentQuestion {
    /// 0-based index, echoed back in [`Action::SubmitAnswer`].
    pub index: usize,
    pub total: usize,
    pub text: String,
}

/// Everything a front end needs to render the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialty: Option<Specialty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_advice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<CurrentQuestion>,
    pub answers: Vec<QuestionAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub sections: Vec<ReportSection>,
    pub report_failed: bool,
}

impl SessionView {
    pub fn from_state(state: &SessionState) -> Self {
        let current_question = state.pending_question().map(|index| CurrentQuestion {
            index,
            total: state.max_questions,
            text: state.questions[index].clone(),
        });
        let sections = state
            .report
            .as_deref()
            .filter(|_| !state.report_failed)
            .map(parse_sections)
            .unwrap_or_default();

        Self {
            phase: state.phase,
            specialty: state.specialty.clone(),
            title: state.specialty.as_ref().map(|s| s.title().to_string()),
            problem: state.problem.clone(),
            profile: state.profile.clone(),
            profile_advice: state.profile.as_ref().map(|p| p.advice().to_string()),
            current_question,
            answers: state.answers.clone(),
            report: state.report.clone(),
            sections,
            report_failed: state.report_failed,
        }
    }
}

/// Owns one consultation and drives it through its phases.
pub struct FlowController {
    state: SessionState,
    questions: Arc<dyn QuestionGenerator>,
    advice: Arc<dyn AdviceGenerator>,
}

impl FlowController {
    pub fn new(
        questions: Arc<dyn QuestionGenerator>,
        advice: Arc<dyn AdviceGenerator>,
        max_questions: usize,
    ) -> Self {
        Self {
            state: SessionState::new(max_questions),
            questions,
            advice,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn view(&self) -> SessionView {
        SessionView::from_state(&self.state)
    }

    /// Apply one action, then enter the resulting phase.
    ///
    /// A rejected action leaves the session untouched.
    pub async fn dispatch(&mut self, action: Action) -> Result<SessionView, ConsultError> {
        let next = match reduce(&self.state, &action) {
            Ok(next) => next,
            Err(e) => {
                debug!(
                    action = action.name(),
                    phase = %self.state.phase,
                    error = %e,
                    "Action rejected"
                );
                return Err(e);
            }
        };

        if next.phase != self.state.phase
            && !action.is_reset()
            && !self.state.phase.can_transition_to(next.phase)
        {
            warn!(
                action = action.name(),
                from = %self.state.phase,
                to = %next.phase,
                "Reducer produced an unlisted phase change"
            );
            return Err(ConsultError::InvalidTransition {
                phase: self.state.phase.to_string(),
                action: action.name().to_string(),
            });
        }

        if let Err(reason) = next.check_invariants() {
            warn!(
                action = action.name(),
                reason = %reason,
                "Transition would break session invariants"
            );
            return Err(ConsultError::InvalidTransition {
                phase: self.state.phase.to_string(),
                action: action.name().to_string(),
            });
        }

        if next.phase != self.state.phase {
            info!(
                action = action.name(),
                from = %self.state.phase,
                to = %next.phase,
                "Consultation phase changed"
            );
        }

        self.state = next;
        self.enter().await;
        Ok(self.view())
    }

    /// Re-run the current phase's entry step without a user action.
    pub async fn refresh(&mut self) -> SessionView {
        self.enter().await;
        self.view()
    }

    /// Fill whatever the current phase is missing. At most one adapter call.
    async fn enter(&mut self) {
        if self.state.needs_question() {
            self.generate_question().await;
        } else if self.state.needs_report() {
            self.generate_report().await;
        } else {
            debug!(phase = %self.state.phase, "Nothing to generate on entry");
        }
    }

    async fn generate_question(&mut self) {
        let Some(specialty) = self.state.specialty.clone() else {
            return;
        };
        let number = self.state.questions.len() + 1;

        let question = match self
            .questions
            .generate(&specialty, &self.state.problem, &self.state.answers, number)
            .await
        {
            Ok(q) => q,
            Err(e) => {
                warn!(
                    question_number = number,
                    error = %e,
                    "Question generation failed, using fallback"
                );
                fallback_question(&self.state.problem)
            }
        };

        info!(question_number = number, "Follow-up question ready");
        self.state.questions.push(question);
    }

    async fn generate_report(&mut self) {
        let Some(specialty) = self.state.specialty.clone() else {
            return;
        };
        let prompt = build_advice_prompt(
            &specialty,
            self.state.profile.as_ref(),
            &self.state.problem,
            &self.state.answers,
        );

        let (report, failed) = match self.advice.generate(&prompt).await {
            Ok(report) => (report, false),
            Err(e) => {
                warn!(specialty = %specialty, error = %e, "Advice generation failed");
                (error_report(&e), true)
            }
        };

        info!(specialty = %specialty, answers = self.state.answers.len(), failed, "Report cached");
        self.state.report = Some(report);
        self.state.report_failed = failed;
    }

    /// Build the plain-text export of the cached report.
    pub fn export(&self, generated_at: NaiveDateTime) -> Result<ReportExport, ExportError> {
        match (&self.state.specialty, self.state.report.as_deref()) {
            (Some(specialty), Some(report)) if !self.state.report_failed => {
                Ok(ReportExport::new(specialty, report, generated_at))
            }
            _ => Err(ExportError::NoReport),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::consult::model::Gender;
    use crate::error::LlmError;

    /// Numbered questions; counts calls. Fails every call when `fail` is set.
    #[derive(Default)]
    struct StubQuestions {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl QuestionGenerator for StubQuestions {
        async fn generate(
            &self,
            _specialty: &Specialty,
            _problem: &str,
            prior: &[QuestionAnswer],
            question_number: usize,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(prior.len() + 1, question_number, "asked out of order");
            if self.fail {
                return Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "offline".into(),
                });
            }
            Ok(format!("Question {question_number}?"))
        }
    }

    /// Returns a fixed two-section report and records prompts.
    #[derive(Default)]
    struct StubAdvice {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        fail: bool,
        reply: Option<String>,
    }

    #[async_trait]
    impl AdviceGenerator for StubAdvice {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(LlmError::AuthFailed {
                    provider: "stub".into(),
                });
            }
            Ok(self
                .reply
                .clone()
                .unwrap_or_else(|| "### Initial Assessment\nX\n### Recommendations\nY".to_string()))
        }
    }

    fn controller(
        questions: Arc<StubQuestions>,
        advice: Arc<StubAdvice>,
    ) -> FlowController {
        FlowController::new(questions, advice, 3)
    }

    fn answer(idx: usize, text: &str) -> Action {
        Action::SubmitAnswer {
            question: idx,
            text: text.to_string(),
        }
    }

    fn profile_form() -> ProfileForm {
        ProfileForm {
            age: "30".into(),
            weight_kg: "70".into(),
            height_cm: "175".into(),
            gender: Some(Gender::Male),
        }
    }

    async fn start_physician(flow: &mut FlowController, problem: &str) {
        flow.dispatch(Action::SelectSpecialty {
            specialty: Specialty::Physician,
        })
        .await
        .unwrap();
        flow.dispatch(Action::SubmitProblem {
            text: problem.into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn physician_full_flow() {
        let questions = Arc::new(StubQuestions::default());
        let advice = Arc::new(StubAdvice::default());
        let mut flow = controller(questions.clone(), advice.clone());

        let view = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Physician,
            })
            .await
            .unwrap();
        assert_eq!(view.phase, Phase::ProblemInput);
        assert_eq!(view.title.as_deref(), Some("General Physician"));

        let view = flow
            .dispatch(Action::SubmitProblem {
                text: "chest pain for two days".into(),
            })
            .await
            .unwrap();
        assert_eq!(view.phase, Phase::FollowUpQA);
        assert_eq!(view.current_question.as_ref().unwrap().text, "Question 1?");

        flow.dispatch(answer(0, "no meds")).await.unwrap();
        flow.dispatch(answer(1, "worse at night")).await.unwrap();
        let view = flow.dispatch(answer(2, "mild")).await.unwrap();

        assert_eq!(view.phase, Phase::ReportReady);
        assert_eq!(questions.calls.load(Ordering::SeqCst), 3);
        assert_eq!(advice.calls.load(Ordering::SeqCst), 1);
        assert!(view.current_question.is_none());
        assert_eq!(
            view.sections,
            vec![
                ReportSection {
                    title: "Initial Assessment".into(),
                    content: "X".into()
                },
                ReportSection {
                    title: "Recommendations".into(),
                    content: "Y".into()
                },
            ]
        );

        let prompt = advice.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("chest pain for two days"));
        let positions: Vec<usize> = ["no meds", "worse at night", "mild"]
            .iter()
            .map(|a| prompt.find(a).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(flow.state().check_invariants().is_ok());
    }

    #[tokio::test]
    async fn refresh_does_not_regenerate_question() {
        let questions = Arc::new(StubQuestions::default());
        let mut flow = controller(questions.clone(), Arc::new(StubAdvice::default()));
        start_physician(&mut flow, "headache").await;

        for _ in 0..5 {
            flow.refresh().await;
            flow.dispatch(Action::Refresh).await.unwrap();
        }
        assert_eq!(questions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(flow.state().questions.len(), 1);
    }

    #[tokio::test]
    async fn replayed_answer_is_not_duplicated() {
        let questions = Arc::new(StubQuestions::default());
        let mut flow = controller(questions.clone(), Arc::new(StubAdvice::default()));
        start_physician(&mut flow, "headache").await;

        flow.dispatch(answer(0, "since monday")).await.unwrap();
        flow.refresh().await;
        let err = flow.dispatch(answer(0, "since monday")).await.unwrap_err();

        assert_eq!(err, ConsultError::StaleAnswer { expected: 1, got: 0 });
        assert_eq!(flow.state().answers.len(), 1);
        assert_eq!(flow.state().questions.len(), 2);
        assert_eq!(questions.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn report_is_generated_once() {
        let advice = Arc::new(StubAdvice::default());
        let mut flow = controller(Arc::new(StubQuestions::default()), advice.clone());
        start_physician(&mut flow, "cough").await;
        let first = flow
            .dispatch(Action::SkipToResults {
                pending_answer: None,
            })
            .await
            .unwrap();

        for _ in 0..3 {
            let again = flow.refresh().await;
            assert_eq!(again.report, first.report);
        }
        assert_eq!(advice.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_after_one_answer_reports_one_answer() {
        let advice = Arc::new(StubAdvice::default());
        let mut flow = controller(Arc::new(StubQuestions::default()), advice.clone());
        start_physician(&mut flow, "back pain").await;
        flow.dispatch(answer(0, "two weeks")).await.unwrap();
        assert_eq!(flow.state().questions.len(), 2);

        flow.dispatch(Action::SkipToResults {
            pending_answer: None,
        })
        .await
        .unwrap();

        let state = flow.state();
        assert_eq!(state.phase, Phase::ReportReady);
        assert_eq!(state.answers.len(), 1);
        assert_eq!(state.questions.len(), 1, "unanswered question dropped");

        let prompt = advice.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("A1: two weeks"));
        assert!(!prompt.contains("A2:"));
    }

    #[tokio::test]
    async fn skip_salvages_buffered_answer() {
        let advice = Arc::new(StubAdvice::default());
        let mut flow = controller(Arc::new(StubQuestions::default()), advice.clone());
        start_physician(&mut flow, "back pain").await;

        flow.dispatch(Action::SkipToResults {
            pending_answer: Some("  since lifting boxes ".into()),
        })
        .await
        .unwrap();

        assert_eq!(flow.state().answers.len(), 1);
        assert_eq!(flow.state().answers[0].answer, "since lifting boxes");
        assert!(advice.prompts.lock().unwrap()[0].contains("since lifting boxes"));
    }

    #[tokio::test]
    async fn skip_ignores_blank_buffer() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        start_physician(&mut flow, "back pain").await;
        flow.dispatch(Action::SkipToResults {
            pending_answer: Some("   ".into()),
        })
        .await
        .unwrap();
        assert!(flow.state().answers.is_empty());
        assert!(flow.state().questions.is_empty());
    }

    #[tokio::test]
    async fn full_reset_clears_everything() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        start_physician(&mut flow, "fever").await;
        flow.dispatch(Action::SkipToResults {
            pending_answer: None,
        })
        .await
        .unwrap();

        for _ in 0..2 {
            let view = flow.dispatch(Action::FullReset).await.unwrap();
            assert_eq!(view.phase, Phase::SpecialtySelect);
            let state = flow.state();
            assert!(state.specialty.is_none());
            assert!(state.questions.is_empty());
            assert!(state.answers.is_empty());
            assert!(state.report.is_none());
            assert!(state.problem.is_empty());
        }
    }

    #[tokio::test]
    async fn start_fresh_keeps_nutritionist_profile() {
        let questions = Arc::new(StubQuestions::default());
        let advice = Arc::new(StubAdvice::default());
        let mut flow = controller(questions.clone(), advice.clone());

        let view = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Nutritionist,
            })
            .await
            .unwrap();
        assert_eq!(view.phase, Phase::ProfileCollect);

        let view = flow
            .dispatch(Action::SubmitProfile {
                form: profile_form(),
            })
            .await
            .unwrap();
        assert_eq!(view.phase, Phase::ProblemInput);
        assert_eq!(view.profile.as_ref().unwrap().bmi, 22.9);
        assert!(view.profile_advice.is_some());

        flow.dispatch(Action::SubmitProblem {
            text: "always tired".into(),
        })
        .await
        .unwrap();
        flow.dispatch(Action::SkipToResults {
            pending_answer: None,
        })
        .await
        .unwrap();
        assert!(advice.prompts.lock().unwrap()[0].contains("BMI: 22.9"));

        for _ in 0..2 {
            let view = flow.dispatch(Action::StartFresh).await.unwrap();
            assert_eq!(view.phase, Phase::ProblemInput);
            assert_eq!(view.specialty, Some(Specialty::Nutritionist));
            assert!(view.profile.is_some());
            assert!(view.report.is_none());
            assert!(view.answers.is_empty());
            assert!(flow.state().questions.is_empty());
        }
    }

    #[tokio::test]
    async fn start_fresh_on_menu_is_noop() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        let view = flow.dispatch(Action::StartFresh).await.unwrap();
        assert_eq!(view.phase, Phase::SpecialtySelect);
        assert_eq!(flow.state(), &SessionState::new(3));
    }

    #[tokio::test]
    async fn nutritionist_cannot_skip_profile() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        flow.dispatch(Action::SelectSpecialty {
            specialty: Specialty::Nutritionist,
        })
        .await
        .unwrap();

        let err = flow
            .dispatch(Action::SubmitProblem {
                text: "tired".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));

        let before = flow.state().clone();
        let err = flow
            .dispatch(Action::SubmitProfile {
                form: ProfileForm {
                    weight_kg: "heavy".into(),
                    ..profile_form()
                },
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(flow.state(), &before);
        assert_eq!(flow.state().phase, Phase::ProfileCollect);
    }

    #[tokio::test]
    async fn blank_problem_and_answer_are_rejected() {
        let questions = Arc::new(StubQuestions::default());
        let mut flow = controller(questions.clone(), Arc::new(StubAdvice::default()));
        flow.dispatch(Action::SelectSpecialty {
            specialty: Specialty::Dentist,
        })
        .await
        .unwrap();

        let err = flow
            .dispatch(Action::SubmitProblem { text: "  ".into() })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(flow.state().phase, Phase::ProblemInput);
        assert_eq!(questions.calls.load(Ordering::SeqCst), 0);

        flow.dispatch(Action::SubmitProblem {
            text: "toothache".into(),
        })
        .await
        .unwrap();
        let err = flow.dispatch(answer(0, "\n")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(flow.state().answers.is_empty());
    }

    #[tokio::test]
    async fn select_specialty_only_from_menu() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        start_physician(&mut flow, "sore throat").await;
        let err = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Dentist,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));
        assert_eq!(flow.state().specialty, Some(Specialty::Physician));
    }

    #[tokio::test]
    async fn answer_outside_qa_is_rejected() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        let err = flow.dispatch(answer(0, "hello")).await.unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn question_failure_uses_fallback() {
        let questions = Arc::new(StubQuestions {
            fail: true,
            ..Default::default()
        });
        let mut flow = controller(questions.clone(), Arc::new(StubAdvice::default()));
        start_physician(&mut flow, "Chest Pain").await;
        let view = flow.view();
        assert_eq!(
            view.current_question.unwrap().text,
            "Can you tell me more about your chest pain?"
        );
        flow.refresh().await;
        assert_eq!(questions.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn advice_failure_is_cached_until_retry() {
        let advice = Arc::new(StubAdvice {
            fail: true,
            ..Default::default()
        });
        let mut flow = controller(Arc::new(StubQuestions::default()), advice.clone());
        start_physician(&mut flow, "dizzy").await;

        let view = flow
            .dispatch(Action::SkipToResults {
                pending_answer: None,
            })
            .await
            .unwrap();
        assert!(view.report_failed);
        assert!(view.sections.is_empty());
        assert!(flow.export(chrono::Utc::now().naive_utc()).is_err());

        flow.refresh().await;
        assert_eq!(advice.calls.load(Ordering::SeqCst), 1, "no automatic retry");

        flow.dispatch(Action::RetryReport).await.unwrap();
        assert_eq!(advice.calls.load(Ordering::SeqCst), 2);
        assert_eq!(flow.state().phase, Phase::ReportReady);
    }

    #[tokio::test]
    async fn retry_rejected_for_good_report() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        start_physician(&mut flow, "rash").await;
        flow.dispatch(Action::SkipToResults {
            pending_answer: None,
        })
        .await
        .unwrap();
        let err = flow.dispatch(Action::RetryReport).await.unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn export_uses_cached_report() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        start_physician(&mut flow, "rash").await;
        assert!(matches!(
            flow.export(chrono::Utc::now().naive_utc()),
            Err(ExportError::NoReport)
        ));
        flow.dispatch(Action::SkipToResults {
            pending_answer: None,
        })
        .await
        .unwrap();

        let export = flow.export(chrono::Utc::now().naive_utc()).unwrap();
        assert!(export.filename.starts_with("General_Physician_Report_"));
        assert!(export.contents.contains("Initial Assessment\nX"));
    }

    #[tokio::test]
    async fn report_starting_with_error_words_is_not_a_failure() {
        let advice = Arc::new(StubAdvice {
            reply: Some(
                "API Errors in your posture are common.\n### Recommendations\nStretch.".into(),
            ),
            ..Default::default()
        });
        let mut flow = controller(Arc::new(StubQuestions::default()), advice);
        start_physician(&mut flow, "back pain").await;

        let view = flow
            .dispatch(Action::SkipToResults {
                pending_answer: None,
            })
            .await
            .unwrap();
        assert!(!view.report_failed);
        assert_eq!(view.sections.len(), 2);
        assert_eq!(view.sections[1].title, "Recommendations");
        assert!(flow.export(chrono::Utc::now().naive_utc()).is_ok());

        let err = flow.dispatch(Action::RetryReport).await.unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));
        assert!(flow.state().report.is_some());
    }

    #[tokio::test]
    async fn blank_other_specialty_is_rejected() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        let err = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Other("   ".into()),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(flow.state().phase, Phase::SpecialtySelect);
        assert!(flow.state().specialty.is_none());
    }

    #[tokio::test]
    async fn other_specialty_is_trimmed() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        let view = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Other("  Dermatology ".into()),
            })
            .await
            .unwrap();
        assert_eq!(view.title.as_deref(), Some("Dermatology"));
        assert_eq!(view.phase, Phase::ProblemInput);
    }

    #[tokio::test]
    async fn other_named_nutritionist_still_needs_profile() {
        let mut flow = controller(
            Arc::new(StubQuestions::default()),
            Arc::new(StubAdvice::default()),
        );
        let view = flow
            .dispatch(Action::SelectSpecialty {
                specialty: Specialty::Other("nutritionist".into()),
            })
            .await
            .unwrap();
        assert_eq!(view.specialty, Some(Specialty::Nutritionist));
        assert_eq!(view.phase, Phase::ProfileCollect);
    }

    #[test]
    fn resets_are_the_only_free_jumps() {
        assert!(Action::StartFresh.is_reset());
        assert!(Action::FullReset.is_reset());
        assert!(!Action::RetryReport.is_reset());
        assert!(!Action::SkipToResults { pending_answer: None }.is_reset());
    }

    #[test]
    fn reduce_is_pure_on_error() {
        let state = SessionState::new(3);
        let err = reduce(&state, &Action::SubmitProblem { text: "x".into() }).unwrap_err();
        assert!(matches!(err, ConsultError::InvalidTransition { .. }));
        assert_eq!(state, SessionState::new(3));
    }

    #[test]
    fn action_json_shape() {
        let action: Action =
            serde_json::from_str(r#"{"type":"submit_answer","question":1,"text":"yes"}"#).unwrap();
        assert_eq!(answer(1, "yes"), action);

        let action: Action = serde_json::from_str(r#"{"type":"skip_to_results"}"#).unwrap();
        assert_eq!(
            action,
            Action::SkipToResults {
                pending_answer: None
            }
        );

        let action: Action = serde_json::from_str(
            r#"{"type":"select_specialty","specialty":"mental_health"}"#,
        )
        .unwrap();
        assert_eq!(action.name(), "select_specialty");
    }
}
