//! Consultation intake: the specialty wizard.
//!
//! A consultation walks the user from a specialty menu through an optional
//! nutrition profile and a free-text problem description into a short run of
//! generated follow-up questions, then produces a sectioned advice report.
//! `FlowController` owns the session and is the only thing that mutates it.

pub mod controller;
pub mod generators;
pub mod model;
pub mod prompts;
pub mod report;
pub mod routes;
pub mod sessions;
pub mod state;

pub use controller::{Action, CurrentQuestion, FlowController, SessionView, reduce};
pub use generators::{
    AdviceGenerator, LlmAdviceGenerator, LlmQuestionGenerator, QuestionGenerator,
};
pub use model::{BmiCategory, Gender, Profile, ProfileForm, QuestionAnswer, Specialty};
pub use report::{ReportExport, ReportSection, parse_sections};
pub use routes::{ConsultRouteState, consult_routes};
pub use sessions::{SessionStore, spawn_expiry_task};
pub use state::{Phase, SessionState};
