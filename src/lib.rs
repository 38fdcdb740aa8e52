//! AI Hospital: guided specialist consultations backed by an LLM.

pub mod channels;
pub mod config;
pub mod consult;
pub mod error;
pub mod llm;
