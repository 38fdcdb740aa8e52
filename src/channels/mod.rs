//! Terminal front end for consultations.

pub mod cli;
pub mod input;

pub use cli::CliChannel;
pub use input::{Input, InputParser};
