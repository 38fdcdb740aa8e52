//! CLI channel: stdin/stdout consultation REPL.

use std::fmt::Write as _;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::input::{Input, InputParser};
use crate::consult::{Action, FlowController, Phase, SessionView, Specialty};
use crate::error::Error;

const HELP: &str = "\
Commands:
  /menu            back to the specialist menu (clears everything)
  /fresh           new consultation with the same specialist
  /results [text]  stop the questions and get the report now
  /retry           retry a failed report
  /export          save the report as a text file
  /help            show this list
  /quit            exit";

/// Runs one consultation on the local terminal.
pub struct CliChannel {
    flow: FlowController,
    export_dir: PathBuf,
}

impl CliChannel {
    pub fn new(flow: FlowController, export_dir: PathBuf) -> Self {
        Self { flow, export_dir }
    }

    /// Read lines until EOF or `/quit`.
    pub async fn run(mut self) -> Result<(), Error> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        println!("{}", render(&self.flow.view()));
        eprint!("> ");

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    tracing::error!("Error reading stdin: {}", e);
                    break;
                }
            };

            let input = match InputParser::parse(&line, self.flow.state()) {
                Ok(input) => input,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    eprint!("> ");
                    continue;
                }
            };

            match input {
                Input::Quit => break,
                Input::Help => println!("\n{HELP}\n"),
                Input::Empty => {
                    let view = self.flow.refresh().await;
                    println!("\n{}", render(&view));
                }
                Input::Export => self.export().await,
                Input::Action(action) => {
                    if let Some(status) = pending_status(&action) {
                        eprintln!("⏳ {status}");
                    }
                    match self.flow.dispatch(action).await {
                        Ok(view) => println!("\n{}", render(&view)),
                        Err(e) => eprintln!("❌ {}", e),
                    }
                }
            }
            eprint!("> ");
        }

        Ok(())
    }

    async fn export(&self) {
        let export = match self.flow.export(chrono::Local::now().naive_local()) {
            Ok(export) => export,
            Err(e) => {
                eprintln!("❌ {}", e);
                return;
            }
        };
        match export.write_to(&self.export_dir).await {
            Ok(path) => eprintln!("✅ Report saved to {}", path.display()),
            Err(e) => {
                tracing::warn!(error = %e, "Report export failed");
                eprintln!("❌ {}", e);
            }
        }
    }
}

/// A status line for actions that may wait on the model.
fn pending_status(action: &Action) -> Option<&'static str> {
    match action {
        Action::SubmitProblem { .. } => Some("Thinking of a question..."),
        Action::SubmitAnswer { .. } => Some("Thinking..."),
        Action::SkipToResults { .. } | Action::RetryReport => Some("Preparing your report..."),
        _ => None,
    }
}

/// Render a session view as terminal text.
pub fn render(view: &SessionView) -> String {
    let mut out = String::new();
    if let Some(title) = &view.title {
        let _ = writeln!(out, "🏥 {title}");
    }

    match view.phase {
        Phase::SpecialtySelect => {
            out.push_str("Choose a specialist:\n");
            for (i, specialty) in Specialty::MENU.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", i + 1, specialty.title());
            }
            out.push_str("Or type any other specialty by name.");
        }
        Phase::ProfileCollect => {
            out.push_str("Tell me about yourself: age weight(kg) height(cm) gender(m/f/o)\n");
            out.push_str("e.g. 30 70 175 f");
        }
        Phase::ProblemInput => {
            if let Some(profile) = &view.profile {
                let _ = writeln!(
                    out,
                    "BMI {:.1} ({}). {}",
                    profile.bmi,
                    profile.bmi_category.label(),
                    view.profile_advice.as_deref().unwrap_or_default()
                );
            }
            out.push_str("Describe what is bothering you:");
        }
        Phase::FollowUpQA => match &view.current_question {
            Some(q) => {
                let _ = write!(out, "Question {} of {}: {}", q.index + 1, q.total, q.text);
            }
            None => out.push_str("Waiting for the next question. Press Enter to retry."),
        },
        Phase::ReportReady => render_report(view, &mut out),
    }
    out
}

fn render_report(view: &SessionView, out: &mut String) {
    if view.report_failed {
        let _ = writeln!(out, "{}", view.report.as_deref().unwrap_or_default());
        out.push_str("The report could not be generated. Type /retry to try again.");
        return;
    }
    if view.sections.is_empty() {
        out.push_str("Preparing your report. Press Enter to check again.");
        return;
    }
    for section in &view.sections {
        if !section.title.is_empty() {
            let _ = writeln!(out, "── {} ──", section.title);
        }
        let _ = writeln!(out, "{}\n", section.content.trim());
    }
    out.push_str("/export to save, /fresh for a new consultation, /menu for the menu.");
}
