//! Report section parsing and plain-text export.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use crate::error::ExportError;

use super::model::Specialty;

/// `### Heading` lines. Deeper headings (`####`) are left in the content.
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}###\s*([^#\s].*?)\s*#*\s*$").unwrap());

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static ANY_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s*").unwrap());
static LIST_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+").unwrap());

/// One titled block of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
}

impl ReportSection {
    fn new(title: impl Into<String>, lines: &[&str]) -> Self {
        Self {
            title: title.into(),
            content: lines.join("\n").trim().to_string(),
        }
    }
}

/// Split a report into sections on `### ` headings.
///
/// Text before the first heading becomes an untitled leading section when it
/// is non-empty. A report with no headings comes back as one untitled section
/// holding the whole text.
pub fn parse_sections(report: &str) -> Vec<ReportSection> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in report.lines() {
        if let Some(caps) = HEADING.captures(line) {
            match title.take() {
                Some(t) => sections.push(ReportSection::new(t, &body)),
                None => {
                    let preamble = ReportSection::new("", &body);
                    if !preamble.content.is_empty() {
                        sections.push(preamble);
                    }
                }
            }
            body.clear();
            title = Some(clean_title(&caps[1]));
        } else {
            body.push(line);
        }
    }

    match title {
        Some(t) => sections.push(ReportSection::new(t, &body)),
        None if sections.is_empty() => sections.push(ReportSection {
            title: String::new(),
            content: report.trim().to_string(),
        }),
        None => {}
    }
    sections
}

/// Strip emphasis and trailing colons from a heading.
fn clean_title(raw: &str) -> String {
    let title = BOLD.replace_all(raw, "$2");
    title
        .trim()
        .trim_matches('*')
        .trim_end_matches(':')
        .trim()
        .to_string()
}

/// Convert markdown to plain text: drop heading markers and emphasis, turn
/// list dashes into bullets.
pub fn to_plain_text(markdown: &str) -> String {
    markdown
        .lines()
        .map(|line| {
            let line = ANY_HEADING.replace(line, "");
            let line = LIST_DASH.replace(&line, "${1}• ");
            let line = BOLD.replace_all(&line, "$2");
            ITALIC.replace_all(&line, "$1").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A rendered plain-text report ready to save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportExport {
    pub filename: String,
    pub contents: String,
}

impl ReportExport {
    /// Build the export for `report`, stamped with `generated_at`.
    pub fn new(specialty: &Specialty, report: &str, generated_at: NaiveDateTime) -> Self {
        let filename = format!(
            "{}_Report_{}.txt",
            specialty.slug(),
            generated_at.format("%Y%m%d_%H%M%S")
        );
        let rule = "=".repeat(48);
        let contents = format!(
            "AI Hospital - {title} Report\n\
             Specialty: {specialty}\n\
             Generated: {stamp}\n\
             {rule}\n\n\
             {body}\n",
            title = specialty.title(),
            stamp = generated_at.format("%Y-%m-%d %H:%M:%S"),
            body = to_plain_text(report).trim(),
        );
        Self { filename, contents }
    }

    /// Write the export into `dir`, creating it if needed. Returns the path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.filename);
        tokio::fs::write(&path, self.contents.as_bytes()).await?;
        Ok(path)
    }
}
