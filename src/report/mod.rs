//! Markdown rendering of a finished run.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::orchestrator::RunOutcome;

pub const REPORT_TITLE: &str = "# Code review report";

/// Renders per-file results in order, then the overall summary and the
/// reflection when present. Results that start with `ERROR` are italicised.
pub fn render_markdown(
    results: &[(String, String)],
    project_summary: Option<&str>,
    reflection: Option<&str>,
) -> String {
    let mut lines: Vec<String> = vec![REPORT_TITLE.to_string(), String::new()];

    if results.is_empty() {
        lines.push("_No supported files found._".to_string());
        lines.push(String::new());
    }

    for (file, analysis) in results {
        lines.push(format!("## File: `{}`", file));
        lines.push(String::new());
        let text = analysis.trim();
        if text.to_uppercase().starts_with("ERROR") {
            lines.push(format!("*{}*", text));
        } else {
            lines.push(text.to_string());
        }
        lines.push(String::new());
    }

    for (heading, body) in [("## Overall summary", project_summary), ("## Reflection", reflection)] {
        if let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) {
            lines.push(heading.to_string());
            lines.push(String::new());
            lines.push(body.to_string());
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

pub fn render_outcome(outcome: &RunOutcome) -> String {
    render_markdown(
        &outcome.results,
        Some(&outcome.project_summary),
        Some(&outcome.reflection),
    )
}

/// Writes the document as UTF-8, creating parent directories as needed.
pub fn persist(document: &str, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(destination, document)?;
    info!(path = %destination.display(), bytes = document.len(), "Report saved");
    Ok(())
}

pub fn display(document: &str) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", document)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn results(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(f, r)| (f.to_string(), r.to_string()))
            .collect()
    }

    #[test]
    fn test_render_sections_in_order() {
        let doc = render_markdown(
            &results(&[("src/a.h", "### Block 1/1\n\nfine"), ("src/b.py", "  issues  ")]),
            Some("all good"),
            Some("plan held"),
        );

        assert!(doc.starts_with("# Code review report\n\n## File: `src/a.h`\n\n### Block 1/1\n\nfine\n"));
        let a = doc.find("src/a.h").unwrap();
        let b = doc.find("src/b.py").unwrap();
        let summary = doc.find("## Overall summary\n\nall good").unwrap();
        let reflection = doc.find("## Reflection\n\nplan held").unwrap();
        assert!(a < b && b < summary && summary < reflection);
        assert!(doc.contains("\nissues\n"));
    }

    #[test]
    fn test_error_results_are_italicised() {
        let doc = render_markdown(
            &results(&[("x.sql", "ERROR: cannot read file (denied)")]),
            None,
            None,
        );
        assert!(doc.contains("*ERROR: cannot read file (denied)*"));
    }

    #[test]
    fn test_blank_sections_are_omitted() {
        let doc = render_markdown(&results(&[("a.py", "ok")]), Some("  "), None);
        assert!(!doc.contains("## Overall summary"));
        assert!(!doc.contains("## Reflection"));
    }

    #[test]
    fn test_empty_run() {
        let doc = render_markdown(&[], None, None);
        assert!(doc.contains("_No supported files found._"));
    }

    #[test]
    fn test_persist_writes_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/report.md");
        persist("# Отчёт ✓", &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Отчёт ✓");
    }
}
