//! Plain-text rendering of a run for the terminal.

use std::fmt::Write as _;

use researchflow_core::{PresentationModel, WritingRegion};
use researchflow_normalize::{NormalizedResult, strip_ansi};
use serde_json::Value;

/// Blog previews longer than this are cut.
const BLOG_PREVIEW_CHARS: usize = 2_000;

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "{title}\n{}", "-".repeat(title.chars().count()));
}

/// Strings print bare, anything else as indented JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub(crate) fn failure_notice(stage: &str) -> String {
    format!(
        "The pipeline stopped at `{stage}`. Partial results and the full console output follow.\n"
    )
}

pub(crate) fn console_section(diagnostics: &str) -> String {
    let mut out = String::new();
    heading(&mut out, "Agent Console Output");
    let cleaned = strip_ansi(diagnostics);
    if cleaned.trim().is_empty() {
        out.push_str("No console output was produced by the pipeline run.\n");
    } else {
        out.push_str(cleaned.trim_end());
        out.push('\n');
    }
    out
}

pub(crate) fn raw_section(normalized: &NormalizedResult) -> String {
    let mut out = String::new();
    heading(&mut out, "Results (raw)");
    out.push_str(&normalized.to_export_string());
    out.push('\n');
    out
}

pub(crate) fn content_section(writing: &WritingRegion) -> String {
    let mut out = String::new();
    heading(&mut out, "Content Outputs");

    if let Some(blog) = writing.blog.as_ref().filter(|b| is_truthy(b)) {
        let text = display_value(blog);
        let preview: String = text.chars().take(BLOG_PREVIEW_CHARS).collect();
        let _ = writeln!(out, "\n## Blog (Preview)\n\n{preview}");
        if preview.len() < text.len() {
            out.push_str("…\n");
        }
    }

    for (label, value) in [
        ("LinkedIn", &writing.linkedin),
        ("X / Thread", &writing.x_thread),
        ("Newsletter", &writing.newsletter),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "\n## {label}\n\n{}", display_value(value));
        }
    }
    out
}

/// Research, retrieval, SEO, and the numbered top-10 list.
pub(crate) fn quick_view(model: &PresentationModel, is_mapping: bool) -> String {
    let mut out = String::new();
    heading(&mut out, "Quick View");

    if !is_mapping {
        out.push_str("Quick View not available for non-mapping results.\n");
        return out;
    }

    let sections = [
        ("Research: extracted sources", &model.research),
        ("RAG: build info / chunks", &model.retrieval),
        ("SEO", &model.seo),
    ];
    for (title, value) in sections {
        if let Some(value) = value {
            let _ = writeln!(out, "\n## {title}\n\n{}", display_value(value));
        }
    }

    if let Some(top10) = model.writing.as_ref().and_then(|w| w.top10.as_ref()) {
        out.push_str("\n## Top 10 Insights\n\n");
        for (i, item) in top10.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, display_value(item));
        }
    }

    if let Some(error) = &model.error {
        let _ = writeln!(out, "\n## Error\n\n{error}");
    }
    out
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use researchflow_core::present;
    use serde_json::json;

    use super::*;

    #[test]
    fn console_strips_escape_codes() {
        let out = console_section("\x1b[1;32mAgent started\x1b[0m\n");
        assert!(out.contains("Agent started"));
        assert!(!out.contains('\x1b'));

        let empty = console_section("");
        assert!(empty.contains("No console output"));
    }

    #[test]
    fn quick_view_numbers_top10() {
        let model = present(&NormalizedResult::Json(json!({
            "research_task": [{"title": "T"}],
            "content_writing_task": {"top_10": ["alpha", "beta"]}
        })));
        let out = quick_view(&model, true);
        assert!(out.contains("Research: extracted sources"));
        assert!(out.contains("1. alpha\n2. beta"));
        assert!(!out.contains("## SEO"));
    }

    #[test]
    fn quick_view_needs_a_mapping() {
        let model = present(&NormalizedResult::Text("oops".into()));
        assert!(quick_view(&model, false).contains("not available"));
    }

    #[test]
    fn content_skips_empty_blog() {
        let model = present(&NormalizedResult::Json(json!({
            "content_writing_task": {"blog": "", "linkedin": "Post body"}
        })));
        let out = content_section(model.writing.as_ref().unwrap());
        assert!(!out.contains("Blog (Preview)"));
        assert!(out.contains("## LinkedIn\n\nPost body"));
    }
}
