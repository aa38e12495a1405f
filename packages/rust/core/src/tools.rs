//! Deterministic content heuristics used by the writing and SEO stages.

use serde::{Deserialize, Serialize};

/// Word count above which a draft earns the length bonus.
const LONG_FORM_WORDS: usize = 700;
/// Word count under which the intro is considered too thin.
const THIN_INTRO_WORDS: usize = 50;
/// Word count above which headings are suggested.
const WALL_OF_TEXT_WORDS: usize = 1200;

const BASE_SEO_SCORE: u32 = 70;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSuggestions {
    pub main: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoScore {
    pub score: u32,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleCheck {
    pub suggestions: Vec<String>,
}

/// Keyword variations around the topic.
pub fn seo_keyword_tool(topic: &str) -> KeywordSuggestions {
    KeywordSuggestions {
        main: topic.to_string(),
        keywords: vec![
            topic.to_string(),
            format!("{topic} guide"),
            format!("{topic} tips"),
            format!("{topic} examples"),
            format!("{topic} best practices"),
        ],
    }
}

/// Score a draft: base 70, +10 for long form, +5 when headings are mentioned.
pub fn seo_score_tool(content: &str) -> SeoScore {
    let mut score = BASE_SEO_SCORE;
    if word_count(content) > LONG_FORM_WORDS {
        score += 10;
    }
    if content.contains("H2") || content.contains("H3") {
        score += 5;
    }

    SeoScore {
        score,
        suggestions: vec![
            "Add more keyword-rich headings.".to_string(),
            "Add outbound authoritative links.".to_string(),
            "Write a meta description of 120-155 characters.".to_string(),
        ],
    }
}

/// One-line writing instruction for a format and tone.
pub fn prompt_template_tool(format: &str, tone: &str) -> String {
    format!("Write a {format} in a {tone} tone using the research and citations.")
}

pub fn style_check_tool(text: &str) -> StyleCheck {
    let words = word_count(text);
    let mut suggestions = Vec::new();
    if words < THIN_INTRO_WORDS {
        suggestions.push("Consider expanding the introduction for clarity.".to_string());
    }
    if words > WALL_OF_TEXT_WORDS {
        suggestions.push("Consider splitting long sections with H2/H3 headings.".to_string());
    }
    StyleCheck { suggestions }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn keywords_expand_topic() {
        let kw = seo_keyword_tool("rust async");
        assert_eq!(kw.main, "rust async");
        assert_eq!(kw.keywords.len(), 5);
        assert_eq!(kw.keywords[0], "rust async");
        assert_eq!(kw.keywords[4], "rust async best practices");
    }

    #[test]
    fn seo_score_bonuses() {
        assert_eq!(seo_score_tool("short").score, 70);
        assert_eq!(seo_score_tool(&words(701)).score, 80);
        assert_eq!(seo_score_tool(&words(700)).score, 70);
        assert_eq!(seo_score_tool(&format!("{} H2", words(701))).score, 85);
        assert_eq!(seo_score_tool("Use H3 headings").score, 75);
        assert_eq!(seo_score_tool("").suggestions.len(), 3);
    }

    #[test]
    fn prompt_template_mentions_format_and_tone() {
        assert_eq!(
            prompt_template_tool("blog", "casual"),
            "Write a blog in a casual tone using the research and citations."
        );
    }

    #[test]
    fn style_check_thresholds() {
        assert_eq!(style_check_tool(&words(10)).suggestions.len(), 1);
        assert!(style_check_tool(&words(300)).suggestions.is_empty());

        let long = style_check_tool(&words(1201));
        assert_eq!(long.suggestions.len(), 1);
        assert!(long.suggestions[0].contains("H2/H3"));
    }
}
