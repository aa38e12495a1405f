//! Text cleanup passes applied before a string is parsed as JSON.
//!
//! Each pass is a plain string transform with no failure mode.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Pass 1: Strip terminal escape sequences
// ---------------------------------------------------------------------------

/// Remove ANSI/VT100 escape sequences.
///
/// Matches ESC followed by a Fe byte (`@`..`_`, which includes the `[` CSI
/// introducer), any parameter bytes, any intermediate bytes, and a final
/// byte in `@`..`~`. Cursor movement, erase, and SGR color codes all match.
pub fn strip_ansi(text: &str) -> String {
    static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("valid regex")
    });

    ANSI_RE.replace_all(text, "").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 2: Unwrap fenced code blocks
// ---------------------------------------------------------------------------

/// If the whole text is a single fenced code block, return its body.
///
/// Model replies often wrap JSON in ```` ```json ```` fences. Text that is
/// not entirely one fence is returned unchanged.
pub fn strip_code_fence(text: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n([\s\S]*?)\r?\n?```\s*$")
            .expect("valid regex")
    });

    match FENCE_RE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Pass 3: Quote repair
// ---------------------------------------------------------------------------

/// Swap single quotes for double quotes.
///
/// Turns repr-style text such as `{'a': 1}` into JSON. Apostrophes inside
/// values are swapped too, which usually breaks the parse; callers only use
/// this as a second attempt.
pub(crate) fn repair_quotes(text: &str) -> String {
    text.replace('\'', "\"")
}
