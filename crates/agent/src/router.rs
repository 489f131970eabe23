//! Deterministic persona-transfer intent detection, checked before every
//! LLM call (spec.md §4.2). Never escalates to the LLM and never fails.

use once_cell::sync::Lazy;
use regex::Regex;

/// Declaration order doubles as tie-break order when patterns from more
/// than one persona could plausibly match the same input.
const PERSONAS: &[&str] = &["alice", "bob"];

static ALICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"transfer.*alice",
        r"let me talk to alice",
        r"switch.*alice",
        r"bring.*alice",
        r"connect.*alice",
        r"put.*alice.*on",
        r"speak.*alice",
        r"can i talk to alice",
        r"i want alice",
        r"i need alice",
    ])
});

static BOB_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"transfer.*bob",
        r"let me talk to bob",
        r"switch.*bob",
        r"bring.*bob",
        r"go back.*bob",
        r"back to bob",
        r"return.*bob",
        r"put.*bob.*on",
        r"speak.*bob",
        r"can i talk to bob",
        r"i want bob",
        r"i need bob",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static transfer pattern is valid"))
        .collect()
}

fn patterns_for(persona: &str) -> &'static [Regex] {
    match persona {
        "alice" => &ALICE_PATTERNS,
        _ => &BOB_PATTERNS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMatch {
    pub target_persona: String,
    pub matched_pattern: String,
}

/// Detect an explicit persona-switch request in `user_input`. Matching is
/// case-insensitive; the first persona (in declaration order) with a
/// matching pattern wins.
pub fn detect_transfer(user_input: &str) -> Option<TransferMatch> {
    let text = user_input.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();

    for persona in PERSONAS {
        for pattern in patterns_for(persona) {
            if pattern.is_match(&lower) {
                return Some(TransferMatch {
                    target_persona: persona.to_string(),
                    matched_pattern: pattern.as_str().to_string(),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_never_transfers() {
        assert!(detect_transfer("").is_none());
        assert!(detect_transfer("   ").is_none());
    }

    #[test]
    fn detects_explicit_alice_request() {
        let m = detect_transfer("Can you transfer me to Alice please?").unwrap();
        assert_eq!(m.target_persona, "alice");
    }

    #[test]
    fn detects_back_to_bob_phrasing() {
        let m = detect_transfer("ok go back to bob now").unwrap();
        assert_eq!(m.target_persona, "bob");
    }

    #[test]
    fn is_case_insensitive() {
        let m = detect_transfer("I WANT ALICE").unwrap();
        assert_eq!(m.target_persona, "alice");
    }

    #[test]
    fn unrelated_text_does_not_transfer() {
        assert!(detect_transfer("what's my budget looking like these days").is_none());
    }
}
