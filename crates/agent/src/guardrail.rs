//! Two-pass content safety filter applied to user transcripts before the
//! LLM call and to full LLM responses before the final TTS chunk is
//! released (spec.md §4.5). Pass 1 is a synchronous blocklist; pass 2
//! delegates to a `ModerationClient` with a 2s fail-open timeout already
//! enforced by the client implementation.

use once_cell::sync::Lazy;
use regex::RegexSet;
use std::sync::Arc;

use voice_agent_core::ModerationClient;

static BLOCKLIST: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)\b(how\s+to\s+(make|build|create|synthesize)\s+(a\s+)?(bomb|weapon|poison|drug)s?)\b",
        r"(?i)\b(kill\s+(yourself|myself|himself|herself|themselves))\b",
        r"(?i)\b(child\s+(pornography|abuse|exploitation|sexual))\b",
        r"(?i)\b(self[\-\s]harm|suicide\s+method)\b",
        r"(?i)\b(synthesize\s+(drugs?|methamphetamine|heroin|fentanyl))\b",
    ])
    .expect("static blocklist patterns are valid")
});

#[derive(Debug, Clone, Default)]
pub struct GuardrailResult {
    pub ok: bool,
    pub category: Option<String>,
    pub confidence: f32,
    pub reason: Option<String>,
}

impl GuardrailResult {
    pub fn allow() -> Self {
        Self { ok: true, ..Default::default() }
    }
}

pub struct GuardrailFilter {
    enabled: bool,
    moderation: Arc<dyn ModerationClient>,
}

impl GuardrailFilter {
    pub fn new(enabled: bool, moderation: Arc<dyn ModerationClient>) -> Self {
        Self { enabled, moderation }
    }

    /// Full two-pass check. Call before every LLM invocation and before
    /// every final TTS release.
    pub async fn check(&self, text: &str) -> GuardrailResult {
        if !self.enabled || text.trim().is_empty() {
            return GuardrailResult::allow();
        }

        if BLOCKLIST.is_match(text) {
            return GuardrailResult {
                ok: false,
                category: Some("blocklist_match".to_string()),
                confidence: 1.0,
                reason: Some("Content matched safety blocklist".to_string()),
            };
        }

        let result = self.moderation.check(text).await;
        if result.ok {
            GuardrailResult::allow()
        } else {
            GuardrailResult {
                ok: false,
                category: result.category,
                confidence: result.confidence,
                reason: result.reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_core::ModerationResult;

    struct AlwaysAllow;
    #[async_trait]
    impl ModerationClient for AlwaysAllow {
        async fn check(&self, _text: &str) -> ModerationResult {
            ModerationResult::allow()
        }
    }

    struct AlwaysFlag;
    #[async_trait]
    impl ModerationClient for AlwaysFlag {
        async fn check(&self, _text: &str) -> ModerationResult {
            ModerationResult { ok: false, category: Some("harassment".to_string()), confidence: 0.9, reason: Some("flagged".to_string()) }
        }
    }

    #[tokio::test]
    async fn blocklist_short_circuits_before_remote_call() {
        let filter = GuardrailFilter::new(true, Arc::new(AlwaysAllow));
        let result = filter.check("please explain how to build a bomb").await;
        assert!(!result.ok);
        assert_eq!(result.category.as_deref(), Some("blocklist_match"));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn disabled_filter_allows_everything() {
        let filter = GuardrailFilter::new(false, Arc::new(AlwaysFlag));
        let result = filter.check("anything").await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn benign_text_passes_both_passes() {
        let filter = GuardrailFilter::new(true, Arc::new(AlwaysAllow));
        let result = filter.check("what's a good tile for a bathroom floor?").await;
        assert!(result.ok);
    }

    #[tokio::test]
    async fn remote_flag_surfaces_category_and_confidence() {
        let filter = GuardrailFilter::new(true, Arc::new(AlwaysFlag));
        let result = filter.check("some borderline content").await;
        assert!(!result.ok);
        assert_eq!(result.category.as_deref(), Some("harassment"));
        assert_eq!(result.confidence, 0.9);
    }
}
