// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage type classification.
//!
//! An explicit usage type from the caller is trusted as-is. Otherwise the
//! classifier looks at the `feature` metadata hint, then at zero-cost keyword
//! heuristics on the prompt. No LLM pre-call, no network, no latency.

use std::str::FromStr;

use tollgate_core::{TollgateError, UsageType};

/// Result of classifying a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub usage_type: UsageType,
    /// Confidence in the classification (0.0-1.0).
    pub confidence: f32,
    /// Human-readable reason for the classification.
    pub reason: &'static str,
}

/// Metadata `feature` values and the usage type each one names.
const FEATURE_HINTS: &[(&str, UsageType)] = &[
    ("chat", UsageType::ChatResponse),
    ("reply", UsageType::ChatResponse),
    ("conversation", UsageType::ChatResponse),
    ("sentiment", UsageType::SentimentAnalysis),
    ("content", UsageType::ContentGeneration),
    ("generate", UsageType::ContentGeneration),
    ("campaign", UsageType::ContentGeneration),
    ("copywriting", UsageType::ContentGeneration),
    ("translate", UsageType::Translation),
    ("translation", UsageType::Translation),
    ("summary", UsageType::Summary),
    ("summarize", UsageType::Summary),
    ("summarization", UsageType::Summary),
];

/// Prompt keywords per usage type (contains, case-insensitive).
const KEYWORDS: &[(UsageType, &[&str])] = &[
    (
        UsageType::Translation,
        &[
            "translate",
            "translation",
            "into english",
            "into spanish",
            "into french",
            "into german",
            "into arabic",
            "into portuguese",
        ],
    ),
    (
        UsageType::Summary,
        &[
            "summarize",
            "summarise",
            "summary",
            "tl;dr",
            "tldr",
            "key points",
            "condense",
        ],
    ),
    (
        UsageType::SentimentAnalysis,
        &[
            "sentiment",
            "positive or negative",
            "how does the customer feel",
            "emotion",
            "tone of this",
            "classify the mood",
        ],
    ),
    (
        UsageType::ContentGeneration,
        &[
            "write a",
            "draft",
            "compose",
            "generate a",
            "blog post",
            "caption",
            "marketing",
            "campaign",
            "product description",
        ],
    ),
    (
        UsageType::ChatResponse,
        &[
            "reply to",
            "respond to",
            "customer asked",
            "customer says",
            "answer the customer",
            "chat",
        ],
    ),
];

/// Parse a caller-supplied usage type. Accepts `TRANSLATION`, `translation`,
/// or `chat-response`; anything outside the closed set is a validation error.
pub fn parse_usage_type(raw: &str) -> Result<UsageType, TollgateError> {
    let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
    UsageType::from_str(&normalized).map_err(|_| {
        TollgateError::Validation(format!("unsupported usage type `{}`", raw.trim()))
    })
}

/// Heuristic usage type classifier.
#[derive(Debug, Default, Clone)]
pub struct UsageClassifier;

impl UsageClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a request.
    ///
    /// Fails only when `explicit` names an unsupported usage type.
    pub fn classify(
        &self,
        explicit: Option<&str>,
        prompt: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Classification, TollgateError> {
        if let Some(raw) = explicit {
            return Ok(Classification {
                usage_type: parse_usage_type(raw)?,
                confidence: 1.0,
                reason: "explicit usage type",
            });
        }

        if let Some(usage_type) = metadata.and_then(Self::from_feature_hint) {
            return Ok(Classification {
                usage_type,
                confidence: 0.9,
                reason: "metadata feature hint",
            });
        }

        Ok(Self::from_keywords(prompt))
    }

    fn from_feature_hint(metadata: &serde_json::Value) -> Option<UsageType> {
        let feature = metadata.get("feature")?.as_str()?.trim().to_ascii_lowercase();
        FEATURE_HINTS
            .iter()
            .find(|(hint, _)| *hint == feature)
            .map(|(_, usage_type)| *usage_type)
            .or_else(|| parse_usage_type(&feature).ok())
    }

    fn from_keywords(prompt: &str) -> Classification {
        let lower = prompt.to_lowercase();

        // Highest keyword count wins; ties go to the earlier entry in KEYWORDS.
        let mut best: Option<(UsageType, usize)> = None;
        for (usage_type, words) in KEYWORDS {
            let score = words.iter().filter(|w| lower.contains(*w)).count();
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((*usage_type, score));
            }
        }

        match best {
            Some((usage_type, score)) => Classification {
                usage_type,
                confidence: (0.5 + 0.15 * score as f32).min(0.85),
                reason: "prompt keyword heuristics",
            },
            None => Classification {
                usage_type: UsageType::Other,
                confidence: 0.0,
                reason: "no classification signal",
            },
        }
    }
}
