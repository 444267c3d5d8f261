// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic request fingerprints used as cache keys.

use sha2::{Digest, Sha256};
use tollgate_core::{OrganizationId, UsageType};

/// Bumped whenever the hashed layout changes, so old keys never collide.
const FINGERPRINT_VERSION: &[u8] = b"tollgate-fp-v1";

/// Collapse whitespace runs to a single space and trim the ends. Case is kept.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 over organization, usage type, normalized prompt, model, and
/// temperature, hex encoded.
///
/// Fields are separated by a unit separator so that adjacent values cannot
/// run together into the same byte string.
pub fn fingerprint(
    organization_id: &OrganizationId,
    usage_type: UsageType,
    prompt: &str,
    model: &str,
    temperature: f32,
) -> String {
    let usage_type = usage_type.to_string();
    let prompt = normalize_prompt(prompt);

    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION);
    for part in [organization_id.as_str(), usage_type.as_str(), prompt.as_str(), model] {
        hasher.update(b"\x1f");
        hasher.update(part.as_bytes());
    }
    hasher.update(b"\x1f");
    hasher.update(temperature.to_bits().to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str) -> OrganizationId {
        OrganizationId::from(id)
    }

    #[test]
    fn whitespace_is_normalized_but_case_is_not() {
        assert_eq!(normalize_prompt("  Hello \n\t world  "), "Hello world");
        assert_ne!(normalize_prompt("Hello"), normalize_prompt("hello"));
    }

    #[test]
    fn equivalent_prompts_share_a_fingerprint() {
        let a = fingerprint(&org("o"), UsageType::Summary, "Sum  this up", "m", 0.7);
        let b = fingerprint(&org("o"), UsageType::Summary, " Sum this\nup ", "m", 0.7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn every_component_changes_the_fingerprint() {
        let base = fingerprint(&org("o"), UsageType::Summary, "p", "m", 0.7);
        assert_ne!(base, fingerprint(&org("o2"), UsageType::Summary, "p", "m", 0.7));
        assert_ne!(base, fingerprint(&org("o"), UsageType::Translation, "p", "m", 0.7));
        assert_ne!(base, fingerprint(&org("o"), UsageType::Summary, "P", "m", 0.7));
        assert_ne!(base, fingerprint(&org("o"), UsageType::Summary, "p", "m2", 0.7));
        assert_ne!(base, fingerprint(&org("o"), UsageType::Summary, "p", "m", 0.2));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = fingerprint(&org("ab"), UsageType::Other, "c", "m", 0.0);
        let b = fingerprint(&org("a"), UsageType::Other, "bc", "m", 0.0);
        assert_ne!(a, b);
    }
}
