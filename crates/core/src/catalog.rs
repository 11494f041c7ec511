//! Personality value catalog.
//!
//! Each system has a closed, ordered set of legal values. Input is matched
//! case-insensitively and always stored in the canonical casing below.

use persona_common::{AppError, AppResult};
pub use persona_db::entities::vote::PersonalitySystem;
use serde::Serialize;

/// The 16 MBTI types.
pub const MBTI_TYPES: [&str; 16] = [
    "INTJ", "INTP", "ENTJ", "ENTP", "INFJ", "INFP", "ENFJ", "ENFP", "ISTJ", "ISFJ", "ESTJ", "ESFJ",
    "ISTP", "ISFP", "ESTP", "ESFP",
];

/// Enneagram types with their two adjacent wings.
pub const ENNEAGRAM_TYPES: [&str; 18] = [
    "1w9", "1w2", "2w1", "2w3", "3w2", "3w4", "4w3", "4w5", "5w4", "5w6", "6w5", "6w7", "7w6",
    "7w8", "8w7", "8w9", "9w8", "9w1",
];

/// Western zodiac signs in calendar order starting at the equinox.
pub const ZODIAC_SIGNS: [&str; 12] = [
    "Aries",
    "Taurus",
    "Gemini",
    "Cancer",
    "Leo",
    "Virgo",
    "Libra",
    "Scorpio",
    "Sagittarius",
    "Capricorn",
    "Aquarius",
    "Pisces",
];

/// Legal values of a system, in catalog order.
#[must_use]
pub const fn values(system: PersonalitySystem) -> &'static [&'static str] {
    match system {
        PersonalitySystem::Mbti => &MBTI_TYPES,
        PersonalitySystem::Enneagram => &ENNEAGRAM_TYPES,
        PersonalitySystem::Zodiac => &ZODIAC_SIGNS,
    }
}

/// Canonical form of `raw` within `system`, or `None` if it is not a legal value.
#[must_use]
pub fn normalize(system: PersonalitySystem, raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    values(system)
        .iter()
        .copied()
        .find(|value| value.eq_ignore_ascii_case(raw))
}

/// Parse a system name and normalize a value in one step.
pub fn resolve(system: &str, value: &str) -> AppResult<(PersonalitySystem, &'static str)> {
    let system: PersonalitySystem = system
        .parse()
        .map_err(|e: String| AppError::Validation(format!("personalitySystem: {e}")))?;

    let canonical = normalize(system, value).ok_or_else(|| {
        AppError::Validation(format!(
            "personalityValue: '{}' is not a valid {system} value",
            value.trim()
        ))
    })?;

    Ok((system, canonical))
}

/// One system's entry in the public catalog listing.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub system: PersonalitySystem,
    pub values: &'static [&'static str],
}

/// The full catalog, for client-side form population.
#[must_use]
pub fn catalog() -> Vec<CatalogEntry> {
    PersonalitySystem::ALL
        .into_iter()
        .map(|system| CatalogEntry {
            system,
            values: values(system),
        })
        .collect()
}
