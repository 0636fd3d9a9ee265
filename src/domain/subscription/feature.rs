//! Metered features and boolean capabilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// A counted action gated by a per-period quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    /// Messages sent to the AI conversation partner.
    AiChatMessages,
    /// Quizzes generated from the learner's own vocabulary.
    CustomQuizzes,
    /// Lesson packs downloaded for offline study.
    OfflineDownloads,
    /// Recordings scored by the pronunciation coach.
    PronunciationReviews,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::AiChatMessages,
        Feature::CustomQuizzes,
        Feature::OfflineDownloads,
        Feature::PronunciationReviews,
    ];

    /// Wire name, as used in usage maps and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::AiChatMessages => "aiChatMessages",
            Feature::CustomQuizzes => "customQuizzes",
            Feature::OfflineDownloads => "offlineDownloads",
            Feature::PronunciationReviews => "pronunciationReviews",
        }
    }

    /// Capability the plan must grant before the quota is even considered.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Feature::OfflineDownloads => Some(Capability::OfflineMode),
            Feature::PronunciationReviews => Some(Capability::PronunciationCoach),
            Feature::AiChatMessages | Feature::CustomQuizzes => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| ValidationError::invalid_format("feature", format!("unknown feature '{}'", s)))
    }
}

/// An on/off entitlement with no counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    OfflineMode,
    PronunciationCoach,
    AdFree,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::OfflineMode,
        Capability::PronunciationCoach,
        Capability::AdFree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::OfflineMode => "offlineMode",
            Capability::PronunciationCoach => "pronunciationCoach",
            Capability::AdFree => "adFree",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&Feature::AiChatMessages).unwrap(),
            "\"aiChatMessages\""
        );
        for feature in Feature::ALL {
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.as_str()));
        }
    }

    #[test]
    fn feature_from_str_accepts_wire_name() {
        assert_eq!(
            "customQuizzes".parse::<Feature>().unwrap(),
            Feature::CustomQuizzes
        );
    }

    #[test]
    fn feature_from_str_rejects_unknown_name() {
        let err = "flashcards".parse::<Feature>().unwrap_err();
        assert_eq!(err.field(), "feature");
    }

    #[test]
    fn gated_features_name_their_capability() {
        assert_eq!(
            Feature::OfflineDownloads.required_capability(),
            Some(Capability::OfflineMode)
        );
        assert_eq!(Feature::AiChatMessages.required_capability(), None);
    }
}
