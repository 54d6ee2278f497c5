use std::sync::Arc;

use crate::config::{FallbackConfig, FallbackTier};

/// Size class picked for a model id the upstream does not serve as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Large,
    Medium,
    Small,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Large => "large",
            Tier::Medium => "medium",
            Tier::Small => "small",
        }
    }
}

#[derive(Debug, Clone)]
struct TierRule {
    model: Arc<str>,
    markers: Vec<String>,
}

impl TierRule {
    fn new(tier: &FallbackTier) -> Self {
        Self {
            model: Arc::from(tier.model.as_str()),
            markers: tier
                .markers
                .iter()
                .map(|marker| marker.to_ascii_lowercase())
                .collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
    }
}

/// Marker lists checked large first, then medium; anything else is small.
#[derive(Debug, Clone)]
pub struct FallbackTiers {
    large: TierRule,
    medium: TierRule,
    small: Arc<str>,
}

impl FallbackTiers {
    #[must_use]
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            large: TierRule::new(&config.large),
            medium: TierRule::new(&config.medium),
            small: Arc::from(config.small.model.as_str()),
        }
    }

    #[must_use]
    pub fn classify(&self, requested: &str) -> (Tier, Arc<str>) {
        let lowered = requested.to_ascii_lowercase();
        if self.large.matches(&lowered) {
            (Tier::Large, Arc::clone(&self.large.model))
        } else if self.medium.matches(&lowered) {
            (Tier::Medium, Arc::clone(&self.medium.model))
        } else {
            (Tier::Small, Arc::clone(&self.small))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> FallbackTiers {
        FallbackTiers::new(&FallbackConfig::default())
    }

    #[test]
    fn test_large_markers() {
        for id in ["llama-3.1-405B", "claude-3-opus", "gemini-ultra", "qwen-max"] {
            let (tier, model) = tiers().classify(id);
            assert_eq!(tier, Tier::Large, "{id}");
            assert_eq!(&*model, "qwen3-235b-a22b");
        }
    }

    #[test]
    fn test_medium_markers() {
        for id in ["llama-3-70b", "claude-3-5-Sonnet", "qwen-plus", "mixtral-medium"] {
            let (tier, model) = tiers().classify(id);
            assert_eq!(tier, Tier::Medium, "{id}");
            assert_eq!(&*model, "qwen3-32b");
        }
    }

    #[test]
    fn test_large_checked_before_medium() {
        // Both "large" and "70b" match; large wins.
        assert_eq!(tiers().classify("mistral-large-70b").0, Tier::Large);
    }

    #[test]
    fn test_unknown_defaults_to_small() {
        let (tier, model) = tiers().classify("tiny-model");
        assert_eq!(tier, Tier::Small);
        assert_eq!(&*model, "qwen3-8b");
        assert_eq!(tiers().classify("").0, Tier::Small);
    }

    #[test]
    fn test_configured_markers_are_case_insensitive() {
        let mut config = FallbackConfig::default();
        config.medium.markers = vec!["MiDi".to_string()];
        let tiers = FallbackTiers::new(&config);
        assert_eq!(tiers.classify("some-midi-model").0, Tier::Medium);
        assert_eq!(tiers.classify("llama-70b").0, Tier::Small);
    }
}
