pub mod memo;
pub mod tier;

use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelsConfig;

pub use memo::{MemoEntry, ResolutionMemo};
pub use tier::{FallbackTiers, Tier};

/// Result of asking the upstream whether it serves a model id verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Accepted,
    Rejected(u16),
    Failed(String),
}

/// One-shot availability check against the upstream.
pub trait ModelProbe: Send + Sync {
    fn probe(&self, model: &str) -> impl Future<Output = ProbeOutcome> + Send;
}

/// How a caller model id was mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Alias,
    Memo,
    Probe,
    Fallback(Tier),
}

impl ResolutionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionSource::Alias => "alias",
            ResolutionSource::Memo => "memo",
            ResolutionSource::Probe => "probe",
            ResolutionSource::Fallback(Tier::Large) => "fallback_large",
            ResolutionSource::Fallback(Tier::Medium) => "fallback_medium",
            ResolutionSource::Fallback(Tier::Small) => "fallback_small",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub model: Arc<str>,
    pub source: ResolutionSource,
}

/// Maps caller model ids onto upstream model ids.
///
/// Order: static alias table, memoized probe result, live probe, tier
/// heuristic. Only the memo is mutated, and never while a probe is in
/// flight.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    aliases: FxHashMap<String, Arc<str>>,
    tiers: FallbackTiers,
    memo: Arc<ResolutionMemo>,
}

impl ModelResolver {
    #[must_use]
    pub fn new(config: &ModelsConfig, memo: Arc<ResolutionMemo>) -> Self {
        let aliases = config
            .aliases
            .iter()
            .map(|(alias, target)| (alias.clone(), Arc::from(target.as_str())))
            .collect();
        Self {
            aliases,
            tiers: FallbackTiers::new(&config.fallback),
            memo,
        }
    }

    #[must_use]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    #[must_use]
    pub fn memo(&self) -> &ResolutionMemo {
        &self.memo
    }

    /// Resolve `requested` to an upstream model id. Never fails; the worst
    /// case is the small fallback tier.
    pub async fn resolve<P: ModelProbe>(&self, requested: &str, probe: &P) -> Resolution {
        if requested.is_empty() {
            return self.fallback(requested);
        }

        if let Some(target) = self.aliases.get(requested) {
            return Resolution {
                model: Arc::clone(target),
                source: ResolutionSource::Alias,
            };
        }

        match self.memo.get(requested) {
            Some(MemoEntry::Confirmed(model)) => {
                return Resolution {
                    model,
                    source: ResolutionSource::Memo,
                }
            }
            Some(MemoEntry::Unconfirmed) => return self.fallback(requested),
            None => {}
        }

        match probe.probe(requested).await {
            ProbeOutcome::Accepted => {
                let model: Arc<str> = Arc::from(requested);
                self.memo
                    .record(requested, MemoEntry::Confirmed(Arc::clone(&model)));
                tracing::debug!(model = requested, "upstream accepted model id verbatim");
                Resolution {
                    model,
                    source: ResolutionSource::Probe,
                }
            }
            ProbeOutcome::Rejected(status) => {
                tracing::warn!(model = requested, status, "model probe rejected by upstream");
                self.memo.record(requested, MemoEntry::Unconfirmed);
                self.fallback(requested)
            }
            ProbeOutcome::Failed(reason) => {
                tracing::warn!(model = requested, error = %reason, "model probe failed");
                self.memo.record(requested, MemoEntry::Unconfirmed);
                self.fallback(requested)
            }
        }
    }

    fn fallback(&self, requested: &str) -> Resolution {
        let (tier, model) = self.tiers.classify(requested);
        Resolution {
            model,
            source: ResolutionSource::Fallback(tier),
        }
    }
}
