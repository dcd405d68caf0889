//! # Per-channel guards
//! Breaker + rate gate + concurrency pool bundled per channel. The
//! registry is owned by application state and injected into every engine,
//! so breaker state spans runs while staying out of global statics.

pub mod breaker;
pub mod pool;
pub mod rate;

pub use breaker::{CircuitBreaker, CircuitState};
pub use pool::ConcurrencyPool;
pub use rate::RateGate;

use crate::config::Settings;
use std::collections::HashMap;
use std::sync::Arc;

/// Breaker and gate are shared handles: registries derived for a single run
/// swap the pool but keep pointing at the same breaker state and rate window.
#[derive(Debug)]
pub struct ChannelGuards {
    pub breaker: Arc<CircuitBreaker>,
    pub gate: Arc<RateGate>,
    pub pool: ConcurrencyPool,
}

#[derive(Debug)]
pub struct GuardRegistry {
    channels: HashMap<String, Arc<ChannelGuards>>,
    /// Fallback for channels registered after construction; deliberately
    /// smaller than the named pools.
    default_guards: Arc<ChannelGuards>,
}

impl GuardRegistry {
    /// Build one guard set per named channel from the settings.
    pub fn from_settings<'a, I>(settings: &Settings, channels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = HashMap::new();
        for name in channels {
            map.insert(
                name.to_string(),
                Arc::new(Self::build_guards(
                    settings,
                    settings.rpm_for(name),
                    settings.max_parallel_searches,
                )),
            );
        }
        let default_pool = (settings.max_parallel_searches / 4).max(2);
        let default_guards = Arc::new(Self::build_guards(
            settings,
            settings.default_rpm,
            default_pool,
        ));
        Self {
            channels: map,
            default_guards,
        }
    }

    fn build_guards(settings: &Settings, rpm: u32, pool: usize) -> ChannelGuards {
        ChannelGuards {
            breaker: Arc::new(CircuitBreaker::new(
                settings.circuit_breaker_failures,
                settings.breaker_reset(),
            )),
            gate: Arc::new(RateGate::per_minute(rpm)),
            pool: ConcurrencyPool::new(pool),
        }
    }

    /// Derive a registry with run-scoped pools of the given capacity. The
    /// breakers and rate gates are the same instances as in `self`, so
    /// failure history and window accounting carry over.
    pub fn with_pool_capacity(&self, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let resize = |guards: &ChannelGuards, pool: usize| {
            Arc::new(ChannelGuards {
                breaker: Arc::clone(&guards.breaker),
                gate: Arc::clone(&guards.gate),
                pool: ConcurrencyPool::new(pool),
            })
        };
        Self {
            channels: self
                .channels
                .iter()
                .map(|(name, guards)| (name.clone(), resize(guards, capacity)))
                .collect(),
            default_guards: resize(&self.default_guards, (capacity / 4).max(2)),
        }
    }

    /// Guards for a channel; unknown names share the default bundle.
    pub fn for_channel(&self, channel: &str) -> Arc<ChannelGuards> {
        self.channels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| self.default_guards.clone())
    }
}
