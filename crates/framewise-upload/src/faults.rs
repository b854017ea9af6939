//! Fault injection for simulated uploads
//!
//! [`FailureScenarioEngine::evaluate`] runs once per chunk attempt and
//! checks, in order:
//!
//! 1. the next manually queued one-shot fault
//! 2. the persistent "network down" flag
//! 3. the progress-percentage network drop (trips the flag)
//! 4. the simulated browser refresh at the midpoint
//! 5. the every-Nth-chunk failure
//!
//! A latency spike is rolled independently of the outcome.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Spike applied by a manual [`ManualFault::LatencySpike`] when no maximum is configured.
pub const DEFAULT_MANUAL_SPIKE: Duration = Duration::from_millis(3_000);

/// Config-driven fault scenarios
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureConfig {
    /// Drop the network once progress reaches this percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_drop_at_percent: Option<f64>,

    /// Every chunk whose number is a multiple of N fails on every attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_failure_every_n: Option<u32>,

    /// Upper bound of a random latency spike
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_spike_ms: Option<u64>,

    #[serde(default)]
    pub simulate_browser_refresh: bool,
}

/// Faults that can be queued by hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualFault {
    NetworkDrop,
    ChunkFailure,
    LatencySpike,
    BrowserRefresh,
}

impl std::str::FromStr for ManualFault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "network_drop" => Ok(ManualFault::NetworkDrop),
            "chunk_failure" => Ok(ManualFault::ChunkFailure),
            "latency_spike" => Ok(ManualFault::LatencySpike),
            "browser_refresh" => Ok(ManualFault::BrowserRefresh),
            other => Err(format!("unknown fault '{}'", other)),
        }
    }
}

/// Fault applied to a single chunk attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Session-level outage; lasts until the network is restored
    NetworkDrop,
    /// The attempt fails with this message
    ChunkFailure(String),
    /// In-memory state is lost; the checkpoint survives
    BrowserRefresh,
}

/// Outcome of evaluating one chunk attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultDecision {
    pub fault: Option<Fault>,
    pub latency_spike: Duration,
}

/// Deterministic, config-driven fault injector
#[derive(Debug, Clone)]
pub struct FailureScenarioEngine {
    config: FailureConfig,
    spike_chance: f64,
    manual: VecDeque<ManualFault>,
    network_down: bool,
    drop_fired: bool,
    refresh_fired: bool,
}

impl FailureScenarioEngine {
    pub fn new(config: FailureConfig, spike_chance: f64) -> Self {
        Self {
            config,
            spike_chance: spike_chance.clamp(0.0, 1.0),
            manual: VecDeque::new(),
            network_down: false,
            drop_fired: false,
            refresh_fired: false,
        }
    }

    pub fn config(&self) -> &FailureConfig {
        &self.config
    }

    /// Replace the scenario config and re-arm its one-shot triggers.
    pub fn update_config(&mut self, config: FailureConfig) {
        self.config = config;
        self.drop_fired = false;
        self.refresh_fired = false;
    }

    /// Queue a one-shot fault for the next attempt.
    pub fn trigger(&mut self, fault: ManualFault) {
        self.manual.push_back(fault);
    }

    pub fn is_network_down(&self) -> bool {
        self.network_down
    }

    /// Clear the outage flag.
    pub fn restore_network(&mut self) {
        self.network_down = false;
    }

    /// Forget all runtime state; used when a new upload starts.
    pub fn reset(&mut self) {
        self.manual.clear();
        self.network_down = false;
        self.drop_fired = false;
        self.refresh_fired = false;
    }

    /// Decide the fate of one attempt at `chunk_number` (1-based) of `total_chunks`.
    pub fn evaluate<R: Rng + ?Sized>(
        &mut self,
        chunk_number: u32,
        total_chunks: u32,
        rng: &mut R,
    ) -> FaultDecision {
        let mut decision = FaultDecision {
            fault: None,
            latency_spike: self.roll_spike(rng),
        };

        if let Some(manual) = self.manual.pop_front() {
            match manual {
                ManualFault::NetworkDrop => {
                    self.network_down = true;
                    decision.fault = Some(Fault::NetworkDrop);
                    return decision;
                }
                ManualFault::ChunkFailure => {
                    decision.fault = Some(Fault::ChunkFailure(format!(
                        "Manually triggered failure on chunk {}",
                        chunk_number
                    )));
                    return decision;
                }
                ManualFault::BrowserRefresh => {
                    decision.fault = Some(Fault::BrowserRefresh);
                    return decision;
                }
                ManualFault::LatencySpike => {
                    decision.latency_spike = self
                        .config
                        .latency_spike_ms
                        .map(Duration::from_millis)
                        .unwrap_or(DEFAULT_MANUAL_SPIKE);
                }
            }
        }

        if self.network_down {
            decision.fault = Some(Fault::NetworkDrop);
            return decision;
        }

        if let Some(percent) = self.config.network_drop_at_percent {
            let progress = if total_chunks == 0 {
                100.0
            } else {
                f64::from(chunk_number) / f64::from(total_chunks) * 100.0
            };
            if !self.drop_fired && progress >= percent {
                self.drop_fired = true;
                self.network_down = true;
                decision.fault = Some(Fault::NetworkDrop);
                return decision;
            }
        }

        if self.config.simulate_browser_refresh
            && !self.refresh_fired
            && u64::from(chunk_number) * 2 >= u64::from(total_chunks)
        {
            self.refresh_fired = true;
            decision.fault = Some(Fault::BrowserRefresh);
            return decision;
        }

        if let Some(n) = self.config.chunk_failure_every_n.filter(|n| *n > 0) {
            if chunk_number % n == 0 {
                decision.fault = Some(Fault::ChunkFailure(format!(
                    "Simulated failure on chunk {} (every {} chunks)",
                    chunk_number, n
                )));
            }
        }

        decision
    }

    /// 50-100% of the configured maximum, with `spike_chance` probability.
    fn roll_spike<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match self.config.latency_spike_ms {
            Some(max) if max > 0 && rng.random_bool(self.spike_chance) => {
                Duration::from_millis(rng.random_range(max / 2..=max))
            }
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_no_config_no_faults() {
        let mut engine = FailureScenarioEngine::new(FailureConfig::default(), 0.3);
        let mut rng = rng();
        for n in 1..=10 {
            assert_eq!(engine.evaluate(n, 10, &mut rng), FaultDecision::default());
        }
    }

    #[test]
    fn test_percent_drop_trips_persistent_outage() {
        let config = FailureConfig {
            network_drop_at_percent: Some(50.0),
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 0.0);
        let mut rng = rng();

        for n in 1..=4 {
            assert!(engine.evaluate(n, 10, &mut rng).fault.is_none(), "chunk {}", n);
        }
        assert_eq!(engine.evaluate(5, 10, &mut rng).fault, Some(Fault::NetworkDrop));
        // Outage persists for every later attempt
        assert_eq!(engine.evaluate(5, 10, &mut rng).fault, Some(Fault::NetworkDrop));
        assert!(engine.is_network_down());

        engine.restore_network();
        // The percentage trigger is spent
        assert!(engine.evaluate(5, 10, &mut rng).fault.is_none());
        assert!(engine.evaluate(6, 10, &mut rng).fault.is_none());
    }

    #[test]
    fn test_every_nth_chunk_fails_every_time() {
        let config = FailureConfig {
            chunk_failure_every_n: Some(3),
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 0.0);
        let mut rng = rng();

        for _ in 0..10 {
            assert!(matches!(
                engine.evaluate(3, 10, &mut rng).fault,
                Some(Fault::ChunkFailure(_))
            ));
        }
        assert!(engine.evaluate(4, 10, &mut rng).fault.is_none());
        assert!(engine.evaluate(6, 10, &mut rng).fault.is_some());
    }

    #[test]
    fn test_manual_faults_are_fifo_and_take_priority() {
        let config = FailureConfig {
            chunk_failure_every_n: Some(1),
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 0.0);
        let mut rng = rng();
        engine.trigger(ManualFault::BrowserRefresh);
        engine.trigger(ManualFault::NetworkDrop);

        assert_eq!(engine.evaluate(1, 4, &mut rng).fault, Some(Fault::BrowserRefresh));
        assert_eq!(engine.evaluate(1, 4, &mut rng).fault, Some(Fault::NetworkDrop));
        assert!(engine.is_network_down());
    }

    #[test]
    fn test_manual_latency_spike_uses_configured_max() {
        let config = FailureConfig {
            latency_spike_ms: Some(2_000),
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 0.0);
        engine.trigger(ManualFault::LatencySpike);

        let decision = engine.evaluate(1, 4, &mut rng());
        assert!(decision.fault.is_none());
        assert_eq!(decision.latency_spike, Duration::from_millis(2_000));
    }

    #[test]
    fn test_random_spike_within_half_to_full_max() {
        let config = FailureConfig {
            latency_spike_ms: Some(1_000),
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 1.0);
        let mut rng = rng();
        for n in 1..=50 {
            let spike = engine.evaluate(n, 50, &mut rng).latency_spike;
            assert!(spike >= Duration::from_millis(500) && spike <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_browser_refresh_fires_once_at_midpoint() {
        let config = FailureConfig {
            simulate_browser_refresh: true,
            ..Default::default()
        };
        let mut engine = FailureScenarioEngine::new(config, 0.0);
        let mut rng = rng();

        assert!(engine.evaluate(4, 10, &mut rng).fault.is_none());
        assert_eq!(engine.evaluate(5, 10, &mut rng).fault, Some(Fault::BrowserRefresh));
        assert!(engine.evaluate(5, 10, &mut rng).fault.is_none());
    }

    #[test]
    fn test_manual_fault_parse() {
        assert_eq!("network-drop".parse::<ManualFault>().unwrap(), ManualFault::NetworkDrop);
        assert!("meteor".parse::<ManualFault>().is_err());
    }
}
