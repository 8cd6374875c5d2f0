//! Rollout strategies (§4.7): rolling, blue/green, canary. Each describes
//! how the reconciler advances a workload from the prior Release's object
//! set to the new one; the health/rollback rule in `health.rs` applies to
//! all three while the new workload is not yet fully promoted.

use crate::db::models::DeployStrategy;

/// A canary's traffic-weight ladder; advance one step per stable interval,
/// retract to the previous weight (or zero) on a health-window breach.
pub const CANARY_WEIGHTS: &[u8] = &[10, 50, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutStep {
    /// Rolling: patch the existing workload in place.
    PatchInPlace,
    /// Blue/green: the new workload exists and is healthy, but traffic has
    /// not yet been swapped to it.
    ParallelReady,
    /// Blue/green: traffic now points at the new workload; old one retained
    /// until the next deploy per §4.7.
    Swapped,
    /// Canary: traffic is split `weight`% to the new workload.
    CanaryAt { weight: u8 },
    /// Canary fully promoted; old workload can be torn down.
    FullyPromoted,
}

pub fn rolling_params() -> (u32, u32) {
    // (max_surge, max_unavailable), per §4.7.
    (1, 0)
}

/// Given the current canary weight (or `None` if not yet started), returns
/// the next weight to advance to, or `None` if already fully promoted.
pub fn next_canary_weight(current: Option<u8>) -> Option<u8> {
    match current {
        None => CANARY_WEIGHTS.first().copied(),
        Some(w) => CANARY_WEIGHTS.iter().find(|&&next| next > w).copied(),
    }
}

/// On a health-window breach mid-canary, retract to the previous weight (or
/// zero, pulling all traffic back to the prior Release).
pub fn retract_canary_weight(current: u8) -> u8 {
    CANARY_WEIGHTS
        .iter()
        .rev()
        .find(|&&w| w < current)
        .copied()
        .unwrap_or(0)
}

pub fn strategy_name(strategy: DeployStrategy) -> &'static str {
    match strategy {
        DeployStrategy::Rolling => "rolling",
        DeployStrategy::BlueGreen => "blue_green",
        DeployStrategy::Canary => "canary",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canary_advances_through_the_full_ladder() {
        let first = next_canary_weight(None);
        assert_eq!(first, Some(10));
        let second = next_canary_weight(first);
        assert_eq!(second, Some(50));
        let third = next_canary_weight(second);
        assert_eq!(third, Some(100));
        let done = next_canary_weight(third);
        assert_eq!(done, None);
    }

    #[test]
    fn canary_retracts_to_the_prior_rung_or_zero() {
        assert_eq!(retract_canary_weight(50), 10);
        assert_eq!(retract_canary_weight(10), 0);
    }

    #[test]
    fn rolling_uses_zero_unavailable_one_surge() {
        assert_eq!(rolling_params(), (1, 0));
    }
}
