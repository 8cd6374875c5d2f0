//! Deployment state machine (§3: "forward-only except the single allowed
//! `(healthy|degraded|failed) -> rolled_back` transition"), grounded on the
//! teacher's `deployment/state_machine.rs` match-based validator.

use crate::db::models::DeploymentStatus;
use crate::error::{Error, Result};

pub fn is_terminal(status: DeploymentStatus) -> bool {
    matches!(status, DeploymentStatus::RolledBack)
}

pub fn is_rollback_target(status: DeploymentStatus) -> bool {
    matches!(
        status,
        DeploymentStatus::Healthy | DeploymentStatus::Degraded | DeploymentStatus::Failed
    )
}

pub fn is_valid_transition(from: DeploymentStatus, to: DeploymentStatus) -> bool {
    use DeploymentStatus::*;
    match (from, to) {
        (from, _) if is_terminal(from) => false,

        // A reconcile pass that hasn't advanced the deployment's coarse
        // status yet (still waiting on a workload, still deploying) is a
        // no-op transition, not an error.
        (from, to) if from == to => true,

        (Pending, Building) => true,
        (Building, Deploying) => true,
        (Building, Failed) => true,
        (Deploying, Healthy) => true,
        (Deploying, Degraded) => true,
        (Deploying, Failed) => true,
        (Healthy, Degraded) => true,
        (Healthy, Failed) => true,
        (Degraded, Healthy) => true,
        (Degraded, Failed) => true,

        (from, RolledBack) if is_rollback_target(from) => true,

        _ => false,
    }
}

pub fn validate_transition(from: DeploymentStatus, to: DeploymentStatus) -> Result<()> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(Error::conflict(format!(
            "invalid deployment transition {from:?} -> {to:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeploymentStatus::*;

    #[test]
    fn normal_path_is_valid() {
        assert!(is_valid_transition(Pending, Building));
        assert!(is_valid_transition(Building, Deploying));
        assert!(is_valid_transition(Deploying, Healthy));
    }

    #[test]
    fn rollback_allowed_from_healthy_degraded_or_failed() {
        assert!(is_valid_transition(Healthy, RolledBack));
        assert!(is_valid_transition(Degraded, RolledBack));
        assert!(is_valid_transition(Failed, RolledBack));
    }

    #[test]
    fn rolled_back_is_terminal() {
        assert!(is_terminal(RolledBack));
        assert!(!is_valid_transition(RolledBack, Pending));
        assert!(!is_valid_transition(RolledBack, Healthy));
    }

    #[test]
    fn same_state_is_a_no_op_transition() {
        assert!(is_valid_transition(Deploying, Deploying));
        assert!(!is_valid_transition(RolledBack, RolledBack));
    }

    #[test]
    fn cannot_skip_states() {
        assert!(!is_valid_transition(Pending, Healthy));
        assert!(!is_valid_transition(Pending, Deploying));
    }

    #[test]
    fn rollback_not_allowed_from_pre_infrastructure_states() {
        assert!(!is_valid_transition(Pending, RolledBack));
        assert!(!is_valid_transition(Building, RolledBack));
    }
}
