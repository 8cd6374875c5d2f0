//! RBAC table (§4.1): maps `(action, target)` pairs to a minimum role.
//! Production-environment mutations additionally require the project's
//! configured approval role.

use crate::db::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadProject,
    WriteProject,
    DeleteProject,
    TriggerBuild,
    TriggerDeploy,
    ApproveDeploy,
    RollbackDeploy,
    ManageDomains,
    ManageEnvVars,
    ManageDependencies,
}

impl Action {
    /// The minimum role a subject needs, before any per-environment
    /// approval escalation.
    pub fn minimum_role(self) -> Role {
        match self {
            Action::ReadProject => Role::Viewer,
            Action::WriteProject
            | Action::TriggerBuild
            | Action::TriggerDeploy
            | Action::ManageDomains
            | Action::ManageEnvVars
            | Action::ManageDependencies => Role::Developer,
            Action::DeleteProject | Action::ApproveDeploy | Action::RollbackDeploy => Role::Admin,
        }
    }
}

/// A per-project grant, looked up from the repository store; overrides the
/// subject's global role for actions scoped to this project.
#[derive(Debug, Clone)]
pub struct ProjectGrant {
    pub role: Role,
}

/// Authorizes `action` for `role` (the subject's effective role — global or
/// project-grant-derived), honoring the production-approval escalation.
pub fn authorize(
    role: Role,
    action: Action,
    environment_requires_approval: bool,
) -> Result<(), crate::error::Error> {
    let mut required = action.minimum_role();
    if environment_requires_approval
        && matches!(action, Action::TriggerDeploy | Action::ApproveDeploy)
    {
        required = Role::Admin;
    }
    if role.satisfies(required) {
        Ok(())
    } else {
        Err(crate::error::Error::forbidden(format!(
            "action requires at least {required:?}, subject has {role:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_cannot_trigger_deploy() {
        assert!(authorize(Role::Viewer, Action::TriggerDeploy, false).is_err());
    }

    #[test]
    fn developer_can_trigger_deploy_without_approval_requirement() {
        assert!(authorize(Role::Developer, Action::TriggerDeploy, false).is_ok());
    }

    #[test]
    fn developer_cannot_trigger_deploy_in_approval_gated_environment() {
        assert!(authorize(Role::Developer, Action::TriggerDeploy, true).is_err());
        assert!(authorize(Role::Admin, Action::TriggerDeploy, true).is_ok());
    }
}
