//! Effective branch resolution.
//!
//! The scope is computed once per request from the actor and passed into
//! every money-bearing read or write.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchScope {
    /// Restricted to one branch. Null-branch legacy rows never match.
    Branch(Uuid),
    /// Unpinned elevated actor: every branch.
    AllBranches,
}

impl BranchScope {
    /// Resolve the effective branch for an actor.
    ///
    /// - elevated + pinned: that branch
    /// - elevated + unpinned: all branches
    /// - otherwise: the actor's fixed branch; pinning another branch is a
    ///   cross-branch access and no fixed branch at all is unresolvable
    pub fn resolve(actor: &Actor) -> Result<Self, AppError> {
        if actor.role.is_elevated() {
            return Ok(match actor.pinned_branch_id {
                Some(branch_id) => Self::Branch(branch_id),
                None => Self::AllBranches,
            });
        }

        let fixed = actor.fixed_branch_id.ok_or_else(|| {
            AppError::BranchScope(anyhow::anyhow!(
                "User {} has no branch assigned",
                actor.user_id
            ))
        })?;

        match actor.pinned_branch_id {
            Some(pinned) if pinned != fixed => Err(AppError::BranchScope(anyhow::anyhow!(
                "User {} may not access branch {}",
                actor.user_id,
                pinned
            ))),
            _ => Ok(Self::Branch(fixed)),
        }
    }

    /// Branch filter for queries: `None` means no filter.
    pub fn filter(&self) -> Option<Uuid> {
        match self {
            Self::Branch(branch_id) => Some(*branch_id),
            Self::AllBranches => None,
        }
    }

    /// A concrete branch, required by cash-affecting writes.
    pub fn require_branch(&self) -> Result<Uuid, AppError> {
        match self {
            Self::Branch(branch_id) => Ok(*branch_id),
            Self::AllBranches => Err(AppError::BranchScope(anyhow::anyhow!(
                "A branch must be selected for this operation"
            ))),
        }
    }

    /// Whether a row with the given branch is visible in this scope.
    pub fn allows(&self, row_branch: Option<Uuid>) -> bool {
        match self {
            Self::Branch(branch_id) => row_branch == Some(*branch_id),
            Self::AllBranches => true,
        }
    }

    /// Branch a legacy (null-branch) row is adopted into on a status update.
    ///
    /// Only a scope bound to one branch adopts; an unpinned elevated actor
    /// leaves the row untouched.
    pub fn adoption_target(&self, row_branch: Option<Uuid>) -> Option<Uuid> {
        match (self, row_branch) {
            (Self::Branch(branch_id), None) => Some(*branch_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn fixed_branch_actor_is_restricted_to_own_branch() {
        let branch = Uuid::new_v4();
        let scope = BranchScope::resolve(&Actor::staff("clerk", branch)).unwrap();
        assert_eq!(scope, BranchScope::Branch(branch));
        assert!(scope.allows(Some(branch)));
        assert!(!scope.allows(Some(Uuid::new_v4())));
        assert!(!scope.allows(None), "legacy rows never match a fixed branch");
    }

    #[test]
    fn unpinned_admin_sees_all_branches() {
        let scope = BranchScope::resolve(&Actor::admin("root", None)).unwrap();
        assert_eq!(scope, BranchScope::AllBranches);
        assert_eq!(scope.filter(), None);
        assert!(scope.allows(Some(Uuid::new_v4())));
        assert!(scope.allows(None));
    }

    #[test]
    fn pinned_admin_behaves_like_fixed_branch_actor() {
        let branch = Uuid::new_v4();
        let admin = BranchScope::resolve(&Actor::admin("root", Some(branch))).unwrap();
        let staff = BranchScope::resolve(&Actor::staff("clerk", branch)).unwrap();
        assert_eq!(admin, staff);
        for row in [Some(branch), Some(Uuid::new_v4()), None] {
            assert_eq!(admin.allows(row), staff.allows(row));
        }
    }

    #[test]
    fn actor_without_branch_is_a_scope_error() {
        let actor = Actor {
            user_id: "drifter".to_string(),
            role: Role::Manager,
            fixed_branch_id: None,
            pinned_branch_id: None,
        };
        assert!(matches!(
            BranchScope::resolve(&actor),
            Err(AppError::BranchScope(_))
        ));
    }

    #[test]
    fn pinning_a_foreign_branch_is_a_scope_error() {
        let mut actor = Actor::staff("clerk", Uuid::new_v4());
        actor.pinned_branch_id = Some(Uuid::new_v4());
        assert!(matches!(
            BranchScope::resolve(&actor),
            Err(AppError::BranchScope(_))
        ));

        let own = actor.fixed_branch_id;
        actor.pinned_branch_id = own;
        assert!(BranchScope::resolve(&actor).is_ok());
    }

    #[test]
    fn cash_writes_need_a_concrete_branch() {
        assert!(matches!(
            BranchScope::AllBranches.require_branch(),
            Err(AppError::BranchScope(_))
        ));
        let branch = Uuid::new_v4();
        assert_eq!(BranchScope::Branch(branch).require_branch().unwrap(), branch);
    }

    #[test]
    fn legacy_rows_are_adopted_only_by_bound_scopes() {
        let branch = Uuid::new_v4();
        assert_eq!(
            BranchScope::Branch(branch).adoption_target(None),
            Some(branch)
        );
        assert_eq!(BranchScope::Branch(branch).adoption_target(Some(branch)), None);
        assert_eq!(BranchScope::AllBranches.adoption_target(None), None);
    }
}
