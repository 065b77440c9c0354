//! Authenticated actor descriptor supplied by the identity layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

impl Role {
    /// Elevated roles may work across branches.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    /// Branch a non-elevated actor is bound to.
    pub fixed_branch_id: Option<Uuid>,
    /// Branch selected for this request, if any.
    pub pinned_branch_id: Option<Uuid>,
}

impl Actor {
    pub fn staff(user_id: impl Into<String>, branch_id: Uuid) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Staff,
            fixed_branch_id: Some(branch_id),
            pinned_branch_id: None,
        }
    }

    pub fn admin(user_id: impl Into<String>, pinned_branch_id: Option<Uuid>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
            fixed_branch_id: None,
            pinned_branch_id,
        }
    }
}
