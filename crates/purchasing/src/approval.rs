//! Approval routing: who may place what without manager sign-off.

use serde::{Deserialize, Serialize};

use procureflow_core::{Amount, DomainError, DomainResult, UserId};

/// Role of the acting user within the buying business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Manager,
    Staff,
}

impl Role {
    /// Owners and managers carry approval authority.
    pub fn can_approve(self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Staff => "staff",
        };
        f.write_str(s)
    }
}

/// How a composed cart is sent out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderMode {
    /// Purchase order: placed with the supplier.
    #[serde(rename = "PO")]
    Po,
    /// Purchase request: an internal ask, reviewed before any order exists.
    #[serde(rename = "PR")]
    Request,
}

/// The user performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            name: name.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRouter {
    approval_limit: Amount,
}

impl ApprovalRouter {
    pub fn new(approval_limit: Amount) -> Self {
        Self { approval_limit }
    }

    pub fn approval_limit(&self) -> Amount {
        self.approval_limit
    }

    /// True iff a PO above the limit is placed by someone without approval
    /// authority. Requests are never gated.
    pub fn requires_approval(&self, total: Amount, role: Role, mode: OrderMode) -> bool {
        mode == OrderMode::Po && total > self.approval_limit && !role.can_approve()
    }

    pub fn authorize_approver(&self, approver: &Actor) -> DomainResult<()> {
        if approver.role.can_approve() {
            return Ok(());
        }
        Err(DomainError::unauthorized(format!(
            "role `{}` cannot approve or reject purchase orders",
            approver.role
        )))
    }
}
