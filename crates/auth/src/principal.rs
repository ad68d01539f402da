use serde::{Deserialize, Serialize};

use shopdesk_core::AccountId;

use crate::{Permission, Role};

/// The account on whose behalf a request runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: AccountId,
}

impl Actor {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id }
    }
}

/// An actor resolved against the policy: its group and effective permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn for_role(account_id: AccountId, role: Role) -> Self {
        Self {
            account_id,
            role,
            permissions: role.permissions(),
        }
    }
}
