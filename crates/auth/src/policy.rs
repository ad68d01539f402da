//! Access policy: account → group membership and permission checks.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use shopdesk_core::AccountId;

use crate::authorize::{AuthzError, authorize};
use crate::{Action, Actor, Principal, Role};

/// Access policy consulted before every mutating or printing operation.
pub trait AccessPolicy: Send + Sync {
    /// Allow or deny `actor` performing `action`.
    fn check(&self, actor: &Actor, action: Action) -> Result<(), AuthzError>;

    /// Put a newly created account into the group for `role`.
    fn assign_initial_group(&self, account_id: AccountId, role: Role) -> Result<(), AuthzError>;

    /// Move an account to the group for `new_role`, leaving every other group.
    fn reassign_role(&self, account_id: AccountId, new_role: Role) -> Result<(), AuthzError>;

    /// Drop a deleted account from its group. Unknown accounts are ignored.
    fn remove_member(&self, account_id: AccountId) -> Result<(), AuthzError>;

    fn role_of(&self, account_id: AccountId) -> Option<Role>;
}

/// In-process policy: one group per account.
#[derive(Debug, Default)]
pub struct InMemoryAccessPolicy {
    groups: RwLock<HashMap<AccountId, Role>>,
}

impl InMemoryAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy seeded with existing memberships.
    pub fn with_members(members: impl IntoIterator<Item = (AccountId, Role)>) -> Self {
        Self {
            groups: RwLock::new(members.into_iter().collect()),
        }
    }
}

impl AccessPolicy for InMemoryAccessPolicy {
    fn check(&self, actor: &Actor, action: Action) -> Result<(), AuthzError> {
        let role = self
            .role_of(actor.account_id)
            .ok_or(AuthzError::UnknownAccount(actor.account_id))?;
        let principal = Principal::for_role(actor.account_id, role);

        let result = authorize(&principal, &action.required_permission());
        if result.is_err() {
            debug!(account_id = %actor.account_id, role = %role, action = %action, "access denied");
        }
        result
    }

    fn assign_initial_group(&self, account_id: AccountId, role: Role) -> Result<(), AuthzError> {
        let mut groups = self.groups.write().map_err(|_| AuthzError::Unavailable)?;
        if groups.contains_key(&account_id) {
            return Err(AuthzError::AlreadyAssigned(account_id));
        }
        groups.insert(account_id, role);
        info!(account_id = %account_id, role = %role, "account added to group");
        Ok(())
    }

    fn reassign_role(&self, account_id: AccountId, new_role: Role) -> Result<(), AuthzError> {
        let mut groups = self.groups.write().map_err(|_| AuthzError::Unavailable)?;
        let Some(current) = groups.get_mut(&account_id) else {
            return Err(AuthzError::UnknownAccount(account_id));
        };
        if *current != new_role {
            info!(account_id = %account_id, from = %current, to = %new_role, "account moved to group");
            *current = new_role;
        }
        Ok(())
    }

    fn remove_member(&self, account_id: AccountId) -> Result<(), AuthzError> {
        let mut groups = self.groups.write().map_err(|_| AuthzError::Unavailable)?;
        if let Some(role) = groups.remove(&account_id) {
            info!(account_id = %account_id, role = %role, "account removed from group");
        }
        Ok(())
    }

    fn role_of(&self, account_id: AccountId) -> Option<Role> {
        self.groups
            .read()
            .ok()
            .and_then(|groups| groups.get(&account_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_is_denied() {
        let policy = InMemoryAccessPolicy::new();
        let actor = Actor::new(AccountId::new());
        assert_eq!(
            policy.check(&actor, Action::ManageSales),
            Err(AuthzError::UnknownAccount(actor.account_id))
        );
    }

    #[test]
    fn initial_group_grants_its_permissions() {
        let policy = InMemoryAccessPolicy::new();
        let actor = Actor::new(AccountId::new());
        policy.assign_initial_group(actor.account_id, Role::Repairer).unwrap();

        assert!(policy.check(&actor, Action::ManageRepairs).is_ok());
        assert!(policy.check(&actor, Action::ManageSales).is_err());
    }

    #[test]
    fn initial_group_is_assigned_once() {
        let policy = InMemoryAccessPolicy::new();
        let id = AccountId::new();
        policy.assign_initial_group(id, Role::Employee).unwrap();
        assert_eq!(
            policy.assign_initial_group(id, Role::Admin),
            Err(AuthzError::AlreadyAssigned(id))
        );
        assert_eq!(policy.role_of(id), Some(Role::Employee));
    }

    #[test]
    fn reassigning_replaces_the_previous_group() {
        let policy = InMemoryAccessPolicy::new();
        let actor = Actor::new(AccountId::new());
        policy.assign_initial_group(actor.account_id, Role::Employee).unwrap();

        policy.reassign_role(actor.account_id, Role::Repairer).unwrap();

        assert_eq!(policy.role_of(actor.account_id), Some(Role::Repairer));
        assert!(policy.check(&actor, Action::ManageSales).is_err());
        assert!(policy.check(&actor, Action::ManageRepairs).is_ok());
    }

    #[test]
    fn removed_account_loses_every_permission() {
        let policy = InMemoryAccessPolicy::new();
        let actor = Actor::new(AccountId::new());
        policy.assign_initial_group(actor.account_id, Role::Admin).unwrap();

        policy.remove_member(actor.account_id).unwrap();
        policy.remove_member(actor.account_id).unwrap();

        assert_eq!(policy.role_of(actor.account_id), None);
        assert_eq!(
            policy.check(&actor, Action::ManageCatalog),
            Err(AuthzError::UnknownAccount(actor.account_id))
        );
    }

    #[test]
    fn reassigning_unknown_account_fails() {
        let policy = InMemoryAccessPolicy::new();
        let id = AccountId::new();
        assert_eq!(
            policy.reassign_role(id, Role::Admin),
            Err(AuthzError::UnknownAccount(id))
        );
    }
}
