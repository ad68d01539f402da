use serde::{Deserialize, Serialize};

use crate::permissions::{Action, Permission};

/// Permission group an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
    Repairer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
            Role::Repairer => "repairer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "employee" => Some(Role::Employee),
            "repairer" => Some(Role::Repairer),
            _ => None,
        }
    }

    /// Permissions granted to members of this group.
    pub fn permissions(self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![Permission::from_static("*")],
            // Point-of-sale services.
            Role::Employee => [
                Action::ManageCatalog,
                Action::ManageParties,
                Action::ManageSales,
                Action::ManagePurchasing,
                Action::PrintDocuments,
            ]
            .into_iter()
            .map(Action::required_permission)
            .collect(),
            Role::Repairer => [
                Action::ManageRepairs,
                Action::ManageParties,
                Action::PrintDocuments,
            ]
            .into_iter()
            .map(Action::required_permission)
            .collect(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
