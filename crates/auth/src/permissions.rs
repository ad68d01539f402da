use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "sales.manage"). The wildcard `"*"`
/// grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation groups gated by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ManageCatalog,
    ManageParties,
    ManageSales,
    ManagePurchasing,
    ManageRepairs,
    PrintDocuments,
    ManageAccounts,
    ManageEmployees,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::ManageCatalog,
        Action::ManageParties,
        Action::ManageSales,
        Action::ManagePurchasing,
        Action::ManageRepairs,
        Action::PrintDocuments,
        Action::ManageAccounts,
        Action::ManageEmployees,
    ];

    /// The permission an actor needs to perform this action.
    pub fn required_permission(self) -> Permission {
        Permission::from_static(match self {
            Action::ManageCatalog => "catalog.manage",
            Action::ManageParties => "parties.manage",
            Action::ManageSales => "sales.manage",
            Action::ManagePurchasing => "purchasing.manage",
            Action::ManageRepairs => "repairs.manage",
            Action::PrintDocuments => "documents.print",
            Action::ManageAccounts => "accounts.manage",
            Action::ManageEmployees => "employees.manage",
        })
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.required_permission().as_str())
    }
}
