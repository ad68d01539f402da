use serde::{Deserialize, Serialize};

use shopdesk_core::{DomainError, DomainResult, Entity};

shopdesk_core::typed_id!(
    /// Category identifier.
    CategoryId
);

/// Product/hardware category. Plain reference data, no lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }
        Ok(Self { id, name })
    }
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_name_is_trimmed_and_required() {
        let c = Category::new(CategoryId::generate(), "  Laptops ").unwrap();
        assert_eq!(c.name, "Laptops");
        assert!(Category::new(CategoryId::generate(), " ").is_err());
    }
}
