use serde::{Deserialize, Serialize};

use shopdesk_core::{DomainError, DomainResult};

/// Contact information shared by clients and suppliers.
///
/// `phone` and `email` are unique per party kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: String,
    pub email: String,
    pub address: String,
}

impl ContactInfo {
    pub fn new(
        phone: impl Into<String>,
        email: impl Into<String>,
        address: impl Into<String>,
    ) -> DomainResult<Self> {
        let contact = Self {
            phone: phone.into().trim().to_string(),
            email: email.into().trim().to_ascii_lowercase(),
            address: address.into(),
        };
        contact.validate()?;
        Ok(contact)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        let shaped = self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
        if digits < 6 || !shaped {
            return Err(DomainError::validation(format!(
                "invalid phone number: {:?}",
                self.phone
            )));
        }

        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => {
                return Err(DomainError::validation(format!(
                    "invalid email address: {:?}",
                    self.email
                )));
            }
        }

        if self.address.trim().is_empty() {
            return Err(DomainError::validation("address cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_email_and_trims_phone() {
        let c = ContactInfo::new(" +213 555 12 34 56 ", "Ana@Shop.DZ", "1 rue Didouche").unwrap();
        assert_eq!(c.phone, "+213 555 12 34 56");
        assert_eq!(c.email, "ana@shop.dz");
    }

    #[test]
    fn rejects_malformed_phone() {
        let err = ContactInfo::new("call me", "a@b.dz", "x").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_email_without_domain() {
        assert!(ContactInfo::new("0555123456", "ana@", "x").is_err());
        assert!(ContactInfo::new("0555123456", "ana.shop.dz", "x").is_err());
    }

    #[test]
    fn rejects_blank_address() {
        assert!(ContactInfo::new("0555123456", "a@b.dz", "  ").is_err());
    }
}
