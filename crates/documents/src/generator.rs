use thiserror::Error;

use crate::DocumentData;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document backend error: {0}")]
    Backend(String),
}

/// Renders printable documents to bytes (PDF, HTML, ...).
pub trait DocumentGenerator: Send + Sync {
    /// MIME type of the rendered output.
    fn content_type(&self) -> &'static str;

    fn render(&self, data: &DocumentData) -> Result<Vec<u8>, DocumentError>;
}

/// Renders the document payload as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDocumentGenerator;

impl DocumentGenerator for JsonDocumentGenerator {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn render(&self, data: &DocumentData) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec_pretty(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentKind, DocumentLine};
    use chrono::{DateTime, Utc};

    #[test]
    fn json_generator_renders_the_payload() {
        let data = DocumentData {
            kind: DocumentKind::PurchaseOrder,
            reference: uuid::Uuid::nil(),
            issued_on: DateTime::<Utc>::default(),
            party: None,
            lines: vec![DocumentLine {
                description: "Cable".to_string(),
                quantity: 2,
                unit_price: Some(5),
                line_total: 10,
            }],
            total: 10,
            prepaid: 0,
            balance_due: 10,
        };

        let bytes = JsonDocumentGenerator.render(&data).unwrap();
        let parsed: DocumentData = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, data);
        assert_eq!(JsonDocumentGenerator.content_type(), "application/json");
    }
}
