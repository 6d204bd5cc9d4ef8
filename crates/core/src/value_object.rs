//! Value objects: equality by value, not identity.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects (immutable, compared by value).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Kind of human-readable document a depot numbers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Material request (demande).
    Request,
    /// Delivery note (bon de livraison).
    DeliveryNote,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Request => "DEM",
            DocumentKind::DeliveryNote => "BL",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "DEM" => Some(DocumentKind::Request),
            "BL" => Some(DocumentKind::DeliveryNote),
            _ => None,
        }
    }
}

/// Sequence-numbered document reference such as `DEM-0001` or `BL-0042`.
///
/// Sequences start at 1 and are zero-padded to four digits; larger numbers simply
/// grow wider.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    kind: DocumentKind,
    sequence: u64,
}

impl ValueObject for DocumentNumber {}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, sequence: u64) -> Result<Self, DomainError> {
        if sequence == 0 {
            return Err(DomainError::invalid_input("document sequence starts at 1"));
        }
        Ok(Self { kind, sequence })
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{:04}", self.kind.prefix(), self.sequence)
    }
}

impl FromStr for DocumentNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, digits) = s
            .split_once('-')
            .ok_or_else(|| DomainError::invalid_input(format!("malformed document number '{s}'")))?;
        let kind = DocumentKind::from_prefix(prefix)
            .ok_or_else(|| DomainError::invalid_input(format!("unknown document prefix '{prefix}'")))?;
        let sequence = digits
            .parse::<u64>()
            .map_err(|e| DomainError::invalid_input(format!("document number '{s}': {e}")))?;
        Self::new(kind, sequence)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentNumber> for String {
    fn from(value: DocumentNumber) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        let n = DocumentNumber::new(DocumentKind::Request, 1).unwrap();
        assert_eq!(n.to_string(), "DEM-0001");

        let n = DocumentNumber::new(DocumentKind::DeliveryNote, 12345).unwrap();
        assert_eq!(n.to_string(), "BL-12345");
    }

    #[test]
    fn parses_back_from_display_form() {
        let n: DocumentNumber = "BL-0042".parse().unwrap();
        assert_eq!(n.kind(), DocumentKind::DeliveryNote);
        assert_eq!(n.sequence(), 42);
    }

    #[test]
    fn rejects_sequence_zero_and_unknown_prefix() {
        assert!(DocumentNumber::new(DocumentKind::Request, 0).is_err());
        assert!("INV-0001".parse::<DocumentNumber>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let n = DocumentNumber::new(DocumentKind::Request, 7).unwrap();
        assert_eq!(serde_json::to_value(n).unwrap(), serde_json::json!("DEM-0007"));
    }
}
