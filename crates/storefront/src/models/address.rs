use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cornershop_core::{AddressId, UserId};

/// A saved shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Single-line rendering for summaries.
    #[must_use]
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.as_str()];
        if let Some(line2) = self.line2.as_deref() {
            parts.push(line2);
        }
        parts.push(self.city.as_str());
        if let Some(region) = self.region.as_deref() {
            parts.push(region);
        }
        parts.push(self.postal_code.as_str());
        parts.push(self.country.as_str());
        parts.join(", ")
    }
}

/// Editable address fields.
///
/// Used as the body of an update; a full set of fields is always written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPatch {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

impl AddressPatch {
    const MAX_LEN: usize = 200;

    /// Trim every field, turn blank optional fields into `None`, and check
    /// required fields.
    ///
    /// # Errors
    ///
    /// Returns a user-facing message naming the first invalid field.
    pub fn normalized(self) -> Result<Self, String> {
        fn required(name: &str, value: String) -> Result<String, String> {
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(format!("{name} is required"));
            }
            if value.chars().count() > AddressPatch::MAX_LEN {
                return Err(format!("{name} is too long"));
            }
            Ok(value)
        }

        fn optional(name: &str, value: Option<String>) -> Result<Option<String>, String> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if v.is_empty() => Ok(None),
                Some(v) if v.chars().count() > AddressPatch::MAX_LEN => {
                    Err(format!("{name} is too long"))
                }
                other => Ok(other),
            }
        }

        Ok(Self {
            full_name: required("Full name", self.full_name)?,
            line1: required("Address line 1", self.line1)?,
            line2: optional("Address line 2", self.line2)?,
            city: required("City", self.city)?,
            region: optional("Region", self.region)?,
            postal_code: required("Postal code", self.postal_code)?,
            country: required("Country", self.country)?,
            phone: optional("Phone", self.phone)?,
        })
    }
}

/// A new address for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub user_id: UserId,
    #[serde(flatten)]
    pub details: AddressPatch,
    pub is_default: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn patch() -> AddressPatch {
        AddressPatch {
            full_name: "  Ada Lovelace ".to_string(),
            line1: "12 St James's Square".to_string(),
            line2: Some("   ".to_string()),
            city: "London".to_string(),
            region: None,
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            phone: Some(String::new()),
        }
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_optionals() {
        let normalized = patch().normalized().unwrap();
        assert_eq!(normalized.full_name, "Ada Lovelace");
        assert_eq!(normalized.line2, None);
        assert_eq!(normalized.phone, None);
    }

    #[test]
    fn test_normalized_rejects_missing_required_field() {
        let mut p = patch();
        p.city = " ".to_string();
        assert_eq!(p.normalized().unwrap_err(), "City is required");
    }

    #[test]
    fn test_new_address_serializes_flat() {
        let new = NewAddress {
            user_id: UserId::new(uuid::Uuid::nil()),
            details: patch().normalized().unwrap(),
            is_default: true,
        };
        let value = serde_json::to_value(&new).unwrap();
        assert_eq!(value["city"], "London");
        assert_eq!(value["is_default"], true);
    }
}
