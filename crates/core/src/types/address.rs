//! Structured delivery address.

use serde::{Deserialize, Serialize};

/// Errors that can occur when validating a [`DeliveryAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// A required field is blank.
    #[error("delivery address {0} is required")]
    Missing(&'static str),
    /// A field exceeds the storage limit.
    #[error("delivery address {field} must be at most {max} characters")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
}

/// Where an order is shipped. All three fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    /// Street and house number.
    pub street: String,
    /// City name.
    pub city: String,
    /// Postal / ZIP code.
    pub postal_code: String,
}

impl DeliveryAddress {
    /// Maximum length of any single field.
    pub const MAX_FIELD_LENGTH: usize = 255;

    /// Build an address, trimming whitespace and validating every field.
    ///
    /// # Errors
    ///
    /// Returns `AddressError` if any field is blank or too long.
    pub fn new(street: &str, city: &str, postal_code: &str) -> Result<Self, AddressError> {
        let address = Self {
            street: street.trim().to_owned(),
            city: city.trim().to_owned(),
            postal_code: postal_code.trim().to_owned(),
        };
        address.validate()?;
        Ok(address)
    }

    /// Check that every field is present and within bounds.
    ///
    /// # Errors
    ///
    /// Returns `AddressError` if any field is blank or too long.
    pub fn validate(&self) -> Result<(), AddressError> {
        for (field, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
        ] {
            if value.trim().is_empty() {
                return Err(AddressError::Missing(field));
            }
            if value.len() > Self::MAX_FIELD_LENGTH {
                return Err(AddressError::TooLong {
                    field,
                    max: Self::MAX_FIELD_LENGTH,
                });
            }
        }
        Ok(())
    }
}
