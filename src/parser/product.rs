use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields pulled from one item's detail page.
///
/// Every field is optional in practice; a field that could not be read is an
/// empty string, never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub phone: String,
    pub seller_name: String,
    pub product_name: String,
    pub city: String,
    pub state: String,
    pub price: String,
    pub description: String,
    pub category: String,
    pub sub_category: String,
    pub link: String,
}

/// Dedup key of an item: the source URL of its primary image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `None` for a blank source, which cannot identify an item.
    pub fn new(source: impl Into<String>) -> Option<Self> {
        let source = source.into();
        let trimmed = source.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
