// Notion scholarship source
//
// The scholarship catalogue lives in a Notion database. It is read-only from
// this side: rows are queried, flattened and handed to matching, the catalogue
// page and the daily digest.

pub mod client;
pub mod properties;

pub use client::NotionClient;

use crate::errors::NotionError;
use async_trait::async_trait;
use serde::Serialize;

/// Eligibility requirements declared on a scholarship; None means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub volunteering: Option<bool>,
    pub military: Option<bool>,
}

/// A database row reduced to what matching needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPage {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Text of every property, space separated
    pub blob: String,
    pub requirements: Requirements,
}

/// A named property value shown on catalogue cards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScholarshipField {
    pub name: String,
    pub value: String,
}

/// A database row prepared for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scholarship {
    pub id: String,
    pub title: String,
    pub url: String,
    pub tags: Vec<String>,
    /// Non-empty properties in database order, title and multi-selects excluded
    pub fields: Vec<ScholarshipField>,
    pub requirements: Requirements,
}

impl Scholarship {
    /// First field whose lowercased name contains one of the keys
    pub fn find_field(&self, keys: &[&str]) -> Option<&str> {
        self.fields.iter().find_map(|field| {
            let name = field.name.to_lowercase();
            keys.iter()
                .any(|key| name.contains(key))
                .then_some(field.value.as_str())
        })
    }
}

/// Anything that can list the scholarship catalogue
#[mockall::automock]
#[async_trait]
pub trait ScholarshipSource: Send + Sync {
    /// Rows flattened for keyword matching
    async fn fetch_pages_raw(&self) -> Result<Vec<RawPage>, NotionError>;

    /// Rows prepared for display
    async fn fetch_scholarships(&self) -> Result<Vec<Scholarship>, NotionError>;
}
