//! The slice of the content model the blob store depends on.
//!
//! Items, templates and field values are owned by the host content layer.
//! The store only needs to know which template fields hold blob references
//! and where field values are persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// A field declared on a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// The field stores a blob reference
    #[serde(default)]
    pub is_blob: bool,
}

/// A content template and its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
}

impl Template {
    pub fn blob_fields(&self) -> impl Iterator<Item = &TemplateField> {
        self.fields.iter().filter(|f| f.is_blob)
    }
}

/// Source of template definitions.
#[async_trait::async_trait]
pub trait ContentModel: Send + Sync {
    async fn templates(&self) -> Result<Vec<Template>>;
}

/// A content model with a fixed set of templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticContentModel {
    templates: Vec<Template>,
}

impl StaticContentModel {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }
}

#[async_trait::async_trait]
impl ContentModel for StaticContentModel {
    async fn templates(&self) -> Result<Vec<Template>> {
        Ok(self.templates.clone())
    }
}

/// Tables holding field values, one per value scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTable {
    /// Values shared by every language and version
    Shared,
    /// Per-language values
    Unversioned,
    /// Per-language, per-version values
    Versioned,
    /// Values of archived items
    Archived,
}

impl FieldTable {
    pub const ALL: [FieldTable; 4] = [
        FieldTable::Shared,
        FieldTable::Unversioned,
        FieldTable::Versioned,
        FieldTable::Archived,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            FieldTable::Shared => "shared_fields",
            FieldTable::Unversioned => "unversioned_fields",
            FieldTable::Versioned => "versioned_fields",
            FieldTable::Archived => "archived_fields",
        }
    }
}
