//! Domain records for memories and namespaces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A stored memory record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub namespace: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

impl Memory {
    /// Build a fresh record from a create request, minting the id
    pub fn from_create(input: MemoryCreate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            namespace: input.namespace,
            content: input.content,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
            accessed_at: now,
            access_count: 0,
        }
    }

    /// Apply a partial update in place, refreshing `updated_at`
    pub fn apply_update(&mut self, update: MemoryUpdate) {
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(namespace) = update.namespace {
            self.namespace = namespace;
        }
        if let Some(metadata) = update.metadata {
            self.metadata = metadata;
        }
        self.updated_at = Utc::now();
    }
}

/// Input for creating a memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCreate {
    pub namespace: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Partial update for a memory; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// A namespace groups memories under a client-chosen name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Namespace {
    /// Build a fresh namespace record, minting the id
    pub fn from_create(input: NamespaceCreate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            parent: input.parent,
            description: input.description,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Partial update for a namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Search request against a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub metadata_filters: HashMap<String, serde_json::Value>,
}

/// Aggregate statistics reported by a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub memory_count: u64,
    pub namespace_count: u64,
    pub storage_bytes: u64,
}
