//! API-key lifecycle
//!
//! Credentials are persisted only as SHA-256 hex digests under
//! `apikey:{digest}` with a tenant-scoped index at
//! `apikey_tenant:{tenant_id}:{digest}`. The raw key leaves the registry
//! exactly once, in the [`CreatedApiKey`] returned from create.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::errors::{PersistenceError, PersistenceResult};
use crate::kv::{decode, encode};
use crate::tenant::TenantRegistry;
use crate::tenant::{Tenant, TenantStatus};

const RAW_KEY_PREFIX: &str = "maia_";

fn apikey_key(digest: &str) -> Vec<u8> {
    format!("apikey:{digest}").into_bytes()
}

fn apikey_tenant_key(tenant_id: &str, digest: &str) -> Vec<u8> {
    format!("apikey_tenant:{tenant_id}:{digest}").into_bytes()
}

fn apikey_tenant_prefix(tenant_id: &str) -> Vec<u8> {
    format!("apikey_tenant:{tenant_id}:").into_bytes()
}

/// Capability attached to an API key; closed vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Grants every scope
    #[serde(rename = "*")]
    Wildcard,
    Read,
    Write,
    Delete,
    Admin,
    Context,
    Inference,
    Search,
    Stats,
}

impl Scope {
    /// Parse a scope name; anything outside the vocabulary is rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "*" => Some(Self::Wildcard),
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "delete" => Some(Self::Delete),
            "admin" => Some(Self::Admin),
            "context" => Some(Self::Context),
            "inference" => Some(Self::Inference),
            "search" => Some(Self::Search),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wildcard => "*",
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Admin => "admin",
            Self::Context => "context",
            Self::Inference => "inference",
            Self::Search => "search",
            Self::Stats => "stats",
        }
    }
}

/// Check a scope list against a required scope. An empty list allows
/// everything (backward-compatible); `*` grants every scope; anything
/// else is an exact match.
pub fn scopes_allow(scopes: &[Scope], required: Scope) -> bool {
    scopes.is_empty() || scopes.contains(&Scope::Wildcard) || scopes.contains(&required)
}

/// Stored API-key record; never contains the raw key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// SHA-256 hex digest of the raw key
    pub key_hash: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    /// None = never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ApiKey {
    /// True once `expires_at` has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at < Utc::now())
    }
}

/// Result of key creation: the stored record plus the raw key, returned
/// to the caller exactly once
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub key: ApiKey,
    pub raw_key: String,
}

/// SHA-256 hex digest of a raw key
pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_raw_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{RAW_KEY_PREFIX}{}", hex::encode(bytes))
}

impl TenantRegistry {
    /// Mint a key for an existing tenant. Scopes must come from the closed
    /// vocabulary; the raw key is never persisted.
    pub async fn create_api_key(
        &self,
        tenant_id: &str,
        name: &str,
        scopes: Vec<Scope>,
        expires_at: Option<DateTime<Utc>>,
    ) -> PersistenceResult<CreatedApiKey> {
        // verify the tenant exists before minting anything
        self.get(tenant_id).await?;

        let raw_key = generate_raw_key();
        let key = ApiKey {
            key_hash: hash_key(&raw_key),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            scopes,
            expires_at,
            created_at: Utc::now(),
            last_used_at: None,
            metadata: HashMap::new(),
        };

        let mut tx = self.kv.begin_write()?;
        tx.put(&apikey_key(&key.key_hash), encode(&key)?);
        tx.put(
            &apikey_tenant_key(tenant_id, &key.key_hash),
            encode(&key)?,
        );
        tx.commit()?;

        info!(tenant_id = %tenant_id, key_name = %name, "Created API key");
        Ok(CreatedApiKey { key, raw_key })
    }

    /// Resolve a raw key to its stored record
    pub async fn get_api_key(&self, raw: &str) -> PersistenceResult<ApiKey> {
        let digest = hash_key(raw);
        match self.kv.get(&apikey_key(&digest))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Err(PersistenceError::ApiKeyNotFound),
        }
    }

    /// Resolve a raw key to the owning tenant; expired keys are rejected
    pub async fn get_tenant_by_api_key(&self, raw: &str) -> PersistenceResult<Tenant> {
        let key = self.get_api_key(raw).await?;
        if key.is_expired() {
            return Err(PersistenceError::ApiKeyExpired);
        }
        self.get(&key.tenant_id).await
    }

    /// List a tenant's keys through the tenant-scoped index, skipping
    /// stale index entries whose primary row is gone
    pub async fn list_api_keys(&self, tenant_id: &str) -> PersistenceResult<Vec<ApiKey>> {
        let mut keys = Vec::new();
        for (_, bytes) in self.kv.scan_prefix(&apikey_tenant_prefix(tenant_id))? {
            let indexed: ApiKey = decode(&bytes)?;
            match self.kv.get(&apikey_key(&indexed.key_hash))? {
                Some(primary) => keys.push(decode(&primary)?),
                None => {
                    debug!(tenant_id = %tenant_id, "Skipping stale API key index entry");
                }
            }
        }
        Ok(keys)
    }

    /// Remove both the primary record and the tenant index entry
    pub async fn revoke_api_key(&self, raw: &str) -> PersistenceResult<()> {
        let digest = hash_key(raw);
        let mut tx = self.kv.begin_write()?;
        let key: ApiKey = match tx.get(&apikey_key(&digest))? {
            Some(bytes) => decode(&bytes)?,
            None => return Err(PersistenceError::ApiKeyNotFound),
        };
        tx.delete(&apikey_key(&digest));
        tx.delete(&apikey_tenant_key(&key.tenant_id, &digest));
        tx.commit()?;

        info!(tenant_id = %key.tenant_id, key_name = %key.name, "Revoked API key");
        Ok(())
    }

    /// Refresh `last_used_at`. Silent when the key is gone so callers can
    /// fire this best-effort.
    pub async fn update_api_key_last_used(&self, raw: &str) -> PersistenceResult<()> {
        let digest = hash_key(raw);
        let mut tx = self.kv.begin_write()?;
        let mut key: ApiKey = match tx.get(&apikey_key(&digest))? {
            Some(bytes) => decode(&bytes)?,
            None => return Ok(()),
        };
        key.last_used_at = Some(Utc::now());
        tx.put(&apikey_key(&digest), encode(&key)?);
        tx.put(&apikey_tenant_key(&key.tenant_id, &digest), encode(&key)?);
        tx.commit()?;
        Ok(())
    }

    /// Validate scope names from the API boundary against the closed set
    pub fn parse_scopes(names: &[String]) -> PersistenceResult<Vec<Scope>> {
        names
            .iter()
            .map(|s| {
                Scope::parse(s).ok_or_else(|| PersistenceError::InvalidScope(s.clone()))
            })
            .collect()
    }

    /// True when the tenant may serve requests
    pub fn tenant_is_serviceable(tenant: &Tenant) -> bool {
        tenant.status == TenantStatus::Active
    }
}
