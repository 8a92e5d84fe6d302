//! Authentication and authorization utilities
//!
//! API keys are stored as SHA-256 hashes on the tenant row. The request
//! extractor resolves the presented key to its tenant and rejects requests
//! whose claimed tenant does not own the key.

use crate::db::models::Tenant;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant ID, verified against the API key's owner
    pub tenant_id: Uuid,

    /// The presented API key
    pub api_key: String,

    /// Request ID for tracing
    pub request_id: String,
}

/// Hash an API key for storage
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new API key
pub fn generate_api_key() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("sk_{}", hex::encode(random_bytes))
}

/// Extract API key from Authorization header
pub fn extract_api_key(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Check that the tenant resolved from the API key is the one the
/// request claims.
pub fn verify_tenant_claim(tenant: &Tenant, claimed_tenant_id: Uuid) -> Result<()> {
    if tenant.id != claimed_tenant_id {
        return Err(AppError::TenantMismatch);
    }
    Ok(())
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    Repository: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        // Extract request ID
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Extract tenant ID
        let tenant_id = parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing or invalid X-Tenant-ID header".to_string(),
            })?;

        // Extract API key
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let api_key = extract_api_key(auth_header)
            .ok_or(AppError::InvalidApiKey)?
            .to_string();

        // Resolve the key to its tenant via the stored hash. Inactive
        // tenants resolve to nothing.
        let repo = Repository::from_ref(state);
        let tenant = repo
            .find_tenant_by_api_key_hash(&hash_api_key(&api_key))
            .await?
            .ok_or(AppError::InvalidApiKey)?;

        verify_tenant_claim(&tenant, tenant_id)?;

        Ok(AuthContext {
            tenant_id,
            api_key,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant(id: Uuid) -> Tenant {
        Tenant {
            id,
            name: "Northside Elementary".into(),
            api_key_hash: hash_api_key("sk_test_12345"),
            is_active: true,
            alert_boundaries: None,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_hash_api_key() {
        let hash = hash_api_key("sk_test_12345");
        assert_eq!(hash, hash_api_key("sk_test_12345"));
        assert_ne!(hash, hash_api_key("wrong_key"));
    }

    #[test]
    fn test_generate_api_key() {
        let key = generate_api_key();
        assert!(key.starts_with("sk_"));
        assert!(key.len() > 10);
    }

    #[test]
    fn test_extract_api_key() {
        assert_eq!(extract_api_key("Bearer sk_123"), Some("sk_123"));
        assert_eq!(extract_api_key("sk_123"), None);
        assert_eq!(extract_api_key("Basic abc"), None);
    }

    #[test]
    fn test_tenant_claim_must_match_key_owner() {
        let owner = Uuid::new_v4();
        let t = tenant(owner);

        assert!(verify_tenant_claim(&t, owner).is_ok());

        let err = verify_tenant_claim(&t, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::TenantMismatch));
    }
}
