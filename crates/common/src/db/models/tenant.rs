//! Tenant entity (one school per row)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    /// SHA-256 hash of the tenant API key
    #[sea_orm(column_type = "Text")]
    pub api_key_hash: String,

    pub is_active: bool,

    /// Per-tenant override for the alert boundary list, e.g. [3, 10, 50].
    /// Null means the configured defaults apply.
    #[sea_orm(column_type = "Json", nullable)]
    pub alert_boundaries: Option<Json>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the alert boundary override, discarding malformed entries
    pub fn alert_boundary_override(&self) -> Option<Vec<u32>> {
        let value = self.alert_boundaries.as_ref()?;
        let list = value.as_array()?;
        let mut boundaries: Vec<u32> = list
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as u32))
            .collect();
        boundaries.sort_unstable();
        boundaries.dedup();
        if boundaries.is_empty() {
            None
        } else {
            Some(boundaries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant(boundaries: Option<serde_json::Value>) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Northside Elementary".into(),
            api_key_hash: "abc".into(),
            is_active: true,
            alert_boundaries: boundaries,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_boundary_override_parsing() {
        let t = tenant(Some(serde_json::json!([10, 3, 3, 50])));
        assert_eq!(t.alert_boundary_override(), Some(vec![3, 10, 50]));
    }

    #[test]
    fn test_boundary_override_absent() {
        assert_eq!(tenant(None).alert_boundary_override(), None);
        assert_eq!(
            tenant(Some(serde_json::json!([]))).alert_boundary_override(),
            None
        );
    }
}
