use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohub_core::{
    Metadata, Opportunity, OpportunityStatus, ParseEnumError, StoredOpportunity,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no opportunity with id {0}")]
    NotFound(Uuid),
    #[error("invalid stored value: {0}")]
    InvalidRow(#[from] ParseEnumError),
    #[error("invalid stored metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Persistence capability used by the sync orchestrator.
///
/// Point lookup by `(title, source)`, insert, and full-record update. Lookup and
/// write are separate calls; callers needing at-most-once inserts serialize them.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn find_by_key(
        &self,
        title: &str,
        source: &str,
    ) -> Result<Option<StoredOpportunity>, StoreError>;

    async fn insert(&self, opportunity: &Opportunity) -> Result<StoredOpportunity, StoreError>;

    /// Overwrite every canonical field of `id`, keeping `id` and `created_at`.
    async fn update(
        &self,
        id: Uuid,
        opportunity: &Opportunity,
    ) -> Result<StoredOpportunity, StoreError>;

    /// Active records, newest first.
    async fn list_active(&self, limit: usize) -> Result<Vec<StoredOpportunity>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOpportunityStore {
    rows: RwLock<Vec<StoredOpportunity>>,
}

impl InMemoryOpportunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl OpportunityStore for InMemoryOpportunityStore {
    async fn find_by_key(
        &self,
        title: &str,
        source: &str,
    ) -> Result<Option<StoredOpportunity>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|row| row.opportunity.identity_key() == (title, source))
            .cloned())
    }

    async fn insert(&self, opportunity: &Opportunity) -> Result<StoredOpportunity, StoreError> {
        let now = Utc::now();
        let stored = StoredOpportunity {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            opportunity: opportunity.clone(),
        };
        self.rows.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        opportunity: &Opportunity,
    ) -> Result<StoredOpportunity, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::NotFound(id))?;
        row.opportunity = opportunity.clone();
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<StoredOpportunity>, StoreError> {
        let rows = self.rows.read().await;
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut active = rows
            .iter()
            .rev()
            .filter(|row| row.opportunity.status == OpportunityStatus::Active)
            .cloned()
            .collect::<Vec<_>>();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active.truncate(limit);
        Ok(active)
    }
}

#[derive(Debug, Clone)]
pub struct PgOpportunityStore {
    pool: PgPool,
}

impl PgOpportunityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("running opportunity migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const SELECT_COLUMNS: &str = r#"
    id, title, source, opportunity_type, category, investment_min, investment_max,
    description, image_url, website, location, province, country, status, metadata,
    created_at, updated_at
"#;

fn row_to_stored(row: &PgRow) -> Result<StoredOpportunity, StoreError> {
    let opportunity_type: String = row.try_get("opportunity_type")?;
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(StoredOpportunity {
        id: row.try_get("id")?,
        created_at,
        updated_at,
        opportunity: Opportunity {
            title: row.try_get("title")?,
            opportunity_type: opportunity_type.parse()?,
            category: category.parse()?,
            investment_min: row.try_get("investment_min")?,
            investment_max: row.try_get("investment_max")?,
            description: row.try_get("description")?,
            image_url: row.try_get("image_url")?,
            website: row.try_get("website")?,
            location: row.try_get("location")?,
            province: row.try_get("province")?,
            country: row.try_get("country")?,
            status: status.parse()?,
            source: row.try_get("source")?,
            metadata: serde_json::from_value::<Metadata>(metadata)?,
        },
    })
}

#[async_trait]
impl OpportunityStore for PgOpportunityStore {
    async fn find_by_key(
        &self,
        title: &str,
        source: &str,
    ) -> Result<Option<StoredOpportunity>, StoreError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM opportunities WHERE title = $1 AND source = $2 LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(title)
            .bind(source)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_stored).transpose()
    }

    async fn insert(&self, opportunity: &Opportunity) -> Result<StoredOpportunity, StoreError> {
        let metadata = serde_json::to_value(&opportunity.metadata)?;
        let query = format!(
            r#"
            INSERT INTO opportunities (
                id, title, source, opportunity_type, category, investment_min, investment_max,
                description, image_url, website, location, province, country, status, metadata,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&opportunity.title)
            .bind(&opportunity.source)
            .bind(opportunity.opportunity_type.as_str())
            .bind(opportunity.category.as_str())
            .bind(opportunity.investment_min)
            .bind(opportunity.investment_max)
            .bind(&opportunity.description)
            .bind(&opportunity.image_url)
            .bind(&opportunity.website)
            .bind(&opportunity.location)
            .bind(&opportunity.province)
            .bind(&opportunity.country)
            .bind(opportunity.status.as_str())
            .bind(metadata)
            .fetch_one(&self.pool)
            .await?;
        row_to_stored(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        opportunity: &Opportunity,
    ) -> Result<StoredOpportunity, StoreError> {
        let metadata = serde_json::to_value(&opportunity.metadata)?;
        let query = format!(
            r#"
            UPDATE opportunities
               SET title = $2,
                   source = $3,
                   opportunity_type = $4,
                   category = $5,
                   investment_min = $6,
                   investment_max = $7,
                   description = $8,
                   image_url = $9,
                   website = $10,
                   location = $11,
                   province = $12,
                   country = $13,
                   status = $14,
                   metadata = $15,
                   updated_at = NOW()
             WHERE id = $1
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&opportunity.title)
            .bind(&opportunity.source)
            .bind(opportunity.opportunity_type.as_str())
            .bind(opportunity.category.as_str())
            .bind(opportunity.investment_min)
            .bind(opportunity.investment_max)
            .bind(&opportunity.description)
            .bind(&opportunity.image_url)
            .bind(&opportunity.website)
            .bind(&opportunity.location)
            .bind(&opportunity.province)
            .bind(&opportunity.country)
            .bind(opportunity.status.as_str())
            .bind(metadata)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        row_to_stored(&row)
    }

    async fn list_active(&self, limit: usize) -> Result<Vec<StoredOpportunity>, StoreError> {
        let query = format!(
            r#"
            SELECT {SELECT_COLUMNS}
              FROM opportunities
             WHERE status = 'active'
             ORDER BY created_at DESC
             LIMIT $1
            "#
        );
        let rows = sqlx::query(&query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_stored).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohub_core::OpportunityType;

    fn listing(title: &str, source: &str) -> Opportunity {
        Opportunity::new(title, OpportunityType::RealEstate, source)
    }

    #[tokio::test]
    async fn find_by_key_matches_title_and_source_exactly() {
        let store = InMemoryOpportunityStore::new();
        store.insert(&listing("A", "s1")).await.unwrap();

        assert!(store.find_by_key("A", "s1").await.unwrap().is_some());
        assert!(store.find_by_key("A", "s2").await.unwrap().is_none());
        assert!(store.find_by_key("a", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_overwrites_fields_but_keeps_identity() {
        let store = InMemoryOpportunityStore::new();
        let inserted = store.insert(&listing("A", "s1")).await.unwrap();

        let mut changed = listing("A", "s1");
        changed.description = "Renovated".to_string();
        changed.investment_min = 10.0;
        let updated = store.update(inserted.id, &changed).await.unwrap();

        assert_eq!(updated.id, inserted.id);
        assert_eq!(updated.created_at, inserted.created_at);
        assert!(updated.updated_at >= inserted.updated_at);
        assert_eq!(updated.opportunity, changed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let store = InMemoryOpportunityStore::new();
        let err = store.update(Uuid::nil(), &listing("A", "s1")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == Uuid::nil()));
    }

    #[tokio::test]
    async fn list_active_is_newest_first_and_skips_inactive() {
        let store = InMemoryOpportunityStore::new();
        store.insert(&listing("first", "s1")).await.unwrap();
        let mut hidden = listing("hidden", "s1");
        hidden.status = OpportunityStatus::Inactive;
        store.insert(&hidden).await.unwrap();
        store.insert(&listing("second", "s1")).await.unwrap();

        let active = store.list_active(10).await.unwrap();
        let titles = active
            .iter()
            .map(|row| row.opportunity.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["second", "first"]);

        assert_eq!(store.list_active(1).await.unwrap().len(), 1);
    }
}
