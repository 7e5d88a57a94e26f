//! Direct database access to the deals table through sea-orm.

use async_trait::async_trait;
use chrono::Utc;
use entity::deals;
use products_crm::{
    DealId, DealPatch, DealRow, FieldUpdate, NewDealRow, PersistenceGateway, TransportError,
};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    TransactionTrait, sea_query::Expr,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("database connection failed")]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Where to find the database URL.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            env_key: default_url_key(),
        }
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn database_url(&self) -> DbResult<String> {
        std::env::var(&self.env_key)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DbError::MissingUrl(self.env_key.clone()))
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DatabaseConnection> {
    let url = settings.database_url()?;
    let db = Database::connect(&url).await?;
    info!(env_key = %settings.env_key, "database connected");
    Ok(db)
}

/// [`PersistenceGateway`] over the `deals` table.
#[derive(Clone)]
pub struct OrmDealStore {
    db: DatabaseConnection,
}

impl OrmDealStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PersistenceGateway for OrmDealStore {
    async fn select(&self) -> Result<Vec<DealRow>, TransportError> {
        let models = deals::Entity::find()
            .all(&self.db)
            .await
            .map_err(transport)?;
        Ok(models.into_iter().map(to_row).collect())
    }

    async fn insert(&self, rows: Vec<NewDealRow>) -> Result<Vec<DealRow>, TransportError> {
        let txn = self.db.begin().await.map_err(transport)?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let id = Uuid::new_v4();
            let model = deals::ActiveModel {
                id: Set(id),
                company: Set(Some(row.company.clone())),
                stage: Set(Some(row.stage.clone())),
                sourcer: Set(row.sourcer.clone()),
                partner: Set(row.partner.clone()),
                notes: Set(row.notes.clone()),
                description: Set(row.description.clone()),
                last_updated: Set(Some(row.last_updated.into())),
            };
            deals::Entity::insert(model)
                .exec_without_returning(&txn)
                .await
                .map_err(transport)?;
            inserted.push(row.into_row(id));
        }
        txn.commit().await.map_err(transport)?;
        debug!(count = inserted.len(), "deals inserted");
        Ok(inserted)
    }

    async fn update(&self, patch: DealPatch, id: DealId) -> Result<u64, TransportError> {
        let stamp: sea_orm::prelude::DateTimeWithTimeZone = patch.last_updated.into();
        let result = deals::Entity::update_many()
            .col_expr(column_for(&patch.update), Expr::value(patch.update.stored_value()))
            .col_expr(deals::Column::LastUpdated, Expr::value(stamp))
            .filter(deals::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .map_err(transport)?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, id: DealId) -> Result<u64, TransportError> {
        let result = deals::Entity::delete_many()
            .filter(deals::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .map_err(transport)?;
        Ok(result.rows_affected)
    }
}

fn column_for(update: &FieldUpdate) -> deals::Column {
    match update {
        FieldUpdate::Company(_) => deals::Column::Company,
        FieldUpdate::Stage(_) => deals::Column::Stage,
        FieldUpdate::Partner(_) => deals::Column::Partner,
        FieldUpdate::Sourcer(_) => deals::Column::Sourcer,
        FieldUpdate::Notes(_) => deals::Column::Notes,
        FieldUpdate::Description(_) => deals::Column::Description,
    }
}

fn to_row(model: deals::Model) -> DealRow {
    DealRow {
        id: model.id,
        company: model.company,
        stage: model.stage,
        sourcer: model.sourcer,
        partner: model.partner,
        notes: model.notes,
        description: model.description,
        last_updated: model.last_updated.map(|ts| ts.with_timezone(&Utc)),
    }
}

fn transport(err: DbErr) -> TransportError {
    TransportError::with_source("database request failed", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_report_the_missing_key() {
        let settings = DatabaseSettings::new("DEAL_TRACKER_TEST_UNSET_URL");
        let err = settings.database_url().unwrap_err();
        assert_eq!(
            err.to_string(),
            "database url missing (set DEAL_TRACKER_TEST_UNSET_URL)"
        );
    }

    #[test]
    fn every_field_has_its_own_column() {
        let columns = [
            column_for(&FieldUpdate::Company("a".into())),
            column_for(&FieldUpdate::Stage(Default::default())),
            column_for(&FieldUpdate::Partner(None)),
            column_for(&FieldUpdate::Sourcer(None)),
            column_for(&FieldUpdate::Notes(None)),
            column_for(&FieldUpdate::Description(None)),
        ];
        for (i, a) in columns.iter().enumerate() {
            for b in &columns[i + 1..] {
                assert_ne!(format!("{a:?}"), format!("{b:?}"));
            }
        }
    }
}
