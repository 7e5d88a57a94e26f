//! Contracts of the two backends the tracker sits on.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    error::{CrmResult, TransportError},
    model::{DealId, FieldUpdate},
};

/// A deal as the store returns it, before normalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRow {
    pub id: Uuid,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub sourcer: Option<String>,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDealRow {
    pub company: String,
    pub stage: String,
    pub sourcer: Option<String>,
    pub partner: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl NewDealRow {
    /// Materialize the row with a store-assigned id.
    pub fn into_row(self, id: Uuid) -> DealRow {
        DealRow {
            id,
            company: Some(self.company),
            stage: Some(self.stage),
            sourcer: self.sourcer,
            partner: self.partner,
            notes: self.notes,
            description: self.description,
            last_updated: Some(self.last_updated),
        }
    }
}

/// One field plus the refreshed timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealPatch {
    pub update: FieldUpdate,
    pub last_updated: DateTime<Utc>,
}

impl DealPatch {
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        let value = self
            .update
            .stored_value()
            .map(Value::String)
            .unwrap_or(Value::Null);
        body.insert(self.update.field().column().to_string(), value);
        body.insert(
            "last_updated".to_string(),
            Value::String(self.last_updated.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Value::Object(body)
    }

    pub fn apply_to(&self, row: &mut DealRow) {
        let value = self.update.stored_value();
        match &self.update {
            FieldUpdate::Company(_) => row.company = value,
            FieldUpdate::Stage(_) => row.stage = value,
            FieldUpdate::Partner(_) => row.partner = value,
            FieldUpdate::Sourcer(_) => row.sourcer = value,
            FieldUpdate::Notes(_) => row.notes = value,
            FieldUpdate::Description(_) => row.description = value,
        }
        row.last_updated = Some(self.last_updated);
    }
}

/// Table-like store holding the deals. One instance targets one table.
///
/// `update` and `delete` report how many rows matched; zero is not an error here.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn select(&self) -> Result<Vec<DealRow>, TransportError>;

    async fn insert(&self, rows: Vec<NewDealRow>) -> Result<Vec<DealRow>, TransportError>;

    async fn update(&self, patch: DealPatch, id: DealId) -> Result<u64, TransportError>;

    async fn delete(&self, id: DealId) -> Result<u64, TransportError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn current_user(&self) -> CrmResult<Option<AuthUser>>;

    async fn sign_in(&self, email: &str, password: &str) -> CrmResult<AuthUser>;

    async fn sign_out(&self) -> CrmResult<()>;

    /// Session changes as a latest-value channel. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}
