use async_trait::async_trait;
use products_crm::{
    DEALS_TABLE, DealId, DealPatch, DealRow, NewDealRow, PersistenceGateway, TransportError,
};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::RestClient;

const RETURN_ROWS: (&str, &str) = ("Prefer", "return=representation");

/// [`PersistenceGateway`] over the hosted `/rest/v1/<table>` API.
#[derive(Clone, Debug)]
pub struct RestDealStore {
    client: RestClient,
    table: String,
}

impl RestDealStore {
    pub fn new(client: RestClient) -> Self {
        Self::for_table(client, DEALS_TABLE)
    }

    pub fn for_table(client: RestClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn table_url(&self, filter: Option<(&str, String)>) -> Result<reqwest::Url, TransportError> {
        let mut url = self.client.endpoint(&format!("rest/v1/{}", self.table))?;
        match filter {
            Some((column, value)) => {
                url.query_pairs_mut().append_pair(column, &value);
            }
            None => {
                url.query_pairs_mut().append_pair("select", "*");
            }
        }
        Ok(url)
    }

    fn match_id(id: DealId) -> Option<(&'static str, String)> {
        Some(("id", format!("eq.{id}")))
    }
}

#[async_trait]
impl PersistenceGateway for RestDealStore {
    async fn select(&self) -> Result<Vec<DealRow>, TransportError> {
        let url = self.table_url(None)?;
        let request = self.client.request(Method::GET, url);
        let rows: Vec<DealRow> = self.client.send_json(request).await?;
        debug!(table = %self.table, count = rows.len(), "rows selected");
        Ok(rows)
    }

    async fn insert(&self, rows: Vec<NewDealRow>) -> Result<Vec<DealRow>, TransportError> {
        let url = self.table_url(None)?;
        let request = self
            .client
            .request(Method::POST, url)
            .header(RETURN_ROWS.0, RETURN_ROWS.1)
            .json(&rows);
        Ok(self.client.send_json(request).await?)
    }

    async fn update(&self, patch: DealPatch, id: DealId) -> Result<u64, TransportError> {
        let url = self.table_url(Self::match_id(id))?;
        let request = self
            .client
            .request(Method::PATCH, url)
            .header(RETURN_ROWS.0, RETURN_ROWS.1)
            .json(&patch.to_json());
        let matched: Vec<Value> = self.client.send_json(request).await?;
        Ok(matched.len() as u64)
    }

    async fn delete(&self, id: DealId) -> Result<u64, TransportError> {
        let url = self.table_url(Self::match_id(id))?;
        let request = self
            .client
            .request(Method::DELETE, url)
            .header(RETURN_ROWS.0, RETURN_ROWS.1);
        let matched: Vec<Value> = self.client.send_json(request).await?;
        Ok(matched.len() as u64)
    }
}
