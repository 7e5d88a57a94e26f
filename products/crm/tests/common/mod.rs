#![allow(dead_code)]

use std::sync::Arc;

use products_crm::{
    Board, DealRepository, DealRow, SyncStrategy,
    memory::{InMemoryAuth, InMemoryDealStore},
};

pub const EMAIL: &str = "partner@fund.vc";
pub const PASSWORD: &str = "correct horse";

pub struct Harness {
    pub store: Arc<InMemoryDealStore>,
    pub repo: DealRepository,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryDealStore::new())
    }

    pub fn with_rows(rows: impl IntoIterator<Item = DealRow>) -> Self {
        Self::with_store(InMemoryDealStore::with_rows(rows))
    }

    fn with_store(store: InMemoryDealStore) -> Self {
        let store = Arc::new(store);
        let repo = DealRepository::new(store.clone());
        Self { store, repo }
    }

    pub fn board(&self, strategy: SyncStrategy) -> Board {
        Board::new(self.repo.clone(), strategy)
    }
}

pub fn auth() -> Arc<InMemoryAuth> {
    Arc::new(InMemoryAuth::new().with_account(EMAIL, PASSWORD))
}
