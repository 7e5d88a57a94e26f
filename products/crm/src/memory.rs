//! Process-local gateways for development and tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult, TransportError},
    gateway::{AuthGateway, AuthUser, DealPatch, DealRow, NewDealRow, PersistenceGateway},
    model::DealId,
};

#[derive(Debug, Default)]
pub struct InMemoryDealStore {
    rows: Mutex<BTreeMap<Uuid, DealRow>>,
    offline: AtomicBool,
    reads_failing: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryDealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = DealRow>) -> Self {
        let store = Self::default();
        store
            .lock()
            .extend(rows.into_iter().map(|row| (row.id, row)));
        store
    }

    /// Make every call fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only `select` fail; writes keep landing.
    pub fn set_reads_failing(&self, failing: bool) {
        self.reads_failing.store(failing, Ordering::SeqCst);
    }

    /// Number of gateway calls served so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn row(&self, id: DealId) -> Option<DealRow> {
        self.lock().get(&id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Uuid, DealRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            Err(TransportError::new("in-memory store is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryDealStore {
    async fn select(&self) -> Result<Vec<DealRow>, TransportError> {
        self.reachable()?;
        if self.reads_failing.load(Ordering::SeqCst) {
            return Err(TransportError::new("in-memory store rejected the read"));
        }
        Ok(self.lock().values().cloned().collect())
    }

    async fn insert(&self, rows: Vec<NewDealRow>) -> Result<Vec<DealRow>, TransportError> {
        self.reachable()?;
        let mut table = self.lock();
        let inserted: Vec<DealRow> = rows
            .into_iter()
            .map(|row| row.into_row(Uuid::new_v4()))
            .collect();
        for row in &inserted {
            table.insert(row.id, row.clone());
        }
        Ok(inserted)
    }

    async fn update(&self, patch: DealPatch, id: DealId) -> Result<u64, TransportError> {
        self.reachable()?;
        match self.lock().get_mut(&id.0) {
            Some(row) => {
                patch.apply_to(row);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: DealId) -> Result<u64, TransportError> {
        self.reachable()?;
        Ok(self.lock().remove(&id.0).map_or(0, |_| 1))
    }
}

/// Password accounts held in memory, with a single active session.
#[derive(Debug)]
pub struct InMemoryAuth {
    accounts: HashMap<String, (String, AuthUser)>,
    session: watch::Sender<Option<AuthUser>>,
}

impl InMemoryAuth {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: HashMap::new(),
            session,
        }
    }

    pub fn with_account(mut self, email: &str, password: &str) -> Self {
        let email = email.trim().to_ascii_lowercase();
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.clone(),
        };
        self.accounts.insert(email, (password.to_string(), user));
        self
    }

    /// Start already signed in, as if a session had been restored.
    pub fn signed_in_as(self, email: &str) -> Self {
        let user = self
            .accounts
            .get(&email.trim().to_ascii_lowercase())
            .map(|(_, user)| user.clone());
        self.session.send_replace(user);
        self
    }

    /// Push a session change from outside, e.g. an expired token.
    pub fn notify(&self, user: Option<AuthUser>) {
        self.session.send_replace(user);
    }

    pub fn subscribers(&self) -> usize {
        self.session.receiver_count()
    }
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthGateway for InMemoryAuth {
    async fn current_user(&self) -> CrmResult<Option<AuthUser>> {
        Ok(self.session.borrow().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> CrmResult<AuthUser> {
        let key = email.trim().to_ascii_lowercase();
        match self.accounts.get(&key) {
            Some((expected, user)) if expected == password => {
                self.session.send_replace(Some(user.clone()));
                Ok(user.clone())
            }
            _ => Err(CrmError::auth("Invalid login credentials")),
        }
    }

    async fn sign_out(&self) -> CrmResult<()> {
        self.session.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }
}
