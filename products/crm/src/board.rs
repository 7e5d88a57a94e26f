//! In-memory board state: the deal list, the stage filter, and the derived view.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::{
    error::{CrmError, CrmResult},
    model::{Deal, DealId, FieldUpdate, NewDeal, Stage},
    repository::{DealRepository, sort_deals},
};

/// How the board catches up with the store after a successful write.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// Patch the local list with what was written.
    #[default]
    Optimistic,
    /// Re-read the whole list.
    Refetch,
}

/// Stages shown on the board. Empty or complete means no filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageFilter(BTreeSet<Stage>);

impl StageFilter {
    pub fn all() -> Self {
        Self(Stage::ALL.into_iter().collect())
    }

    pub fn only(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self(stages.into_iter().collect())
    }

    pub fn is_unfiltered(&self) -> bool {
        self.0.is_empty() || self.0.len() == Stage::ALL.len()
    }

    /// Whether deals in `stage` pass the filter.
    pub fn matches(&self, stage: Stage) -> bool {
        self.is_unfiltered() || self.0.contains(&stage)
    }

    /// Whether `stage` is explicitly selected (checkbox state).
    pub fn contains(&self, stage: Stage) -> bool {
        self.0.contains(&stage)
    }

    pub fn toggle(&mut self, stage: Stage) {
        if !self.0.remove(&stage) {
            self.0.insert(stage);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.0.iter().copied().collect()
    }
}

impl Default for StageFilter {
    fn default() -> Self {
        Self(
            Stage::ALL
                .into_iter()
                .filter(|stage| !stage.is_inactive())
                .collect(),
        )
    }
}

/// Proof that the user confirmed deleting a specific deal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteConfirmation {
    id: DealId,
    company: String,
}

impl DeleteConfirmation {
    pub fn id(&self) -> DealId {
        self.id
    }

    /// Prompt text for the confirmation step.
    pub fn prompt(&self) -> String {
        format!("Delete {}? This cannot be undone.", self.company)
    }
}

pub struct Board {
    repo: DealRepository,
    strategy: SyncStrategy,
    deals: Vec<Deal>,
    filter: StageFilter,
    notice: Option<String>,
}

impl Board {
    pub fn new(repo: DealRepository, strategy: SyncStrategy) -> Self {
        Self {
            repo,
            strategy,
            deals: Vec::new(),
            filter: StageFilter::default(),
            notice: None,
        }
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Local copy of every deal, in board order.
    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn find(&self, id: DealId) -> Option<&Deal> {
        self.deals.iter().find(|deal| deal.id == id)
    }

    pub fn visible_deals(&self) -> Vec<&Deal> {
        self.deals
            .iter()
            .filter(|deal| self.filter.matches(deal.stage))
            .collect()
    }

    /// Deal totals per stage over the unfiltered list.
    pub fn stage_counts(&self) -> Vec<(Stage, usize)> {
        Stage::ALL
            .into_iter()
            .map(|stage| {
                let count = self.deals.iter().filter(|deal| deal.stage == stage).count();
                (stage, count)
            })
            .collect()
    }

    pub fn filter(&self) -> &StageFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: StageFilter) {
        self.filter = filter;
    }

    pub fn toggle_stage(&mut self, stage: Stage) {
        self.filter.toggle(stage);
    }

    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }

    pub fn show_all(&mut self) {
        self.filter = StageFilter::all();
    }

    /// Message from the last failed operation, if the next one has not succeeded yet.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Reload from the store. A failure leaves the board empty.
    pub async fn refresh(&mut self) -> CrmResult<()> {
        match self.repo.list_deals().await {
            Ok(deals) => {
                self.deals = deals;
                self.notice = None;
                Ok(())
            }
            Err(err) => {
                self.deals.clear();
                self.notice = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn add_deal(&mut self, new: NewDeal) -> CrmResult<Deal> {
        let result = self.repo.create_deal(new).await;
        let deal = self.settle(result)?;
        match self.strategy {
            SyncStrategy::Optimistic => {
                if self.find(deal.id).is_none() {
                    self.deals.push(deal.clone());
                    sort_deals(&mut self.deals);
                }
            }
            SyncStrategy::Refetch => self.refetch().await,
        }
        Ok(deal)
    }

    /// Returns the deal as written, or `None` when it is neither on the board nor readable.
    pub async fn update_field(
        &mut self,
        id: DealId,
        update: FieldUpdate,
    ) -> CrmResult<Option<Deal>> {
        let update = update.normalized();
        let result = self.repo.update_deal_field(id, update.clone()).await;
        let stamp = match self.settle(result) {
            Ok(stamp) => stamp,
            Err(err) => {
                self.forget_if_missing(&err).await;
                return Err(err);
            }
        };
        let written = self.find(id).cloned().map(|mut deal| {
            deal.apply(&update, stamp);
            deal
        });
        match self.strategy {
            SyncStrategy::Optimistic => match self.deals.iter().position(|deal| deal.id == id) {
                Some(index) => {
                    self.deals[index].apply(&update, stamp);
                    sort_deals(&mut self.deals);
                }
                None => self.refetch().await,
            },
            SyncStrategy::Refetch => self.refetch().await,
        }
        Ok(self.find(id).cloned().or(written))
    }

    /// First step of a delete. The returned token is required to issue it.
    pub fn request_delete(&self, id: DealId) -> CrmResult<DeleteConfirmation> {
        let deal = self.find(id).ok_or(CrmError::NotFound(id))?;
        Ok(DeleteConfirmation {
            id,
            company: deal.company.clone(),
        })
    }

    pub async fn delete_deal(&mut self, confirmation: DeleteConfirmation) -> CrmResult<()> {
        let id = confirmation.id;
        let result = self.repo.delete_deal(id).await;
        if let Err(err) = self.settle(result) {
            self.forget_if_missing(&err).await;
            return Err(err);
        }
        match self.strategy {
            SyncStrategy::Optimistic => self.deals.retain(|deal| deal.id != id),
            SyncStrategy::Refetch => self.refetch().await,
        }
        Ok(())
    }

    fn settle<T>(&mut self, result: CrmResult<T>) -> CrmResult<T> {
        match &result {
            Ok(_) => self.notice = None,
            Err(err) => self.notice = Some(err.to_string()),
        }
        result
    }

    /// Re-read after a write that already succeeded; a failure only sets the notice.
    async fn refetch(&mut self) {
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "refetch after write failed");
        }
    }

    /// The store no longer has the deal, so neither should the board.
    async fn forget_if_missing(&mut self, err: &CrmError) {
        let CrmError::NotFound(id) = err else {
            return;
        };
        let id = *id;
        debug!(%id, "dropping deal missing from the store");
        match self.strategy {
            SyncStrategy::Optimistic => self.deals.retain(|deal| deal.id != id),
            SyncStrategy::Refetch => {
                let notice = self.notice.take();
                self.refetch().await;
                if self.notice.is_none() {
                    self.notice = notice;
                }
            }
        }
    }
}
