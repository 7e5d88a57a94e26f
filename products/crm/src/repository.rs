use std::{
    cmp::Ordering,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument, warn};

use crate::{
    error::{CrmError, CrmResult, TransportError},
    gateway::{DealPatch, DealRow, NewDealRow, PersistenceGateway},
    model::{Deal, DealId, FieldUpdate, NewDeal, Stage, free_text, person},
};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hands out strictly increasing microsecond timestamps.
struct Stamper {
    clock: Arc<dyn Clock>,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Stamper {
    fn next(&self) -> DateTime<Utc> {
        let now = truncate_micros(self.clock.now());
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = match *last {
            Some(prev) if now <= prev => truncate_micros(prev + Duration::microseconds(1)),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Never stamp at or below a time already stored, even one from a skewed clock.
    fn observe(&self, stored: DateTime<Utc>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_none_or(|prev| stored > prev) {
            *last = Some(stored);
        }
    }
}

fn truncate_micros(stamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(stamp.timestamp_micros()).unwrap_or(stamp)
}

/// CRUD over the deals table. Construct once and share; clones are cheap.
#[derive(Clone)]
pub struct DealRepository {
    gateway: Arc<dyn PersistenceGateway>,
    stamper: Arc<Stamper>,
}

impl DealRepository {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_clock(gateway, Arc::new(SystemClock))
    }

    pub fn with_clock(gateway: Arc<dyn PersistenceGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            stamper: Arc::new(Stamper {
                clock,
                last: Mutex::new(None),
            }),
        }
    }

    /// All deals in board order.
    #[instrument(name = "deals.list", skip_all)]
    pub async fn list_deals(&self) -> CrmResult<Vec<Deal>> {
        let rows = self.gateway.select().await.inspect_err(|err| {
            warn!(error = %err, "listing deals failed");
        })?;
        let mut deals: Vec<Deal> = rows.into_iter().filter_map(normalize_row).collect();
        if let Some(latest) = deals.iter().filter_map(|deal| deal.last_updated).max() {
            self.stamper.observe(latest);
        }
        sort_deals(&mut deals);
        debug!(count = deals.len(), "deals listed");
        Ok(deals)
    }

    #[instrument(name = "deals.create", skip_all, fields(company = %new.company))]
    pub async fn create_deal(&self, new: NewDeal) -> CrmResult<Deal> {
        let company = new.company.trim().to_string();
        if company.is_empty() {
            return Err(CrmError::validation("company is required"));
        }
        let stage = new.stage.unwrap_or_default();
        let row = NewDealRow {
            company,
            stage: stage.label().to_string(),
            sourcer: person(new.sourcer),
            partner: person(new.partner),
            notes: free_text(new.notes),
            description: free_text(new.description),
            last_updated: self.stamper.next(),
        };
        let inserted = self.gateway.insert(vec![row]).await.inspect_err(|err| {
            warn!(error = %err, "creating deal failed");
        })?;
        let row = inserted
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::new("insert acknowledged without returning a row"))?;
        let deal = normalize_row(row)
            .ok_or_else(|| TransportError::new("insert returned a deal without a company"))?;
        if let Some(stored) = deal.last_updated {
            self.stamper.observe(stored);
        }
        debug!(id = %deal.id, stage = %deal.stage, "deal created");
        Ok(deal)
    }

    /// Change one field and refresh `last_updated`; returns the stamp written.
    #[instrument(name = "deals.update_field", skip_all, fields(%id, field = update.field().column()))]
    pub async fn update_deal_field(
        &self,
        id: DealId,
        update: FieldUpdate,
    ) -> CrmResult<DateTime<Utc>> {
        let update = update.normalized();
        if let FieldUpdate::Company(company) = &update {
            if company.is_empty() {
                return Err(CrmError::validation("company cannot be blank"));
            }
        }
        let patch = DealPatch {
            update,
            last_updated: self.stamper.next(),
        };
        let stamp = patch.last_updated;
        let matched = self.gateway.update(patch, id).await.inspect_err(|err| {
            warn!(error = %err, "updating deal failed");
        })?;
        if matched == 0 {
            return Err(CrmError::NotFound(id));
        }
        Ok(stamp)
    }

    #[instrument(name = "deals.delete", skip_all, fields(%id))]
    pub async fn delete_deal(&self, id: DealId) -> CrmResult<()> {
        let matched = self.gateway.delete(id).await.inspect_err(|err| {
            warn!(error = %err, "deleting deal failed");
        })?;
        if matched == 0 {
            return Err(CrmError::NotFound(id));
        }
        Ok(())
    }
}

/// Stage rank, then company ignoring case, then exact company, then id.
pub fn board_order(a: &Deal, b: &Deal) -> Ordering {
    a.stage
        .rank()
        .cmp(&b.stage.rank())
        .then_with(|| a.company.to_lowercase().cmp(&b.company.to_lowercase()))
        .then_with(|| a.company.cmp(&b.company))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_deals(deals: &mut [Deal]) {
    deals.sort_by(board_order);
}

/// Turn a stored row into a [`Deal`]. Rows without a company are skipped.
pub fn normalize_row(row: DealRow) -> Option<Deal> {
    let id = DealId(row.id);
    let company = row.company.as_deref().map(str::trim).unwrap_or_default();
    if company.is_empty() {
        warn!(%id, "skipping deal without a company");
        return None;
    }
    let stage = match row.stage.as_deref().map(str::trim) {
        None | Some("") => Stage::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(%id, stage = raw, "unknown stage; using default");
            Stage::default()
        }),
    };
    Some(Deal {
        id,
        company: company.to_string(),
        stage,
        sourcer: person(row.sourcer),
        partner: person(row.partner),
        notes: free_text(row.notes),
        description: free_text(row.description),
        last_updated: row.last_updated,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    struct FrozenClock(DateTime<Utc>);

    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn row(company: Option<&str>, stage: Option<&str>) -> DealRow {
        DealRow {
            id: Uuid::new_v4(),
            company: company.map(Into::into),
            stage: stage.map(Into::into),
            sourcer: Some("  ".into()),
            partner: Some(" Seth ".into()),
            notes: Some("".into()),
            description: Some(" keep ".into()),
            last_updated: None,
        }
    }

    #[test]
    fn stamps_strictly_increase_under_a_frozen_clock() {
        let frozen = Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap();
        let stamper = Stamper {
            clock: Arc::new(FrozenClock(frozen)),
            last: Mutex::new(None),
        };
        let first = stamper.next();
        let second = stamper.next();
        let third = stamper.next();
        assert_eq!(first, frozen);
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn stamps_stay_ahead_of_observed_future_stamps() {
        let frozen = Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap();
        let stamper = Stamper {
            clock: Arc::new(FrozenClock(frozen)),
            last: Mutex::new(None),
        };
        let ahead = frozen + Duration::minutes(5) + Duration::nanoseconds(678);
        stamper.observe(ahead);
        stamper.observe(frozen);
        let stamp = stamper.next();
        assert!(stamp > ahead);
        assert_eq!(stamp.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn normalize_fills_defaults_and_cleans_text() {
        let deal = normalize_row(row(Some(" Acme "), None)).unwrap();
        assert_eq!(deal.company, "Acme");
        assert_eq!(deal.stage, Stage::Inbound);
        assert_eq!(deal.sourcer, None);
        assert_eq!(deal.partner.as_deref(), Some("Seth"));
        assert_eq!(deal.notes, None);
        assert_eq!(deal.description.as_deref(), Some(" keep "));

        let deal = normalize_row(row(Some("Beta"), Some("Closed Won"))).unwrap();
        assert_eq!(deal.stage, Stage::Inbound);
        let deal = normalize_row(row(Some("Gamma"), Some("memo"))).unwrap();
        assert_eq!(deal.stage, Stage::Memo);
    }

    #[test]
    fn normalize_drops_rows_without_company() {
        assert!(normalize_row(row(None, Some("Memo"))).is_none());
        assert!(normalize_row(row(Some("   "), Some("Memo"))).is_none());
    }

    #[test]
    fn board_order_is_stage_then_company() {
        let mut deals: Vec<Deal> = [
            ("zeta", "IC"),
            ("Alpha", "IC"),
            ("beta", "Inbound Deals"),
            ("Acme", "Dumpster"),
        ]
        .into_iter()
        .filter_map(|(company, stage)| normalize_row(row(Some(company), Some(stage))))
        .collect();
        sort_deals(&mut deals);
        let names: Vec<&str> = deals.iter().map(|d| d.company.as_str()).collect();
        assert_eq!(names, ["beta", "Alpha", "zeta", "Acme"]);
    }
}
