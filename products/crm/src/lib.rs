//! Deal tracker vertical slice.
//!
//! The persistence and auth backends are consumed through the traits in
//! [`gateway`]; everything above them (normalization, ordering, filtering,
//! session gating) lives here so every backend behaves the same.

pub mod board;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod repository;
pub mod session;

pub use board::{Board, DeleteConfirmation, StageFilter, SyncStrategy};
pub use error::{CrmError, CrmResult, TransportError};
pub use gateway::{AuthGateway, AuthUser, DealPatch, DealRow, NewDealRow, PersistenceGateway};
pub use model::{Deal, DealField, DealId, FieldUpdate, NewDeal, Stage, TeamRoster};
pub use repository::DealRepository;
pub use session::{Screen, SessionGuard, SessionState};

/// Table every gateway targets unless configured otherwise.
pub const DEALS_TABLE: &str = "deals";
