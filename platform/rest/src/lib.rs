//! Hosted backend client: shared HTTP plumbing plus the REST deal store.

mod client;
mod store;

pub use client::{RestClient, RestError};
pub use store::RestDealStore;
