pub mod deals;
