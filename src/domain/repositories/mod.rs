pub mod cache;
pub mod ledger_store;
