pub mod settlement;
pub mod stock;
pub mod transaction;
pub mod user;
