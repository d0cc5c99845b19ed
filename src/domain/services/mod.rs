pub mod pricing;
pub mod read_through;
pub mod settlement;
pub mod user_locks;
