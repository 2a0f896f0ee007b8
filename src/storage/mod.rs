pub mod database;
pub mod time;

mod database_catalog;
mod database_customers;
mod database_orders;
mod database_pending_orders;
mod database_schedules;
mod database_sessions;

pub use database::Database;
