//! Service layer shared by sync tasks and clients

mod database;

pub use database::DatabaseService;
