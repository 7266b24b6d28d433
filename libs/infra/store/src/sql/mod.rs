mod queries;
mod schema;
mod store;

pub use schema::SQL_SCHEMA;
pub use store::SqlBackingStore;
