/// Database model definitions.
pub mod models;
/// Ride, profile, and inbox persistence.
pub mod ride_store;
/// Storage abstraction layer for database operations.
pub mod storage;
