// Database layer: the storage adapter abstraction, the ledger schema,
// and the typed row models.

pub mod adapter;
pub mod models;
pub mod schema;
