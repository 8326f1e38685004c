pub mod db;
pub mod memory;
pub mod postgres;
pub mod store;

pub use db::Db;
pub use memory::MemoryCatalog;
pub use postgres::PgCatalogStore;
pub use store::{BrandRepository, CatalogStore, CatalogTx, ProductLookup, StoreResult};
