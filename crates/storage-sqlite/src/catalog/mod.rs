mod model;
mod repository;

pub use model::{ProductDB, StockLevelDB};
pub use repository::CatalogRepository;
