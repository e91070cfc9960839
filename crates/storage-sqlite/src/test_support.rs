//! Fixtures shared by the repository tests.

use std::sync::Arc;
use tempfile::TempDir;

use tradeos_core::integrations::{IntegrationRepositoryTrait, NewIntegration};

use crate::db::{create_pool, init, run_migrations, spawn_writer, DbPool, WriteHandle};
use crate::integrations::IntegrationRepository;

/// A migrated database in a temporary directory. Keep the `TempDir` alive
/// for the duration of the test.
pub fn test_pool() -> (Arc<DbPool>, WriteHandle, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test.db");
    let db_path = init(db_path.to_str().expect("utf-8 path")).expect("init db");
    let pool = create_pool(&db_path).expect("pool");
    run_migrations(&pool).expect("migrations");
    let writer = spawn_writer((*pool).clone());
    (pool, writer, dir)
}

pub fn new_integration(name: &str) -> NewIntegration {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "base_url": "http://1c.local/hs/api",
    }))
    .expect("valid integration")
}

/// Inserts an integration so rows that reference it satisfy their foreign key.
pub async fn seed_integration(pool: &Arc<DbPool>, writer: &WriteHandle, name: &str) -> String {
    IntegrationRepository::new(pool.clone(), writer.clone())
        .create(new_integration(name))
        .await
        .expect("seed integration")
        .id
}
