//! Repository for integration persistence.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use tradeos_core::errors::{DatabaseError, Error, Result};
use tradeos_core::integrations::{
    Integration, IntegrationOutcome, IntegrationRepositoryTrait, IntegrationUpdate,
    NewIntegration,
};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::integrations;

use super::model::IntegrationDB;

pub struct IntegrationRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl IntegrationRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn load(conn: &mut SqliteConnection, integration_id: &str) -> Result<Integration> {
    let row = integrations::table
        .find(integration_id)
        .first::<IntegrationDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "Integration {} not found",
                integration_id
            )))
        })?;
    Ok(Integration::try_from(row)?)
}

fn save(conn: &mut SqliteConnection, integration: &Integration) -> Result<()> {
    let row = IntegrationDB::try_from(integration)?;
    diesel::update(integrations::table.find(&row.id))
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

#[async_trait]
impl IntegrationRepositoryTrait for IntegrationRepository {
    async fn create(&self, new_integration: NewIntegration) -> Result<Integration> {
        self.writer
            .exec(move |conn| {
                let integration = Integration::from_new(new_integration, Utc::now());
                let row = IntegrationDB::try_from(&integration)?;
                diesel::insert_into(integrations::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(integration)
            })
            .await
    }

    async fn update(&self, integration_id: &str, update: IntegrationUpdate) -> Result<Integration> {
        let integration_id = integration_id.to_string();
        self.writer
            .exec(move |conn| {
                let mut integration = load(conn, &integration_id)?;
                update.apply_to(&mut integration, Utc::now());
                save(conn, &integration)?;
                Ok(integration)
            })
            .await
    }

    async fn record_outcome(
        &self,
        integration_id: &str,
        outcome: IntegrationOutcome,
    ) -> Result<Integration> {
        let integration_id = integration_id.to_string();
        self.writer
            .exec(move |conn| {
                let mut integration = load(conn, &integration_id)?;
                integration.apply(&outcome);
                save(conn, &integration)?;
                Ok(integration)
            })
            .await
    }

    fn get_by_id(&self, integration_id: &str) -> Result<Integration> {
        let mut conn = get_connection(&self.pool)?;
        load(&mut conn, integration_id)
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Integration>> {
        let mut conn = get_connection(&self.pool)?;
        let row = integrations::table
            .filter(integrations::name.eq(name.trim()))
            .first::<IntegrationDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(Integration::try_from).transpose()?)
    }

    fn list(
        &self,
        is_enabled: Option<bool>,
        integration_type: Option<&str>,
    ) -> Result<Vec<Integration>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = integrations::table.into_boxed();
        if let Some(enabled) = is_enabled {
            query = query.filter(integrations::is_enabled.eq(enabled));
        }
        if let Some(kind) = integration_type {
            query = query.filter(integrations::integration_type.eq(kind));
        }

        let rows = query
            .order(integrations::name.asc())
            .load::<IntegrationDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| Integration::try_from(row).map_err(Error::from))
            .collect()
    }
}
