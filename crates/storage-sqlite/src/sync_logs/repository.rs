//! Repository for sync run logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::str::FromStr;
use std::sync::Arc;

use tradeos_core::errors::{DatabaseError, Error, Result, ValidationError};
use tradeos_core::sync::{SyncLog, SyncLogFilter, SyncLogRepositoryTrait, SyncLogStatus};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_logs;
use crate::utils::format_ts;

use super::model::SyncLogDB;

pub struct SyncLogRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncLogRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn to_domain(rows: Vec<SyncLogDB>) -> Result<Vec<SyncLog>> {
    rows.into_iter()
        .map(|row| SyncLog::try_from(row).map_err(Error::from))
        .collect()
}

#[async_trait]
impl SyncLogRepositoryTrait for SyncLogRepository {
    async fn create(&self, log: SyncLog) -> Result<SyncLog> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_logs::table)
                    .values(SyncLogDB::from(&log))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(log)
            })
            .await
    }

    async fn finalize(&self, log: SyncLog) -> Result<SyncLog> {
        self.writer
            .exec(move |conn| {
                let stored = sync_logs::table
                    .find(&log.id)
                    .select(sync_logs::status)
                    .first::<String>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                    .ok_or_else(|| {
                        Error::Database(DatabaseError::NotFound(format!(
                            "Sync log {} not found",
                            log.id
                        )))
                    })?;
                if SyncLogStatus::from_str(&stored)?.is_final() {
                    return Err(Error::Validation(ValidationError::InvalidInput(format!(
                        "Sync log {} is already {}",
                        log.id, stored
                    ))));
                }

                let row = SyncLogDB::from(&log);
                diesel::update(sync_logs::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(log)
            })
            .await
    }

    async fn delete_finalized_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_ts(cutoff);
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    sync_logs::table
                        .filter(sync_logs::started_at.lt(&cutoff))
                        .filter(sync_logs::status.eq_any([
                            SyncLogStatus::Completed.as_str(),
                            SyncLogStatus::Failed.as_str(),
                        ])),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(deleted)
            })
            .await
    }

    fn get_by_id(&self, id: &str) -> Result<SyncLog> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_logs::table
            .find(id)
            .first::<SyncLogDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .ok_or_else(|| {
                Error::Database(DatabaseError::NotFound(format!("Sync log {} not found", id)))
            })?;
        Ok(SyncLog::try_from(row)?)
    }

    fn list_for_integration(
        &self,
        integration_id: &str,
        filter: &SyncLogFilter,
    ) -> Result<Vec<SyncLog>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = sync_logs::table
            .filter(sync_logs::integration_id.eq(integration_id))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(sync_logs::status.eq(status.as_str()));
        }
        if let Some(entity) = filter.entity_type {
            query = query.filter(sync_logs::entity_type.eq(entity.as_str()));
        }

        let rows = query
            .order((sync_logs::started_at.desc(), sync_logs::id.desc()))
            .offset(filter.skip.max(0))
            .limit(filter.limit.max(0))
            .load::<SyncLogDB>(&mut conn)
            .map_err(StorageError::from)?;
        to_domain(rows)
    }

    fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<SyncLog>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_logs::table
            .filter(sync_logs::started_at.ge(format_ts(since)))
            .order(sync_logs::started_at.desc())
            .load::<SyncLogDB>(&mut conn)
            .map_err(StorageError::from)?;
        to_domain(rows)
    }
}
