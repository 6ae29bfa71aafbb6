//! SQLite-backed tracking store
//!
//! One connection guarded by a mutex; every call runs inside
//! `spawn_blocking` so the async workers never block on disk I/O. Download
//! workers touch disjoint rows, so serializing on the connection is the only
//! coordination needed.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{empty_status_counts, FilingStore, StatusUpdate};
use crate::app::models::{Company, Exchange, Filing, FilingKey};
use crate::app::status::ProcessingStatus;
use crate::errors::{StoreError, StoreResult};

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companies (
    exchange        TEXT NOT NULL,
    id              TEXT NOT NULL,
    stock_code      TEXT NOT NULL,
    company_name    TEXT NOT NULL,
    company_name_en TEXT,
    market_type     TEXT NOT NULL,
    name_language   TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (exchange, id)
);

CREATE TABLE IF NOT EXISTS filings (
    exchange          TEXT NOT NULL,
    source_id         TEXT NOT NULL,
    company_id        TEXT NOT NULL,
    filing_type       TEXT NOT NULL,
    filing_sub_type   TEXT,
    report_date       TEXT NOT NULL,
    title             TEXT NOT NULL,
    title_en          TEXT,
    source_url        TEXT NOT NULL,
    storage_key       TEXT,
    local_path        TEXT,
    file_extension    TEXT NOT NULL,
    language          TEXT NOT NULL,
    processing_status TEXT NOT NULL DEFAULT 'PENDING',
    processing_error  TEXT,
    content_md5       TEXT,
    ingested_at       TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    PRIMARY KEY (exchange, source_id)
);

CREATE INDEX IF NOT EXISTS idx_filings_status ON filings (processing_status);
CREATE INDEX IF NOT EXISTS idx_filings_company ON filings (exchange, company_id);
";

const FILING_COLUMNS: &str = "exchange, source_id, company_id, filing_type, filing_sub_type, \
    report_date, title, title_en, source_url, storage_key, local_path, file_extension, \
    language, processing_status, processing_error, content_md5, ingested_at, created_at, \
    updated_at";

/// SQLite tracking store
#[derive(Debug, Clone)]
pub struct SqliteFilingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFilingStore {
    /// Open or create a database file, applying the schema if needed
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable {
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get::<_, String>(0))?;

        Self::init_schema(&conn)?;
        info!("Opened tracking database at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a private in-memory database
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        let version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::Unavailable {
                reason: format!(
                    "database schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ),
            });
        }

        conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
        }
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Unavailable {
                reason: "connection lock poisoned".to_string(),
            })?;
            f(&guard).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }

    fn parse_column<T>(row: &Row, index: usize) -> rusqlite::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw: String = row.get(index)?;
        raw.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
    }

    fn row_to_company(row: &Row) -> rusqlite::Result<Company> {
        Ok(Company {
            exchange: Self::parse_column(row, 0)?,
            id: row.get(1)?,
            stock_code: row.get(2)?,
            company_name: row.get(3)?,
            company_name_en: row.get(4)?,
            market_type: Self::parse_column(row, 5)?,
            name_language: Self::parse_column(row, 6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_filing(row: &Row) -> rusqlite::Result<Filing> {
        Ok(Filing {
            exchange: Self::parse_column(row, 0)?,
            source_id: row.get(1)?,
            company_id: row.get(2)?,
            filing_type: row.get(3)?,
            filing_sub_type: row.get(4)?,
            report_date: row.get(5)?,
            title: row.get(6)?,
            title_en: row.get(7)?,
            source_url: row.get(8)?,
            storage_key: row.get(9)?,
            local_path: row.get(10)?,
            file_extension: row.get(11)?,
            language: Self::parse_column(row, 12)?,
            processing_status: Self::parse_column(row, 13)?,
            processing_error: row.get(14)?,
            content_md5: row.get(15)?,
            ingested_at: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

#[async_trait]
impl FilingStore for SqliteFilingStore {
    async fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(())
    }

    async fn get_company(&self, exchange: Exchange, id: &str) -> StoreResult<Option<Company>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT exchange, id, stock_code, company_name, company_name_en, market_type,
                        name_language, created_at, updated_at
                 FROM companies WHERE exchange = ?1 AND id = ?2",
                params![exchange.as_str(), id],
                Self::row_to_company,
            )
            .optional()
        })
        .await
    }

    async fn upsert_company(&self, company: &Company) -> StoreResult<()> {
        let company = company.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO companies (exchange, id, stock_code, company_name, company_name_en,
                                        market_type, name_language, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(exchange, id) DO UPDATE SET
                    company_name = excluded.company_name,
                    company_name_en = excluded.company_name_en,
                    updated_at = ?10",
                params![
                    company.exchange.as_str(),
                    company.id,
                    company.stock_code,
                    company.company_name,
                    company.company_name_en,
                    company.market_type.as_str(),
                    company.name_language.as_str(),
                    company.created_at,
                    company.updated_at,
                    Utc::now(),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn get_filing(&self, key: &FilingKey) -> StoreResult<Option<Filing>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM filings WHERE exchange = ?1 AND source_id = ?2",
                    FILING_COLUMNS
                ),
                params![key.exchange.as_str(), key.source_id],
                Self::row_to_filing,
            )
            .optional()
        })
        .await
    }

    async fn upsert_filing(&self, filing: &Filing) -> StoreResult<()> {
        let filing = filing.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO filings ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19)
                     ON CONFLICT(exchange, source_id) DO UPDATE SET
                        company_id = excluded.company_id,
                        filing_type = excluded.filing_type,
                        filing_sub_type = excluded.filing_sub_type,
                        report_date = excluded.report_date,
                        title = excluded.title,
                        title_en = excluded.title_en,
                        source_url = excluded.source_url,
                        file_extension = excluded.file_extension,
                        language = excluded.language,
                        updated_at = ?20",
                    FILING_COLUMNS
                ),
                params![
                    filing.exchange.as_str(),
                    filing.source_id,
                    filing.company_id,
                    filing.filing_type,
                    filing.filing_sub_type,
                    filing.report_date,
                    filing.title,
                    filing.title_en,
                    filing.source_url,
                    filing.storage_key,
                    filing.local_path,
                    filing.file_extension,
                    filing.language.as_str(),
                    filing.processing_status.as_str(),
                    filing.processing_error,
                    filing.content_md5,
                    filing.ingested_at,
                    filing.created_at,
                    filing.updated_at,
                    Utc::now(),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn update_status(&self, key: &FilingKey, update: &StatusUpdate) -> StoreResult<bool> {
        let key = key.clone();
        let update = update.clone();
        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE filings SET
                        processing_status = ?3,
                        processing_error = ?4,
                        storage_key = COALESCE(?5, storage_key),
                        local_path = COALESCE(?6, local_path),
                        content_md5 = COALESCE(?7, content_md5),
                        ingested_at = COALESCE(?8, ingested_at),
                        updated_at = ?9
                     WHERE exchange = ?1 AND source_id = ?2",
                    params![
                        key.exchange.as_str(),
                        key.source_id,
                        update.status.as_str(),
                        update.error,
                        update.storage_key,
                        update.local_path,
                        update.content_md5,
                        update.ingested_at,
                        Utc::now(),
                    ],
                )
            })
            .await?;
        Ok(changed > 0)
    }

    async fn count_by_status(&self) -> StoreResult<BTreeMap<ProcessingStatus, u64>> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT processing_status, COUNT(*) FROM filings GROUP BY processing_status",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((Self::parse_column::<ProcessingStatus>(row, 0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut counts = empty_status_counts();
        for (status, count) in rows {
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn filings_with_status(
        &self,
        status: ProcessingStatus,
        limit: usize,
    ) -> StoreResult<Vec<Filing>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM filings WHERE processing_status = ?1
                 ORDER BY report_date, source_id LIMIT ?2",
                FILING_COLUMNS
            ))?;
            let filings = stmt
                .query_map(params![status.as_str(), limit], Self::row_to_filing)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(filings)
        })
        .await
    }
}
