//! Filing resolver
//!
//! Turns raw search rows into canonical [`Company`] and [`Filing`] records,
//! persists them, and emits a [`FilingDescriptor`] for every filing seen for
//! the first time. Filings already in the store are refreshed but never
//! re-emitted, so repeated scrapes of the same window produce no new work.
//!
//! Per-record problems (missing identifiers, store failures) are counted and
//! logged; they never abort the batch.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::models::{
    Company, Exchange, Filing, FilingDescriptor, FilingKey, Language, RawAnnouncement,
};
use crate::app::status::ProcessingStatus;
use crate::app::store::FilingStore;
use crate::errors::{ResolveError, StoreResult};

pub mod normalize;

use normalize::{
    absolute_url, clean_title, detect_language, file_extension, is_structured_product,
    market_type_for, parse_report_date, primary_stock_code, split_filing_type,
};

/// Counts and emitted work from one resolve call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    /// Raw rows seen
    pub total: usize,
    /// Filings created in the store
    pub new_filings: usize,
    /// Existing filings refreshed
    pub updated_filings: usize,
    /// Rows without a stock code or belonging to structured products
    pub skipped: usize,
    /// New filings persisted without a descriptor because of their extension
    pub unsupported: usize,
    /// Rows with missing identifiers or failed store calls
    pub errors: usize,
    /// Download work for new filings with supported extensions
    pub descriptors: Vec<FilingDescriptor>,
}

enum RecordOutcome {
    Skipped,
    Created(Option<FilingDescriptor>),
    Updated,
}

/// Resolves raw announcements against the tracking store
pub struct FilingResolver {
    store: Arc<dyn FilingStore>,
    exchange: Exchange,
}

impl FilingResolver {
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        Self {
            store,
            exchange: Exchange::Hkex,
        }
    }

    /// Resolve a batch of raw rows
    ///
    /// # Errors
    ///
    /// Fails only if the store cannot be reached before the batch starts.
    pub async fn resolve(&self, raw: Vec<RawAnnouncement>) -> StoreResult<ResolveReport> {
        self.store.ping().await?;

        let mut report = ResolveReport {
            total: raw.len(),
            ..Default::default()
        };

        for record in &raw {
            match self.resolve_one(record).await {
                Ok(RecordOutcome::Skipped) => report.skipped += 1,
                Ok(RecordOutcome::Created(Some(descriptor))) => {
                    report.new_filings += 1;
                    report.descriptors.push(descriptor);
                }
                Ok(RecordOutcome::Created(None)) => {
                    report.new_filings += 1;
                    report.unsupported += 1;
                }
                Ok(RecordOutcome::Updated) => report.updated_filings += 1,
                Err(e) => {
                    warn!(
                        "Failed to resolve announcement {}: {}",
                        record.news_id.as_deref().unwrap_or("<no id>"),
                        e
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            "Resolved {} announcements: {} new, {} updated, {} skipped, {} unsupported, {} errors",
            report.total,
            report.new_filings,
            report.updated_filings,
            report.skipped,
            report.unsupported,
            report.errors
        );
        Ok(report)
    }

    async fn resolve_one(&self, record: &RawAnnouncement) -> Result<RecordOutcome, ResolveError> {
        let Some(stock_code) = record.stock_code.as_deref().and_then(primary_stock_code) else {
            debug!("Skipping announcement without stock code");
            return Ok(RecordOutcome::Skipped);
        };
        if is_structured_product(&stock_code) {
            debug!("Skipping structured product {}", stock_code);
            return Ok(RecordOutcome::Skipped);
        }

        let source_id = record
            .news_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ResolveError::MissingField { field: "NEWS_ID" })?;
        let file_link = record
            .file_link
            .as_deref()
            .map(str::trim)
            .filter(|link| !link.is_empty())
            .ok_or(ResolveError::MissingField { field: "FILE_LINK" })?;
        let source_url =
            absolute_url(file_link).ok_or(ResolveError::MissingField { field: "FILE_LINK" })?;

        self.upsert_company(&stock_code, record.stock_name.as_deref())
            .await?;

        let key = FilingKey::new(self.exchange, source_id);
        let title = clean_title(record.title.as_deref().unwrap_or_default());
        let language = detect_language(&title);
        let title_en = (language == Language::En && !title.is_empty()).then(|| title.clone());
        let (filing_type, filing_sub_type) =
            split_filing_type(record.long_text.as_deref(), record.short_text.as_deref());

        if let Some(mut existing) = self.store.get_filing(&key).await? {
            existing.title = title;
            existing.title_en = title_en;
            existing.language = language;
            existing.source_url = source_url;
            existing.filing_type = filing_type;
            existing.filing_sub_type = filing_sub_type;
            self.store.upsert_filing(&existing).await?;
            return Ok(RecordOutcome::Updated);
        }

        let report_date = match record.date_time.as_deref().and_then(parse_report_date) {
            Some(date) => date,
            None => {
                warn!(
                    "Unparseable date {:?} on {}, using current time",
                    record.date_time, key
                );
                Utc::now()
            }
        };

        let now = Utc::now();
        let filing = Filing {
            exchange: self.exchange,
            source_id: key.source_id.clone(),
            company_id: stock_code,
            filing_type,
            filing_sub_type,
            report_date,
            title,
            title_en,
            source_url,
            storage_key: None,
            local_path: None,
            file_extension: file_extension(file_link, record.file_type.as_deref()),
            language,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            content_md5: None,
            ingested_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_filing(&filing).await?;

        let descriptor = filing.descriptor();
        if descriptor.is_supported() {
            Ok(RecordOutcome::Created(Some(descriptor)))
        } else {
            debug!(
                "Filing {} has unsupported extension {:?}",
                key, filing.file_extension
            );
            Ok(RecordOutcome::Created(None))
        }
    }

    async fn upsert_company(
        &self,
        stock_code: &str,
        stock_name: Option<&str>,
    ) -> Result<(), ResolveError> {
        let name = stock_name.map(clean_title).unwrap_or_default();
        let name_language = detect_language(&name);
        let name_en = (name_language == Language::En && !name.is_empty()).then(|| name.clone());

        let company = match self.store.get_company(self.exchange, stock_code).await? {
            Some(mut existing) => {
                if !name.is_empty() {
                    existing.company_name = name;
                    existing.company_name_en = name_en;
                }
                existing
            }
            None => {
                let now = Utc::now();
                Company {
                    id: stock_code.to_string(),
                    exchange: self.exchange,
                    stock_code: stock_code.to_string(),
                    company_name: name,
                    company_name_en: name_en,
                    market_type: market_type_for(stock_code),
                    name_language,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        self.store.upsert_company(&company).await?;
        Ok(())
    }
}
