//! In-memory tracking store for tests and dry runs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{empty_status_counts, FilingStore, StatusUpdate};
use crate::app::models::{Company, Exchange, Filing, FilingKey};
use crate::app::status::ProcessingStatus;
use crate::errors::StoreResult;

/// Tracking store held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryFilingStore {
    companies: RwLock<HashMap<(Exchange, String), Company>>,
    filings: RwLock<HashMap<FilingKey, Filing>>,
}

impl MemoryFilingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn filing_count(&self) -> usize {
        self.filings.read().await.len()
    }

    pub async fn company_count(&self) -> usize {
        self.companies.read().await.len()
    }
}

#[async_trait]
impl FilingStore for MemoryFilingStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_company(&self, exchange: Exchange, id: &str) -> StoreResult<Option<Company>> {
        let companies = self.companies.read().await;
        Ok(companies.get(&(exchange, id.to_string())).cloned())
    }

    async fn upsert_company(&self, company: &Company) -> StoreResult<()> {
        let mut companies = self.companies.write().await;
        companies
            .entry((company.exchange, company.id.clone()))
            .and_modify(|existing| {
                existing.company_name = company.company_name.clone();
                existing.company_name_en = company.company_name_en.clone();
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| company.clone());
        Ok(())
    }

    async fn get_filing(&self, key: &FilingKey) -> StoreResult<Option<Filing>> {
        Ok(self.filings.read().await.get(key).cloned())
    }

    async fn upsert_filing(&self, filing: &Filing) -> StoreResult<()> {
        let mut filings = self.filings.write().await;
        filings
            .entry(filing.key())
            .and_modify(|existing| {
                existing.company_id = filing.company_id.clone();
                existing.filing_type = filing.filing_type.clone();
                existing.filing_sub_type = filing.filing_sub_type.clone();
                existing.report_date = filing.report_date;
                existing.title = filing.title.clone();
                existing.title_en = filing.title_en.clone();
                existing.source_url = filing.source_url.clone();
                existing.file_extension = filing.file_extension.clone();
                existing.language = filing.language;
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| filing.clone());
        Ok(())
    }

    async fn update_status(&self, key: &FilingKey, update: &StatusUpdate) -> StoreResult<bool> {
        let mut filings = self.filings.write().await;
        let Some(filing) = filings.get_mut(key) else {
            return Ok(false);
        };

        filing.processing_status = update.status;
        filing.processing_error = update.error.clone();
        if let Some(storage_key) = &update.storage_key {
            filing.storage_key = Some(storage_key.clone());
        }
        if let Some(local_path) = &update.local_path {
            filing.local_path = Some(local_path.clone());
        }
        if let Some(md5) = &update.content_md5 {
            filing.content_md5 = Some(md5.clone());
        }
        if let Some(ingested_at) = update.ingested_at {
            filing.ingested_at = Some(ingested_at);
        }
        filing.updated_at = Utc::now();
        Ok(true)
    }

    async fn count_by_status(&self) -> StoreResult<BTreeMap<ProcessingStatus, u64>> {
        let mut counts = empty_status_counts();
        for filing in self.filings.read().await.values() {
            *counts.entry(filing.processing_status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn filings_with_status(
        &self,
        status: ProcessingStatus,
        limit: usize,
    ) -> StoreResult<Vec<Filing>> {
        let filings = self.filings.read().await;
        let mut matching: Vec<Filing> = filings
            .values()
            .filter(|filing| filing.processing_status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.report_date
                .cmp(&b.report_date)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        matching.truncate(limit);
        Ok(matching)
    }
}
