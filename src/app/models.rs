//! Data models for Filing Fetcher
//!
//! This module defines the core data structures shared by the search client,
//! resolver, download engine and tracking store: exchange namespaces, the
//! ephemeral [`FilingDescriptor`] handed to the engine, and the persisted
//! [`Company`] and [`Filing`] records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::app::status::ProcessingStatus;
use crate::constants::files;

/// Unknown value for one of the string-backed enums
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Exchange namespace a filing belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// Hong Kong Exchanges and Clearing
    Hkex,
    /// Korean DART disclosure system
    Dart,
    /// US SEC EDGAR
    Sec,
}

impl Exchange {
    /// Upper-case wire name (`HKEX`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hkex => "HKEX",
            Self::Dart => "DART",
            Self::Sec => "SEC",
        }
    }

    /// Lower-case prefix used in object keys (`hkex`)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Hkex => "hkex",
            Self::Dart => "dart",
            Self::Sec => "sec",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HKEX" => Ok(Self::Hkex),
            "DART" => Ok(Self::Dart),
            "SEC" => Ok(Self::Sec),
            _ => Err(ParseEnumError::new("exchange", s)),
        }
    }
}

/// Market queried on the HKEX search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    /// Main board
    #[default]
    Sehk,
    /// Growth Enterprise Market
    Gem,
}

impl Market {
    /// Value of the `market` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Sehk => "SEHK",
            Self::Gem => "GEM",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for Market {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SEHK" | "MAIN" | "MAIN_BOARD" => Ok(Self::Sehk),
            "GEM" => Ok(Self::Gem),
            _ => Err(ParseEnumError::new("market", s)),
        }
    }
}

/// Listing submarket of a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketType {
    MainBoard,
    Gem,
    Other,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainBoard => "MAIN_BOARD",
            Self::Gem => "GEM",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN_BOARD" => Ok(Self::MainBoard),
            "GEM" => Ok(Self::Gem),
            "OTHER" => Ok(Self::Other),
            _ => Err(ParseEnumError::new("market type", s)),
        }
    }
}

/// Dominant script of a title or company name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    Zh,
    Mixed,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "EN",
            Self::Zh => "ZH",
            Self::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EN" => Ok(Self::En),
            "ZH" => Ok(Self::Zh),
            "MIXED" => Ok(Self::Mixed),
            _ => Err(ParseEnumError::new("language", s)),
        }
    }
}

/// Composite identity of a filing: unique source id within an exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilingKey {
    pub exchange: Exchange,
    pub source_id: String,
}

impl FilingKey {
    pub fn new(exchange: Exchange, source_id: impl Into<String>) -> Self {
        Self {
            exchange,
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for FilingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.source_id)
    }
}

/// Check whether the download engine will fetch files with this extension
pub fn is_supported_extension(extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    files::SUPPORTED_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(extension))
}

/// Build the deterministic object key for a filing
///
/// The layout is `{exchange_lower}/{company_id}/{YYYY}/{MM}/{DD}/{source_id}.{ext}`
/// using the UTC report date, so the key can always be rebuilt from the
/// persisted record alone.
pub fn storage_key(
    exchange: Exchange,
    company_id: &str,
    report_date: &DateTime<Utc>,
    source_id: &str,
    file_extension: &str,
) -> String {
    format!(
        "{}/{}/{:04}/{:02}/{:02}/{}.{}",
        exchange.key_prefix(),
        company_id,
        report_date.year(),
        report_date.month(),
        report_date.day(),
        source_id,
        file_extension.trim_start_matches('.').to_ascii_lowercase()
    )
}

/// Work item handed from the resolver to the download engine
///
/// Descriptors are immutable once built; fields are exposed through
/// accessors only. Serialized as one line of a JSON-lines manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingDescriptor {
    source_id: String,
    source_url: String,
    company_id: String,
    file_extension: String,
    exchange: Exchange,
    report_date: DateTime<Utc>,
}

impl FilingDescriptor {
    pub fn new(
        exchange: Exchange,
        source_id: impl Into<String>,
        source_url: impl Into<String>,
        company_id: impl Into<String>,
        file_extension: impl Into<String>,
        report_date: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_url: source_url.into(),
            company_id: company_id.into(),
            file_extension: file_extension.into().to_ascii_lowercase(),
            exchange,
            report_date,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn report_date(&self) -> DateTime<Utc> {
        self.report_date
    }

    /// Composite `(exchange, source_id)` key
    pub fn filing_key(&self) -> FilingKey {
        FilingKey::new(self.exchange, self.source_id.clone())
    }

    /// Deterministic object storage key
    pub fn storage_key(&self) -> String {
        storage_key(
            self.exchange,
            &self.company_id,
            &self.report_date,
            &self.source_id,
            &self.file_extension,
        )
    }

    pub fn is_supported(&self) -> bool {
        is_supported_extension(&self.file_extension)
    }
}

/// Listed company, scoped per exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub exchange: Exchange,
    pub stock_code: String,
    pub company_name: String,
    pub company_name_en: Option<String>,
    pub market_type: MarketType,
    /// Display-only script of `company_name`
    pub name_language: Language,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted filing record keyed by `(exchange, source_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    pub exchange: Exchange,
    pub source_id: String,
    pub company_id: String,
    pub filing_type: String,
    pub filing_sub_type: Option<String>,
    pub report_date: DateTime<Utc>,
    pub title: String,
    pub title_en: Option<String>,
    pub source_url: String,
    /// Object key of the stored document once downloaded
    pub storage_key: Option<String>,
    pub local_path: Option<String>,
    pub file_extension: String,
    pub language: Language,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub content_md5: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Filing {
    /// Minimal pending record for a descriptor that has no stored filing yet
    ///
    /// Used when download results arrive for filings that were loaded from a
    /// manifest rather than resolved into this store.
    pub fn from_descriptor(descriptor: &FilingDescriptor) -> Self {
        let now = Utc::now();
        Self {
            exchange: descriptor.exchange(),
            source_id: descriptor.source_id().to_string(),
            company_id: descriptor.company_id().to_string(),
            filing_type: "UNKNOWN".to_string(),
            filing_sub_type: None,
            report_date: descriptor.report_date(),
            title: String::new(),
            title_en: None,
            source_url: descriptor.source_url().to_string(),
            storage_key: None,
            local_path: None,
            file_extension: descriptor.file_extension().to_string(),
            language: Language::Mixed,
            processing_status: ProcessingStatus::Pending,
            processing_error: None,
            content_md5: None,
            ingested_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> FilingKey {
        FilingKey::new(self.exchange, self.source_id.clone())
    }

    /// Deterministic object key, identical to the descriptor's
    pub fn storage_key(&self) -> String {
        storage_key(
            self.exchange,
            &self.company_id,
            &self.report_date,
            &self.source_id,
            &self.file_extension,
        )
    }

    /// Descriptor for re-downloading this filing
    pub fn descriptor(&self) -> FilingDescriptor {
        FilingDescriptor::new(
            self.exchange,
            self.source_id.clone(),
            self.source_url.clone(),
            self.company_id.clone(),
            self.file_extension.clone(),
            self.report_date,
        )
    }
}

/// One row of the HKEX title search response
///
/// Field names follow the upstream JSON. Numeric fields arrive as either
/// strings or numbers depending on the endpoint version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnnouncement {
    #[serde(rename = "NEWS_ID", default, deserialize_with = "string_or_number")]
    pub news_id: Option<String>,
    #[serde(rename = "STOCK_CODE", default)]
    pub stock_code: Option<String>,
    #[serde(rename = "STOCK_NAME", default)]
    pub stock_name: Option<String>,
    #[serde(rename = "TITLE", default)]
    pub title: Option<String>,
    #[serde(rename = "FILE_TYPE", default)]
    pub file_type: Option<String>,
    #[serde(rename = "FILE_INFO", default)]
    pub file_info: Option<String>,
    #[serde(rename = "FILE_LINK", default)]
    pub file_link: Option<String>,
    #[serde(rename = "DATE_TIME", default)]
    pub date_time: Option<String>,
    #[serde(rename = "LONG_TEXT", default)]
    pub long_text: Option<String>,
    #[serde(rename = "SHORT_TEXT", default)]
    pub short_text: Option<String>,
    #[serde(rename = "TOTAL_COUNT", default, deserialize_with = "string_or_number")]
    pub total_count: Option<String>,
}

impl RawAnnouncement {
    /// Advisory total row count carried on the first row of a page
    pub fn advisory_total(&self) -> Option<u64> {
        self.total_count
            .as_deref()
            .and_then(|count| count.trim().parse().ok())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
