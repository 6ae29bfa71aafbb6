//! Pure normalization helpers for HKEX announcement rows

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use url::Url;

use crate::app::models::{Language, MarketType};
use crate::constants::hkex;

/// First stock code of a possibly multi-code field, trimmed
pub fn primary_stock_code(raw: &str) -> Option<String> {
    let first = raw.split(hkex::STOCK_CODE_SEPARATOR).next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// Numeric codes inside the structured-product bands (warrants, CBBCs)
///
/// Non-numeric codes are never structured products.
pub fn is_structured_product(stock_code: &str) -> bool {
    stock_code.trim().parse::<u32>().is_ok_and(|code| {
        hkex::STRUCTURED_PRODUCT_RANGES
            .iter()
            .any(|&(low, high)| (low..=high).contains(&code))
    })
}

/// Listing submarket implied by an HKEX stock code
pub fn market_type_for(stock_code: &str) -> MarketType {
    match stock_code.trim().parse::<u32>() {
        Ok(code) if (8000..=8999).contains(&code) => MarketType::Gem,
        Ok(_) => MarketType::MainBoard,
        Err(_) => MarketType::Other,
    }
}

/// Parse `DD/MM/YYYY HH:MM` or `DD/MM/YYYY` as Hong Kong time
pub fn parse_report_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let local = NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%d/%m/%Y")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    let offset = FixedOffset::east_opt(hkex::UTC_OFFSET_SECS)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF
    )
}

/// Dominant script of `text` by the share of CJK among letters
///
/// Above 0.7 is `ZH`, below 0.3 is `EN`, anything between is `MIXED`. Text
/// without letters counts as `EN`.
pub fn detect_language(text: &str) -> Language {
    let (cjk, letters) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(cjk, letters), c| {
            (cjk + usize::from(is_cjk(c)), letters + 1)
        });

    if letters == 0 {
        return Language::En;
    }

    let ratio = cjk as f64 / letters as f64;
    if ratio > 0.7 {
        Language::Zh
    } else if ratio < 0.3 {
        Language::En
    } else {
        Language::Mixed
    }
}

/// Split `Category - [Sub Category]` headline text into type and sub-type
///
/// Falls back to `short_text`, then `UNKNOWN`.
pub fn split_filing_type(
    long_text: Option<&str>,
    short_text: Option<&str>,
) -> (String, Option<String>) {
    let first_line = |text: &str| {
        text.split(hkex::STOCK_CODE_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    if let Some(long) = long_text.map(first_line).filter(|t| !t.is_empty()) {
        if let Some((kind, rest)) = long.split_once(" - [") {
            let sub = rest.trim_end_matches(']').trim();
            let sub = (!sub.is_empty()).then(|| sub.to_string());
            return (kind.trim().to_string(), sub);
        }
        return (long, None);
    }

    match short_text.map(first_line).filter(|t| !t.is_empty()) {
        Some(short) => (short, None),
        None => ("UNKNOWN".to_string(), None),
    }
}

/// Lower-case document extension from the link path, else from `FILE_TYPE`
pub fn file_extension(file_link: &str, file_type: Option<&str>) -> String {
    let path = file_link.split(['?', '#']).next().unwrap_or_default();
    let from_link = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_link
        .or_else(|| file_type.map(|t| t.trim().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Resolve a site-relative document link against the HKEX host
pub fn absolute_url(file_link: &str) -> Option<String> {
    let link = file_link.trim();
    if link.is_empty() {
        return None;
    }
    let base = Url::parse(hkex::BASE_URL).ok()?;
    base.join(link).ok().map(String::from)
}

/// Decode the HTML entities HKEX leaves in titles and collapse whitespace
pub fn clean_title(raw: &str) -> String {
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_primary_stock_code() {
        assert_eq!(primary_stock_code("00700"), Some("00700".to_string()));
        assert_eq!(
            primary_stock_code(" 00005<br/>00006<br/>"),
            Some("00005".to_string())
        );
        assert_eq!(primary_stock_code("  "), None);
        assert_eq!(primary_stock_code("<br/>00005"), None);
    }

    #[test]
    fn test_structured_product_bands() {
        assert!(is_structured_product("12345"));
        assert!(is_structured_product("10000"));
        assert!(is_structured_product("29999"));
        assert!(is_structured_product("65432"));
        assert!(is_structured_product("85000"));
        assert!(!is_structured_product("00700"));
        assert!(!is_structured_product("09999"));
        assert!(!is_structured_product("30000"));
        assert!(!is_structured_product("70000"));
        assert!(!is_structured_product("ABC12"));
    }

    #[test]
    fn test_market_type() {
        assert_eq!(market_type_for("08001"), MarketType::Gem);
        assert_eq!(market_type_for("00700"), MarketType::MainBoard);
        assert_eq!(market_type_for("N/A"), MarketType::Other);
    }

    #[test]
    fn test_report_date_is_hong_kong_time() {
        let dt = parse_report_date("15/03/2024 09:30").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-15T01:30:00+00:00");

        let date_only = parse_report_date("01/02/2024").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2024-01-31T16:00:00+00:00");
        assert_eq!(date_only.hour(), 16);

        assert!(parse_report_date("2024-03-15").is_none());
        assert!(parse_report_date("").is_none());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("Annual Results Announcement"), Language::En);
        assert_eq!(detect_language("騰訊控股有限公司"), Language::Zh);
        assert_eq!(detect_language("騰訊控股 Tencent"), Language::Mixed);
        assert_eq!(detect_language("2024"), Language::En);
    }

    #[test]
    fn test_split_filing_type() {
        assert_eq!(
            split_filing_type(
                Some("Announcements and Notices - [Other - Business Update]"),
                Some("Announcements and Notices")
            ),
            (
                "Announcements and Notices".to_string(),
                Some("Other - Business Update".to_string())
            )
        );
        assert_eq!(
            split_filing_type(Some("Circulars"), None),
            ("Circulars".to_string(), None)
        );
        assert_eq!(
            split_filing_type(Some(""), Some("Monthly Returns")),
            ("Monthly Returns".to_string(), None)
        );
        assert_eq!(split_filing_type(None, None), ("UNKNOWN".to_string(), None));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(
            file_extension("/listedco/listconews/sehk/2024/0315/2024031500123.pdf", None),
            "pdf"
        );
        assert_eq!(file_extension("/doc/ltn20240315.HTM?x=1", None), "htm");
        assert_eq!(file_extension("/doc/servlet", Some("XLS")), "xls");
        assert_eq!(file_extension("", None), "");
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("/listedco/listconews/sehk/2024/0315/1.pdf").as_deref(),
            Some("https://www1.hkexnews.hk/listedco/listconews/sehk/2024/0315/1.pdf")
        );
        assert_eq!(
            absolute_url("https://example.com/a.pdf").as_deref(),
            Some("https://example.com/a.pdf")
        );
        assert_eq!(absolute_url(" "), None);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(
            clean_title("  Results &amp; Dividend\n Announcement "),
            "Results & Dividend Announcement"
        );
    }
}
