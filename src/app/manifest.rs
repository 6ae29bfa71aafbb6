//! JSON-lines descriptor manifests
//!
//! A manifest hands resolved descriptors from `scrape` to a later `download`
//! run. One descriptor per line; reading tolerates bad lines, writing is
//! atomic.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::app::models::FilingDescriptor;
use crate::constants::files::TEMP_FILE_SUFFIX;
use crate::errors::{ManifestError, ManifestResult};

/// Descriptors read from a manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestLoad {
    pub descriptors: Vec<FilingDescriptor>,
    /// Lines that could not be parsed and were skipped
    pub malformed: usize,
}

/// Read a JSON-lines manifest
///
/// Blank lines are ignored. Malformed lines are logged with their line
/// number and counted; a missing file is an error.
pub async fn read_manifest(path: impl AsRef<Path>) -> ManifestResult<ManifestLoad> {
    let path = path.as_ref();
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ManifestError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    // Raw bytes so a line with invalid UTF-8 is skipped like any other bad line
    let mut lines = BufReader::new(file).split(b'\n');
    let mut load = ManifestLoad::default();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_segment().await? {
        line_number += 1;
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_slice::<FilingDescriptor>(line) {
            Ok(descriptor) => load.descriptors.push(descriptor),
            Err(e) => {
                warn!(
                    "Skipping malformed manifest line {} in {}: {}",
                    line_number,
                    path.display(),
                    e
                );
                load.malformed += 1;
            }
        }
    }

    info!(
        "Loaded {} descriptors from {} ({} malformed lines)",
        load.descriptors.len(),
        path.display(),
        load.malformed
    );
    Ok(load)
}

/// Write descriptors as JSON lines, replacing `path` atomically
pub async fn write_manifest(
    path: impl AsRef<Path>,
    descriptors: &[FilingDescriptor],
) -> ManifestResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut buffer = Vec::with_capacity(descriptors.len() * 256);
    for descriptor in descriptors {
        serde_json::to_writer(&mut buffer, descriptor)?;
        buffer.push(b'\n');
    }

    let temp_path = temp_path_for(path);
    let written = async {
        let mut file = File::create(&temp_path).await?;
        file.write_all(&buffer).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    debug!("Wrote {} descriptors to {}", descriptors.len(), path.display());
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::Exchange;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn descriptor(id: &str) -> FilingDescriptor {
        FilingDescriptor::new(
            Exchange::Hkex,
            id,
            format!("https://www1.hkexnews.hk/{}.pdf", id),
            "00700",
            "pdf",
            Utc.with_ymd_and_hms(2024, 3, 15, 1, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_written_manifest_reads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/manifest.jsonl");
        let descriptors = vec![descriptor("1"), descriptor("2")];

        write_manifest(&path, &descriptors).await.unwrap();
        let load = read_manifest(&path).await.unwrap();

        assert_eq!(load.descriptors, descriptors);
        assert_eq!(load.malformed, 0);
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_line_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.jsonl");
        write_manifest(&path, &[descriptor("42")]).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["source_id"], "42");
        assert_eq!(value["exchange"], "HKEX");
        assert_eq!(value["file_extension"], "pdf");
        assert_eq!(value["report_date"], "2024-03-15T01:30:00Z");
    }

    #[tokio::test]
    async fn test_malformed_and_blank_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.jsonl");
        let good = serde_json::to_string(&descriptor("7")).unwrap();
        std::fs::write(&path, format!("{}\n\n{{not json}}\n{{\"source_id\":\"x\"}}\n", good)).unwrap();

        let load = read_manifest(&path).await.unwrap();
        assert_eq!(load.descriptors.len(), 1);
        assert_eq!(load.descriptors[0].source_id(), "7");
        assert_eq!(load.malformed, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.jsonl");
        let mut bytes = serde_json::to_vec(&descriptor("1")).unwrap();
        bytes.extend_from_slice(b"\n\xff\xfe garbage\r\n");
        bytes.extend_from_slice(&serde_json::to_vec(&descriptor("2")).unwrap());
        std::fs::write(&path, bytes).unwrap();

        let load = read_manifest(&path).await.unwrap();
        let ids: Vec<_> = load.descriptors.iter().map(|d| d.source_id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(load.malformed, 1);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = read_manifest(temp.path().join("absent.jsonl"))
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
    }
}
