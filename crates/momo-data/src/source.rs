//! Dataset refresh collaborator.
//!
//! `HttpCsvSource` downloads the MoMo CSV, keeps the last good download on
//! disk and decodes it. Any source can be plugged in behind `DatasetSource`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use momo_core::DatasetRecord;
use momo_core::error::{MomoError, Result};

use crate::decode::decode_csv;

/// Produces a fresh collection of dataset rows.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Fetch and decode the latest dataset. Must be bounded by a timeout.
    async fn fetch(&self) -> Result<Vec<DatasetRecord>>;

    /// Rows from a local cache, used at startup before the first fetch.
    async fn load_cached(&self) -> Result<Option<Vec<DatasetRecord>>> {
        Ok(None)
    }
}

/// HTTP CSV source with an on-disk cache of the last download.
pub struct HttpCsvSource {
    client: reqwest::Client,
    url: String,
    cache_file: PathBuf,
    timeout: Duration,
}

impl HttpCsvSource {
    pub fn new(url: &str, cache_file: &Path, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            cache_file: cache_file.to_path_buf(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MomoError::Refresh(format!("Download failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(MomoError::Refresh(format!("Download HTTP {}", resp.status())));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| MomoError::Refresh(format!("Download body: {e}")))?;
        Ok(body.to_vec())
    }

    /// Write to a sibling temp file, then rename over the cache.
    async fn write_cache(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.cache_file.with_extension("csv.part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.cache_file).await?;
        tracing::debug!("💾 Cached dataset at {}", self.cache_file.display());
        Ok(())
    }
}

#[async_trait]
impl DatasetSource for HttpCsvSource {
    async fn fetch(&self) -> Result<Vec<DatasetRecord>> {
        tracing::info!("⬇️ Downloading dataset from {}", self.url);
        let bytes = self.download().await?;
        let report = decode_csv(bytes.as_slice())?;
        if report.skipped > 0 {
            tracing::debug!("Skipped {} unusable dataset rows", report.skipped);
        }
        if report.rows.is_empty() {
            return Err(MomoError::Refresh("downloaded dataset has no usable rows".into()));
        }
        // Only a decodable download replaces the cache.
        if let Err(e) = self.write_cache(&bytes).await {
            tracing::warn!("⚠️ Failed to write dataset cache: {e}");
        }
        Ok(report.rows)
    }

    async fn load_cached(&self) -> Result<Option<Vec<DatasetRecord>>> {
        if !self.cache_file.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&self.cache_file).await?;
        if bytes.is_empty() {
            tracing::warn!("⚠️ {} exists but is empty", self.cache_file.display());
            return Ok(None);
        }
        let report = decode_csv(bytes.as_slice())?;
        Ok((!report.rows.is_empty()).then_some(report.rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "ambito,nombre_ambito,cod_sexo,cod_gedad,fecha_defuncion,defunciones_observadas,defunciones_esperadas\n\
                       nacional,,all,all,2024-01-10,1200,1100\n";

    #[tokio::test]
    async fn test_load_cached_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = HttpCsvSource::new("http://127.0.0.1:9/none", &dir.path().join("momo.csv"), 1);
        assert!(src.load_cached().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_cached_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("momo.csv");
        let src = HttpCsvSource::new("http://127.0.0.1:9/none", &path, 1);
        src.write_cache(CSV.as_bytes()).await.unwrap();
        let rows = src.load_cached().await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].observed, Some(1200));
    }

    #[tokio::test]
    async fn test_empty_cache_file_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("momo.csv");
        std::fs::write(&path, "").unwrap();
        let src = HttpCsvSource::new("http://127.0.0.1:9/none", &path, 1);
        assert!(src.load_cached().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_refresh_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = HttpCsvSource::new("http://127.0.0.1:9/none", &dir.path().join("momo.csv"), 1);
        assert!(matches!(src.fetch().await, Err(MomoError::Refresh(_))));
    }
}
