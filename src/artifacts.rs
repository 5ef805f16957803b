//! Artifact store for finished report CSVs
//!
//! Artifacts are addressed by report id. [`FsArtifactStore`] keeps them under
//! `{directory}/reports/{id}.csv` and hands out either a public URL (when a
//! base URL is configured) or a `file://` URL.

use crate::config::ArtifactConfig;
use crate::error::{Error, Result};
use crate::types::{CsvRecord, ReportId};
use async_trait::async_trait;
use std::path::PathBuf;

/// Header row of every report CSV
pub const CSV_HEADER: [&str; 4] = ["Field ID", "Token ID", "Transaction ID", "Explorer URL"];

/// Blob storage for report artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store the CSV for `id`, replacing any previous one, and return its URL
    async fn put_csv(&self, id: ReportId, bytes: Vec<u8>) -> Result<String>;

    /// Whether an artifact exists for `id`
    async fn exists(&self, id: ReportId) -> Result<bool>;

    /// Remove the artifact for `id`; a missing artifact is not an error
    async fn delete(&self, id: ReportId) -> Result<()>;
}

/// Filesystem-backed [`ArtifactStore`]
pub struct FsArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsArtifactStore {
    /// Store rooted at the configured directory
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            root: config.directory.join("reports"),
            public_base_url: config
                .public_base_url
                .as_ref()
                .map(|base| base.trim_end_matches('/').to_string()),
        }
    }

    fn file_name(id: ReportId) -> String {
        format!("{}.csv", id)
    }

    /// Path the artifact for `id` is written to
    pub fn path_for(&self, id: ReportId) -> PathBuf {
        self.root.join(Self::file_name(id))
    }

    fn url_for(&self, id: ReportId) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{}/reports/{}", base, Self::file_name(id)));
        }

        let absolute = std::path::absolute(self.path_for(id))?;
        url::Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| Error::Io(std::io::Error::other(format!(
                "cannot build a file URL for {}",
                absolute.display()
            ))))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put_csv(&self, id: ReportId, bytes: Vec<u8>) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.path_for(id);
        let tmp = path.with_extension("csv.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(report_id = %id, path = %path.display(), bytes = bytes.len(), "Artifact written");
        self.url_for(id)
    }

    async fn exists(&self, id: ReportId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(id)).await?)
    }

    async fn delete(&self, id: ReportId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serialize rows to CSV text with the fixed header
pub fn render_csv(records: &[CsvRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.write_record([
            record.field_id.as_str(),
            record.token_id.as_str(),
            record.tx_id.as_str(),
            record.explorer_url.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Parse CSV text produced by [`render_csv`]
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<CsvRecord>> {
    let mut reader = csv::Reader::from_reader(bytes);

    let headers = reader.headers()?;
    if headers.iter().ne(CSV_HEADER) {
        return Err(Error::validation(
            "csv",
            format!("unexpected header row: {:?}", headers),
        ));
    }

    reader
        .records()
        .map(|row| {
            let row = row?;
            let field = |i: usize| row.get(i).unwrap_or_default().to_string();
            Ok(CsvRecord {
                field_id: field(0),
                token_id: field(1),
                tx_id: field(2),
                explorer_url: field(3),
            })
        })
        .collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records() -> Vec<CsvRecord> {
        vec![
            CsvRecord {
                field_id: "F-1".into(),
                token_id: "nft-1".into(),
                tx_id: "abc".into(),
                explorer_url: "https://cardanoscan.io/transaction/abc".into(),
            },
            CsvRecord {
                field_id: "Field, \"North\"".into(),
                token_id: "nft-2".into(),
                tx_id: "Pending".into(),
                explorer_url: "N/A".into(),
            },
            CsvRecord::sentinel(),
        ]
    }

    fn store(dir: &TempDir, public_base_url: Option<&str>) -> FsArtifactStore {
        FsArtifactStore::new(&ArtifactConfig {
            directory: dir.path().to_path_buf(),
            public_base_url: public_base_url.map(str::to_string),
        })
    }

    #[test]
    fn test_csv_has_fixed_header_and_quotes() {
        let text = String::from_utf8(render_csv(&records()).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Field ID,Token ID,Transaction ID,Explorer URL")
        );
        assert_eq!(
            lines.next(),
            Some("F-1,nft-1,abc,https://cardanoscan.io/transaction/abc")
        );
        assert_eq!(lines.next(), Some("\"Field, \"\"North\"\"\",nft-2,Pending,N/A"));
        assert_eq!(lines.next(), Some("Error,Error,Error,N/A"));
    }

    #[test]
    fn test_parse_returns_rendered_values() {
        let parsed = parse_csv(&render_csv(&records()).unwrap()).unwrap();
        assert_eq!(parsed, records());
    }

    #[test]
    fn test_empty_report_is_header_only() {
        let bytes = render_csv(&[]).unwrap();
        assert_eq!(bytes, b"Field ID,Token ID,Transaction ID,Explorer URL\n");
        assert!(parse_csv(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_foreign_header() {
        assert!(parse_csv(b"a,b,c,d\n1,2,3,4\n").is_err());
    }

    #[tokio::test]
    async fn test_put_returns_public_url() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, Some("https://files.example.com/"));
        let id = ReportId::new();

        let url = store.put_csv(id, b"x".to_vec()).await.unwrap();

        assert_eq!(url, format!("https://files.example.com/reports/{}.csv", id));
        assert!(store.exists(id).await.unwrap());
        assert_eq!(
            std::fs::read(dir.path().join("reports").join(format!("{}.csv", id))).unwrap(),
            b"x"
        );
    }

    #[tokio::test]
    async fn test_put_without_public_base_returns_file_url() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, None);
        let id = ReportId::new();

        let url = store.put_csv(id, b"x".to_vec()).await.unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with(&format!("/reports/{}.csv", id)));
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, None);
        let id = ReportId::new();

        store.put_csv(id, b"old".to_vec()).await.unwrap();
        store.put_csv(id, b"new".to_vec()).await.unwrap();

        assert_eq!(std::fs::read(store.path_for(id)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, None);
        let id = ReportId::new();

        store.put_csv(id, b"x".to_vec()).await.unwrap();
        store.delete(id).await.unwrap();
        assert!(!store.exists(id).await.unwrap());

        store.delete(id).await.unwrap();
        store.delete(ReportId::new()).await.unwrap();
    }
}
