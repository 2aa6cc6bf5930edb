//! Amazon customization archive download and unpacking.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use printline_core::DataSource;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;
use zip::ZipArchive;

use super::manifest::{CustomizationData, parse_manifest};
use super::{FILE_ANNOTATION, Miss, Resolved, apply_sku_text_rule};
use crate::models::LineItem;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors reading a customization archive.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("download failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("download returned HTTP {0}")]
    Http(u16),

    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("no .json entry in archive")]
    NoJsonEntry,

    #[error("could not read archive entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Downloads archive bytes.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError>;
}

/// [`ArchiveFetcher`] over HTTP with a 10 second timeout.
#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    /// # Errors
    ///
    /// Returns `ResolveError::Fetch` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Http(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Resolves line items from their `CustomizedURL` archive.
#[derive(Clone)]
pub struct CustomizationFileResolver {
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl CustomizationFileResolver {
    #[must_use]
    pub fn new(fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        Self { fetcher }
    }

    /// Download and parse the archive at `url`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if the download fails, the body is not a zip,
    /// no JSON entry exists or the entry is not valid JSON.
    pub async fn try_resolve(&self, url: &str) -> Result<CustomizationData, ResolveError> {
        let bytes = self.fetcher.fetch(url).await?;
        let manifest = read_manifest(&bytes)?;
        let data = parse_manifest(&manifest);
        if data.is_empty() {
            tracing::warn!(url, "Customization file yielded no text or colors");
        } else {
            tracing::info!(
                url,
                text = data.custom_text.as_deref(),
                color_1 = data.color_1.as_deref(),
                color_2 = data.color_2.as_deref(),
                "Extracted customization"
            );
        }
        Ok(data)
    }

    /// Like [`Self::try_resolve`], but logs failures and returns `None`.
    pub async fn resolve(&self, url: &str) -> Option<CustomizationData> {
        match self.try_resolve(url).await {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::error!(url, error = %e, "Could not process customization file");
                None
            }
        }
    }

    /// Resolve one line item.
    ///
    /// Download or parse failures become [`Miss::Failed`]; the item falls
    /// back to AI in either case.
    pub async fn resolve_item(&self, line: &LineItem) -> Result<Resolved, Miss> {
        let url = line
            .item
            .print_settings
            .customization_url()
            .ok_or(Miss::NoCustomizationUrl)?;

        let data = self.try_resolve(url).await.map_err(|e| {
            tracing::warn!(
                item_id = %line.item.id,
                url,
                error = %e,
                "Customization file failed, falling back"
            );
            Miss::Failed(format!("Amazon URL Error: {e}"))
        })?;
        if data.is_empty() {
            return Err(Miss::Empty);
        }

        Ok(Resolved {
            source: DataSource::CustomizationFile,
            custom_text: apply_sku_text_rule(data.custom_text, line.sku()),
            color_1: data.color_1,
            color_2: data.color_2,
            annotation: FILE_ANNOTATION.to_string(),
            needs_review: false,
            review_reason: None,
        })
    }
}

/// Find and parse the JSON manifest inside a zip archive.
///
/// macOS resource forks (`._*`, `__MACOSX/`) are ignored. When several JSON
/// entries exist the first one wins.
///
/// # Errors
///
/// Returns `ResolveError` if the bytes are not a zip, no JSON entry exists,
/// or the entry cannot be read or parsed.
pub fn read_manifest(bytes: &[u8]) -> Result<Value, ResolveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut candidates = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if !entry.is_dir() && is_manifest_entry(entry.name()) {
            candidates.push((index, entry.name().to_owned()));
        }
    }

    let Some((index, name)) = candidates.first() else {
        return Err(ResolveError::NoJsonEntry);
    };
    if candidates.len() > 1 {
        tracing::warn!(count = candidates.len(), using = %name, "Multiple JSON entries in archive");
    }

    let mut content = String::new();
    archive.by_index(*index)?.read_to_string(&mut content)?;
    Ok(serde_json::from_str(&content)?)
}

fn is_manifest_entry(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    !name.starts_with("__MACOSX/")
        && !base.starts_with("._")
        && base.to_ascii_lowercase().ends_with(".json")
}
