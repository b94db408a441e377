//! Metadata registry client.
//!
//! Descriptive metadata (title, publisher, description) lives in an external
//! CKAN-style catalogue. Lookups are keyed by dataset ID and are independent;
//! a failure only ever affects the dataset being looked up.

use std::time::Duration;

use async_trait::async_trait;
use datapulse_core::DatasetMetadata;
use reqwest::StatusCode;
use serde::Deserialize;

/// Why a metadata lookup produced no result.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The registry does not know this dataset (404) or rejected the ID (400).
    #[error("dataset not found in registry")]
    NotFound,

    /// The registry answered with any other non-success status.
    #[error("registry returned status {0}")]
    Status(u16),

    /// Network failure or timeout.
    #[error("registry request failed: {0}")]
    Transport(String),

    /// The response body was not the expected shape.
    #[error("invalid registry response: {0}")]
    Decode(String),
}

impl LookupError {
    /// Low-cardinality label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Status(_) => "status",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
        }
    }
}

/// Source of descriptive metadata for datasets.
#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    /// Look up metadata for a single dataset.
    async fn lookup(&self, dataset_id: &str) -> Result<DatasetMetadata, LookupError>;
}

/// Envelope returned by CKAN action endpoints.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    success: bool,
    result: Option<Package>,
}

/// Subset of a CKAN package used for enrichment.
#[derive(Debug, Default, Deserialize)]
struct Package {
    title: Option<String>,
    notes: Option<String>,
    author: Option<String>,
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    title: Option<String>,
}

impl From<Package> for DatasetMetadata {
    fn from(package: Package) -> Self {
        let organization = package
            .organization
            .and_then(|o| o.title)
            .filter(|t| !t.trim().is_empty());

        Self {
            title: package.title,
            publisher: organization.or(package.author),
            description: package.notes,
        }
    }
}

/// [`MetadataSource`] backed by the CKAN `package_show` action.
#[derive(Debug, Clone)]
pub struct CkanRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl CkanRegistry {
    /// Build a registry client with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("datapulse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn package_show_url(&self) -> String {
        format!("{}/api/3/action/package_show", self.base_url)
    }
}

#[async_trait]
impl MetadataSource for CkanRegistry {
    async fn lookup(&self, dataset_id: &str) -> Result<DatasetMetadata, LookupError> {
        let resp = self
            .client
            .get(self.package_show_url())
            .query(&[("id", dataset_id)])
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => return Err(LookupError::NotFound),
            status if !status.is_success() => return Err(LookupError::Status(status.as_u16())),
            _ => {}
        }

        let body: ActionResponse = resp
            .json()
            .await
            .map_err(|e| LookupError::Decode(e.to_string()))?;

        match body {
            ActionResponse {
                success: true,
                result: Some(package),
            } => Ok(package.into()),
            _ => Err(LookupError::NotFound),
        }
    }
}
