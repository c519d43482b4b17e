use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::app::ports::{PopularNameSource, TaxonSource};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::pipeline::popular_names::ArtskartTaxon;
use crate::pipeline::taxonomy::TaxonRecord;
use crate::types::TaxonId;

fn build_client(config: &ServiceConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(concat!("artsdata-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> std::result::Result<T, String> {
    debug!(url, "GET");
    let resp = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP {} from {}", status, url));
    }
    resp.json::<T>().await.map_err(|e| e.to_string())
}

/// NorTaxa `TaxonName` API.
pub struct NorTaxaHttp {
    client: reqwest::Client,
    base_url: String,
}

impl NorTaxaHttp {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn taxon_url(&self, taxon_id: TaxonId) -> String {
        format!("{}/ByScientificNameId/{}", self.base_url, taxon_id)
    }
}

#[async_trait]
impl TaxonSource for NorTaxaHttp {
    async fn fetch_taxon(&self, taxon_id: TaxonId) -> std::result::Result<TaxonRecord, String> {
        get_json(&self.client, &self.taxon_url(taxon_id)).await
    }
}

/// Artskart public API.
pub struct ArtskartHttp {
    client: reqwest::Client,
    base_url: String,
}

impl ArtskartHttp {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn taxon_url(&self, taxon_id: TaxonId) -> String {
        format!("{}/taxon/{}", self.base_url, taxon_id)
    }
}

#[async_trait]
impl PopularNameSource for ArtskartHttp {
    async fn fetch_popular_names(&self, taxon_id: TaxonId) -> std::result::Result<ArtskartTaxon, String> {
        get_json(&self.client, &self.taxon_url(taxon_id)).await
    }
}
