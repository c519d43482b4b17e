use async_trait::async_trait;

use crate::pipeline::popular_names::ArtskartTaxon;
use crate::pipeline::taxonomy::TaxonRecord;
use crate::types::TaxonId;

/// Lookup-by-identifier against the taxonomy name service.
///
/// `Err` covers transport failures, non-success statuses and unreadable bodies alike;
/// callers treat every error as "no result for this identifier".
#[async_trait]
pub trait TaxonSource: Send + Sync {
    async fn fetch_taxon(&self, taxon_id: TaxonId) -> Result<TaxonRecord, String>;
}

#[async_trait]
pub trait PopularNameSource: Send + Sync {
    async fn fetch_popular_names(&self, taxon_id: TaxonId) -> Result<ArtskartTaxon, String>;
}
