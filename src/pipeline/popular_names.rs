//! Fills empty popular names from the Artskart public API before anyone is prompted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::ports::PopularNameSource;
use crate::constants::{CSV_ID_COL, POPULAR_NAME_COL, PRIMARY_LANGUAGE};
use crate::error::Result;
use crate::metrics::TaxonomyMetrics;
use crate::pipeline::missing_names::missing_name_rows;
use crate::pipeline::taxonomy::{null_as_empty, progress_bar};
use crate::table::Table;
use crate::types::{parse_integer, TaxonId};

/// Artskart `taxon/{id}` response. The misspellings are the API's own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtskartTaxon {
    #[serde(rename = "PrefferedPopularname", default)]
    pub preferred_popular_name: Option<String>,
    #[serde(rename = "PopularNames", default, deserialize_with = "null_as_empty")]
    pub popular_names: Vec<PopularName>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopularName {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Preffered", default)]
    pub preferred: Option<bool>,
}

/// Top-level preferred name, else the preferred `nb` entry, else the first `nb` entry.
pub fn extract_norwegian_popular_name(taxon: &ArtskartTaxon) -> Option<String> {
    let non_empty = |name: &Option<String>| {
        name.as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    };

    if let Some(name) = non_empty(&taxon.preferred_popular_name) {
        return Some(name);
    }

    let mut first_norwegian = None;
    for entry in &taxon.popular_names {
        if entry.language.as_deref() != Some(PRIMARY_LANGUAGE) {
            continue;
        }
        let Some(name) = non_empty(&entry.name) else {
            continue;
        };
        if entry.preferred == Some(true) {
            return Some(name);
        }
        first_norwegian.get_or_insert(name);
    }
    first_norwegian
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopularNameSummary {
    pub missing_rows: usize,
    pub lookups: usize,
    pub filled_rows: usize,
}

/// Looks up each distinct identifier among rows without a popular name, once.
pub async fn fill_missing_popular_names(
    table: &mut Table,
    source: &dyn PopularNameSource,
) -> Result<PopularNameSummary> {
    let id_idx = table.require_column(CSV_ID_COL, "observation table")?;
    let name_idx = table.require_column(POPULAR_NAME_COL, "observation table")?;

    let missing = missing_name_rows(table)?;
    let mut summary = PopularNameSummary {
        missing_rows: missing.len(),
        ..Default::default()
    };
    if missing.is_empty() {
        return Ok(summary);
    }
    info!("Fetching popular names for {} rows from Artskart", missing.len());

    let mut found: HashMap<TaxonId, Option<String>> = HashMap::new();
    let progress = progress_bar(missing.len() as u64, "popular names");
    for &row in &missing {
        progress.inc(1);
        let Some(id) = parse_integer(table.cell(row, id_idx)) else {
            debug!(row, "No numeric identifier, popular name left empty");
            continue;
        };
        if !found.contains_key(&id) {
            summary.lookups += 1;
            let name = match source.fetch_popular_names(id).await {
                Ok(taxon) => {
                    TaxonomyMetrics::record_request("artskart", true);
                    extract_norwegian_popular_name(&taxon)
                }
                Err(e) => {
                    TaxonomyMetrics::record_request("artskart", false);
                    warn!("Artskart lookup for {} failed: {}", id, e);
                    None
                }
            };
            found.insert(id, name);
        }
        if let Some(name) = found.get(&id).cloned().flatten() {
            table.set_cell(row, name_idx, name);
            summary.filled_rows += 1;
        }
    }
    progress.finish_and_clear();

    info!(
        "Filled {} of {} missing popular names ({} lookups)",
        summary.filled_rows, summary.missing_rows, summary.lookups
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeArtskart {
        taxa: HashMap<TaxonId, ArtskartTaxon>,
        calls: Mutex<Vec<TaxonId>>,
    }

    #[async_trait]
    impl PopularNameSource for FakeArtskart {
        async fn fetch_popular_names(&self, taxon_id: TaxonId) -> std::result::Result<ArtskartTaxon, String> {
            self.calls.lock().unwrap().push(taxon_id);
            self.taxa
                .get(&taxon_id)
                .cloned()
                .ok_or_else(|| "404 Not Found".to_string())
        }
    }

    fn taxon(value: serde_json::Value) -> ArtskartTaxon {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_top_level_preferred_name_wins() {
        let t = taxon(json!({
            "PrefferedPopularname": " gråkråke ",
            "PopularNames": [{"language": "nb", "name": "kråke", "Preffered": true}]
        }));
        assert_eq!(extract_norwegian_popular_name(&t).as_deref(), Some("gråkråke"));
    }

    #[test]
    fn test_preferred_bokmal_entry_beats_first_entry() {
        let t = taxon(json!({
            "PrefferedPopularname": "",
            "PopularNames": [
                {"language": "nn", "name": "kråka", "Preffered": true},
                {"language": "nb", "name": "kråke", "Preffered": false},
                {"language": "nb", "name": "gråkråke", "Preffered": true}
            ]
        }));
        assert_eq!(extract_norwegian_popular_name(&t).as_deref(), Some("gråkråke"));
    }

    #[test]
    fn test_first_bokmal_entry_and_nothing() {
        let t = taxon(json!({
            "PopularNames": [
                {"language": "en", "name": "hooded crow"},
                {"language": "nb", "name": "  "},
                {"language": "nb", "name": "kråke"}
            ]
        }));
        assert_eq!(extract_norwegian_popular_name(&t).as_deref(), Some("kråke"));
        assert_eq!(extract_norwegian_popular_name(&taxon(json!({"PopularNames": null}))), None);
    }

    #[tokio::test]
    async fn test_fill_looks_up_each_identifier_once() {
        let source = FakeArtskart {
            taxa: HashMap::from([(42, taxon(json!({"PrefferedPopularname": "kråke"})))]),
            calls: Mutex::new(Vec::new()),
        };
        let mut table = Table::from_rows(
            ["validScientificNameId", "preferredPopularName"],
            [
                vec!["42", ""],
                vec!["42", ""],
                vec!["77", "skjære"],
                vec!["404", ""],
                vec!["", ""],
            ],
        );

        let summary = fill_missing_popular_names(&mut table, &source).await.unwrap();

        assert_eq!(
            table.column_values("preferredPopularName").unwrap(),
            vec!["kråke", "kråke", "skjære", "", ""]
        );
        assert_eq!(*source.calls.lock().unwrap(), vec![42, 404]);
        assert_eq!(summary.missing_rows, 4);
        assert_eq!(summary.lookups, 2);
        assert_eq!(summary.filled_rows, 2);
    }
}
