//! Taxonomy enrichment.
//!
//! Each distinct scientific-name identifier in the merged table is looked up once in
//! NorTaxa. The response's classification gives the Kingdom..Genus lineage plus the
//! identifiers of the Family and Order levels, which are looked up again for their
//! Norwegian vernacular names. Everything is joined back onto every row by identifier.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::app::ports::TaxonSource;
use crate::constants::{
    CSV_ID_COL, FAMILY_NAME_COL, FAMILY_RANK, LINEAGE_RANKS, ORDER_NAME_COL, ORDER_RANK,
    PRIMARY_LANGUAGE, SECONDARY_LANGUAGE,
};
use crate::error::Result;
use crate::metrics::TaxonomyMetrics;
use crate::table::Table;
use crate::types::{parse_integer, TaxonId};

/// NorTaxa `TaxonName` response, reduced to the fields the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonRecord {
    #[serde(default)]
    pub scientific_name_id: Option<TaxonId>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub taxon_rank: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub higher_classification: Vec<ClassificationLevel>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub vernacular_names: Vec<VernacularName>,
}

/// One level of a taxon's higher classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationLevel {
    #[serde(default)]
    pub taxon_rank: Option<String>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub scientific_name_id: Option<TaxonId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VernacularName {
    #[serde(default)]
    pub vernacular_name: Option<String>,
    #[serde(default)]
    pub language_iso_code: Option<String>,
}

pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Lineage names by rank, plus the identifiers needed for the vernacular lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lineage {
    names: HashMap<&'static str, String>,
    pub family_id: Option<TaxonId>,
    pub order_id: Option<TaxonId>,
}

impl Lineage {
    pub fn name(&self, rank: &str) -> Option<&str> {
        self.names.get(rank).map(String::as_str)
    }
}

/// Scans the classification list and records the scientific name at each lineage rank.
pub fn extract_lineage(record: &TaxonRecord) -> Lineage {
    let mut lineage = Lineage::default();
    for level in &record.higher_classification {
        let Some(rank) = level.taxon_rank.as_deref() else {
            continue;
        };
        if let Some(rank_key) = LINEAGE_RANKS.iter().find(|r| **r == rank) {
            if let Some(name) = &level.scientific_name {
                lineage.names.insert(*rank_key, name.clone());
            }
        }
        if rank == FAMILY_RANK {
            lineage.family_id = level.scientific_name_id;
        } else if rank == ORDER_RANK {
            lineage.order_id = level.scientific_name_id;
        }
    }
    lineage
}

/// Norwegian vernacular name: Bokmål first, Nynorsk as fallback.
pub fn norwegian_vernacular_name(record: &TaxonRecord) -> Option<String> {
    [PRIMARY_LANGUAGE, SECONDARY_LANGUAGE].iter().find_map(|lang| {
        record
            .vernacular_names
            .iter()
            .filter(|v| v.language_iso_code.as_deref() == Some(*lang))
            .find_map(|v| {
                v.vernacular_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            })
    })
}

/// Run-scoped memo of remote lookups.
///
/// Holds either the parsed record or `None` meaning "attempted, nothing usable came back".
/// Species, family and order lookups share one cache, so no identifier is requested twice.
pub struct TaxonCache<'a> {
    source: &'a dyn TaxonSource,
    entries: HashMap<TaxonId, Option<TaxonRecord>>,
    requests: usize,
}

impl<'a> TaxonCache<'a> {
    pub fn new(source: &'a dyn TaxonSource) -> Self {
        Self {
            source,
            entries: HashMap::new(),
            requests: 0,
        }
    }

    pub async fn get_or_fetch(&mut self, taxon_id: TaxonId) -> Option<TaxonRecord> {
        if let Some(entry) = self.entries.get(&taxon_id) {
            TaxonomyMetrics::record_cache_hit();
            return entry.clone();
        }

        self.requests += 1;
        let entry = match self.source.fetch_taxon(taxon_id).await {
            Ok(record) => {
                TaxonomyMetrics::record_request("nortaxa", true);
                Some(record)
            }
            Err(e) => {
                TaxonomyMetrics::record_request("nortaxa", false);
                warn!(taxon_id, "Taxon lookup failed, leaving it unresolved: {}", e);
                None
            }
        };
        self.entries.insert(taxon_id, entry.clone());
        entry
    }

    /// Number of remote requests issued so far.
    pub fn requests_issued(&self) -> usize {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub rows: usize,
    pub distinct_ids: usize,
    pub unparsable_ids: usize,
    pub resolved_ids: usize,
    pub family_names: usize,
    pub order_names: usize,
    pub requests: usize,
}

/// Appends lineage and vernacular-name columns to `table`. Rows are never dropped.
pub async fn enrich(mut table: Table, cache: &mut TaxonCache<'_>) -> Result<(Table, EnrichSummary)> {
    let id_idx = table.require_column(CSV_ID_COL, "merged table")?;
    let mut summary = EnrichSummary {
        rows: table.len(),
        ..Default::default()
    };

    let distinct_ids = {
        let mut seen_raw: HashSet<&str> = HashSet::new();
        let mut seen: HashSet<TaxonId> = HashSet::new();
        let mut ids = Vec::new();
        for row in table.rows() {
            let raw = row[id_idx].trim();
            if raw.is_empty() || !seen_raw.insert(raw) {
                continue;
            }
            match parse_integer(raw) {
                Some(id) => {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
                None => {
                    summary.unparsable_ids += 1;
                    TaxonomyMetrics::record_unparsable_id();
                    warn!("Skipping non-numeric identifier '{}'", raw);
                }
            }
        }
        ids
    };
    summary.distinct_ids = distinct_ids.len();
    info!("Looking up {} distinct taxa", distinct_ids.len());

    let mut lineages: HashMap<TaxonId, Lineage> = HashMap::new();
    let progress = progress_bar(distinct_ids.len() as u64, "species");
    for (i, id) in distinct_ids.iter().enumerate() {
        progress.set_message(format!("taxon {}", id));
        if let Some(record) = cache.get_or_fetch(*id).await {
            lineages.insert(*id, extract_lineage(&record));
        }
        progress.inc(1);
        if (i + 1) % 25 == 0 {
            info!("Looked up {}/{} taxa", i + 1, distinct_ids.len());
        }
    }
    progress.finish_and_clear();
    summary.resolved_ids = lineages.len();

    // Family and order identifiers, in first-seen order
    let mut rank_ids: Vec<TaxonId> = Vec::new();
    let mut seen_rank_ids: HashSet<TaxonId> = HashSet::new();
    for id in &distinct_ids {
        if let Some(lineage) = lineages.get(id) {
            for rank_id in [lineage.family_id, lineage.order_id].into_iter().flatten() {
                if seen_rank_ids.insert(rank_id) {
                    rank_ids.push(rank_id);
                }
            }
        }
    }

    let mut vernacular: HashMap<TaxonId, String> = HashMap::new();
    let progress = progress_bar(rank_ids.len() as u64, "family/order");
    for rank_id in &rank_ids {
        if let Some(name) = cache
            .get_or_fetch(*rank_id)
            .await
            .and_then(|record| norwegian_vernacular_name(&record))
        {
            vernacular.insert(*rank_id, name);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let mut columns: Vec<Vec<String>> = vec![Vec::with_capacity(table.len()); LINEAGE_RANKS.len() + 2];
    for row in table.rows() {
        let lineage = parse_integer(&row[id_idx]).and_then(|id| lineages.get(&id));
        for (column, rank) in columns.iter_mut().zip(LINEAGE_RANKS) {
            column.push(lineage.and_then(|l| l.name(rank)).unwrap_or_default().to_string());
        }
        let family_name = lineage
            .and_then(|l| l.family_id)
            .and_then(|id| vernacular.get(&id))
            .cloned()
            .unwrap_or_default();
        let order_name = lineage
            .and_then(|l| l.order_id)
            .and_then(|id| vernacular.get(&id))
            .cloned()
            .unwrap_or_default();
        if !family_name.is_empty() {
            summary.family_names += 1;
        }
        if !order_name.is_empty() {
            summary.order_names += 1;
        }
        columns[LINEAGE_RANKS.len()].push(family_name);
        columns[LINEAGE_RANKS.len() + 1].push(order_name);
    }

    let names = LINEAGE_RANKS.iter().copied().chain([FAMILY_NAME_COL, ORDER_NAME_COL]);
    for (name, values) in names.zip(columns) {
        table.set_column(name, values);
    }

    summary.requests = cache.requests_issued();
    debug!(?summary, "Taxonomy enrichment finished");
    Ok((table, summary))
}

/// Reads the merged file, enriches it and writes the result to `output_path`.
pub async fn run_taxonomy_enrich(
    input_path: &Path,
    output_path: &Path,
    delimiter: u8,
    source: &dyn TaxonSource,
) -> Result<(PathBuf, EnrichSummary)> {
    let table = Table::read_delimited(input_path, delimiter)?;
    let mut cache = TaxonCache::new(source);
    let (enriched, summary) = enrich(table, &mut cache).await?;
    enriched.write_delimited(output_path, delimiter)?;

    info!(
        "Enriched {} rows ({} of {} taxa resolved, {} requests) -> {}",
        summary.rows,
        summary.resolved_ids,
        summary.distinct_ids,
        summary.requests,
        output_path.display()
    );
    Ok((output_path.to_path_buf(), summary))
}

pub(crate) fn progress_bar(len: u64, label: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_prefix(label);
    pb
}
