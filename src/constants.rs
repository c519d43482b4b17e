//! Column and token constants shared by every pipeline stage.
//! These mirror the Artskart observation export and the national species list spreadsheet.

// Observation export columns
pub const CSV_ID_COL: &str = "validScientificNameId";
pub const CSV_RANK_COL: &str = "scientificNameRank";
pub const INDIVIDUAL_COUNT_COL: &str = "individualCount";
pub const POPULAR_NAME_COL: &str = "preferredPopularName";
pub const SCIENTIFIC_NAME_COL: &str = "validScientificName";

// Reference spreadsheet layout
pub const REFERENCE_ID_COL: &str = "ValidScientificNameId";
pub const CRITERIA_PREFIX: &str = "Kriterium";
/// 0-based index of the first column that may hold a criterion marker (5th column).
pub const CRITERIA_START_COLUMN: usize = 4;
pub const MARKED_TOKEN: &str = "X";
pub const DEFAULT_REFERENCE_PATH: &str = "metadata/ArtslisteArtnasjonal_2023_01-31.xlsx";

pub const YES: &str = "Yes";
pub const NO: &str = "No";

/// Ranks that are expected to exist in the reference spreadsheet.
pub const MATCHABLE_RANKS: [&str; 2] = ["species", "subspecies"];

// Unmatched-rows log
pub const LOG_REASON_COL: &str = "log_reason";
pub const UNMATCHED_LOG_SUFFIX: &str = "_unmatched_log";
pub const REASON_HIGHER_RANK: &str = "Higher taxonomic rank";
pub const REASON_NOT_IN_REFERENCE: &str = "Species/subspecies ID not found in reference";

// Taxonomy enrichment columns
pub const LINEAGE_RANKS: [&str; 6] = ["Kingdom", "Phylum", "Class", "Order", "Family", "Genus"];
pub const FAMILY_RANK: &str = "Family";
pub const ORDER_RANK: &str = "Order";
pub const FAMILY_NAME_COL: &str = "FamilieNavn";
pub const ORDER_NAME_COL: &str = "OrdenNavn";

// Norwegian written forms, in priority order
pub const PRIMARY_LANGUAGE: &str = "nb";
pub const SECONDARY_LANGUAGE: &str = "nn";

// Remote services
pub const NORTAXA_API_BASE_URL: &str = "https://nortaxa.artsdatabanken.no/api/v1/TaxonName";
pub const ARTSKART_API_BASE_URL: &str = "https://artskart.artsdatabanken.no/publicapi/api";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

// File layout
pub const DEFAULT_DELIMITER: char = ';';
pub const DEFAULT_INTERMEDIATE_DIR: &str = "output/intermediate";
pub const DEFAULT_FINAL_DIR: &str = "output/final";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "artsdata.toml";

pub const NAMES_FILLED_SUFFIX: &str = "_names_filled";
pub const CLEANED_SUFFIX: &str = "_cleaned";
pub const MERGED_SUFFIX: &str = "_forvaltning";
pub const ENRICHED_SUFFIX: &str = "_taxonomy";

/// Columns dropped by the column cleaner. Absent columns are ignored.
pub const COLUMNS_TO_REMOVE: &[&str] = &[
    // Identifiers and internal system data
    "proxyId",
    "nodeId",
    "institutionCode",
    "collectionCode",
    "datasetId",
    "occurrenceId",
    "catalogNumber",
    "otherCatalogNumbers",
    "relatedResourceId",
    "relationshipOfResource",
    "associatedReferences",
    "institution",
    "collection",
    "datasetName",
    // Redundant coordinates
    "east",
    "north",
    // Database/metadata dates
    "dateLastModified",
    "dateLastIdentified",
    // Data quality/system flags
    "hasErrors",
    "blocked",
    "qualityIssue",
    "validated",
    // Complex/redundant fields
    "dynamicProperties",
    "popularNames",
    // Less commonly needed taxonomic/observation details
    "validScientificNameAuthorship",
    "identifiedBy",
    "unspontaneus",
    "unsureIdentification",
    "hasImage",
    "absent",
    "notRecovered",
    "habitat",
    "collectingMethod",
    "recordNumber",
    "fieldNumber",
    "measurementMethod",
    "georeferenceRemarks",
    "preparations",
    "typeStatus",
    "eventTime",
    "maximumElevationInMeters",
    "minimumElevationInMeters",
    "verbatimDepth",
];
