#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TAXON_NAME_PATH: &str = "/api/v1/TaxonName";

pub const HOODED_CROW: i64 = 3541;
pub const CORVIDAE: i64 = 55;
pub const PASSERIFORMES: i64 = 10;
pub const HERRING_GULL: i64 = 3962;

/// NorTaxa record for a species, with Family/Order identifiers in its classification.
pub fn species_record(id: i64, genus: &str, family: (&str, i64), order: (&str, i64)) -> Value {
    json!({
        "scientificNameId": id,
        "scientificName": format!("{} sp.", genus),
        "taxonRank": "Species",
        "higherClassification": [
            {"taxonRank": "Kingdom", "scientificName": "Animalia", "scientificNameId": 1},
            {"taxonRank": "Phylum", "scientificName": "Chordata", "scientificNameId": 2},
            {"taxonRank": "Class", "scientificName": "Aves", "scientificNameId": 3},
            {"taxonRank": "Order", "scientificName": order.0, "scientificNameId": order.1},
            {"taxonRank": "Family", "scientificName": family.0, "scientificNameId": family.1},
            {"taxonRank": "Genus", "scientificName": genus, "scientificNameId": 99}
        ],
        "vernacularNames": []
    })
}

/// NorTaxa record for a family or order carrying vernacular names.
pub fn named_record(id: i64, names: &[(&str, &str)]) -> Value {
    let vernacular: Vec<Value> = names
        .iter()
        .map(|(lang, name)| json!({"vernacularName": name, "languageIsoCode": lang}))
        .collect();
    json!({
        "scientificNameId": id,
        "higherClassification": [],
        "vernacularNames": vernacular
    })
}

/// Mounts `body` at `ByScientificNameId/{id}`, expecting exactly one request.
pub async fn mount_taxon(server: &MockServer, id: i64, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("{}/ByScientificNameId/{}", TAXON_NAME_PATH, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, id: i64, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{}/ByScientificNameId/{}", TAXON_NAME_PATH, id)))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

/// A NorTaxa stand-in knowing the hooded crow and its family/order names.
pub async fn mock_nortaxa() -> MockServer {
    let server = MockServer::start().await;
    mount_taxon(
        &server,
        HOODED_CROW,
        species_record(HOODED_CROW, "Corvus", ("Corvidae", CORVIDAE), ("Passeriformes", PASSERIFORMES)),
    )
    .await;
    mount_taxon(&server, CORVIDAE, named_record(CORVIDAE, &[("nb", "kråkefamilien")])).await;
    mount_taxon(
        &server,
        PASSERIFORMES,
        named_record(PASSERIFORMES, &[("nn", "sporvefuglar"), ("nb", "spurvefugler")]),
    )
    .await;
    server
}

pub fn taxon_base_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), TAXON_NAME_PATH)
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

/// Reference list with one ignored column ahead of the criteria offset.
pub fn reference_csv(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "reference.csv",
        "ValidScientificNameId;Vitenskapelig_Navn;Norsk_Navn;Kriterium_Utgaatt;Kriterium_Ansvarsart;Kriterium_Trua_Art\n\
         3541;Corvus cornix;kråke;X;X;\n\
         3962;Larus argentatus;gråmåke;;x;X\n",
    )
}

/// Raw export: two crows, one unmatched species, one genus, plus noise columns.
pub fn raw_export(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "fugl.csv",
        "occurrenceId;validScientificNameId;validScientificName;preferredPopularName;scientificNameRank;individualCount;locality;hasErrors\n\
         urn:1;3541;Corvus cornix;kråke;species;;Sortland;false\n\
         urn:2;3541;Corvus cornix;kråke;species;4;Bø;false\n\
         urn:3;77;Aquila chrysaetos;kongeørn;species;1;Andøy;false\n\
         urn:4;3500;Corvus;;genus;2;Sortland;false\n",
    )
}
