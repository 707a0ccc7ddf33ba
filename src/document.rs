use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// One dataset in interchange form, as accepted by `dataset load` and
/// produced by `dataset dump`. Fields are declared in alphabetical order so
/// serialized records carry sorted keys for deterministic diffing; the two
/// load-only flags never serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub no_spliced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<i64>,
    pub runs: Vec<RunRecord>,
    pub species: String,
    #[serde(default, skip_serializing)]
    pub trim_reads: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunRecord {
    pub accessions: Vec<String>,
    pub name: String,
}

/// Reads and validates a dataset document. Validation happens here in full,
/// before any registry mutation.
pub fn load_dataset_document(path: &Utf8Path) -> Result<Vec<DatasetRecord>, RegistryError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| RegistryError::Filesystem(format!("{path}: {err}")))?;
    parse_dataset_document(path, &content)
}

pub fn parse_dataset_document(
    path: &Utf8Path,
    content: &str,
) -> Result<Vec<DatasetRecord>, RegistryError> {
    serde_json::from_str(content).map_err(|err| RegistryError::SchemaError {
        path: path.to_owned(),
        message: err.to_string(),
    })
}

/// One line of an organism tab-file: `component_name \t organism_abbrev`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganismLine {
    pub component: String,
    pub organism: String,
}

pub fn load_organism_table(path: &Utf8Path) -> Result<Vec<OrganismLine>, RegistryError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| RegistryError::Filesystem(format!("{path}: {err}")))?;
    parse_organism_table(path, &content)
}

pub fn parse_organism_table(
    path: &Utf8Path,
    content: &str,
) -> Result<Vec<OrganismLine>, RegistryError> {
    let mut lines = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 2 {
            return Err(RegistryError::InvalidFormat {
                path: path.to_owned(),
                line: index + 1,
                found: fields.len(),
            });
        }
        lines.push(OrganismLine {
            component: fields[0].to_string(),
            organism: fields[1].to_string(),
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8Path;

    use super::*;
    use crate::error::RegistryError;

    fn doc_path() -> &'static Utf8Path {
        Utf8Path::new("datasets.json")
    }

    #[test]
    fn parse_minimal_record() {
        let doc = r#"[
            {
                "species": "species_a",
                "name": "run_2024",
                "runs": [{"name": "run1", "accessions": ["SRR000001", "SRR000002"]}]
            }
        ]"#;
        let records = parse_dataset_document(doc_path(), doc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].species, "species_a");
        assert_eq!(records[0].component, None);
        assert_eq!(records[0].release, None);
        assert!(!records[0].trim_reads);
        assert!(!records[0].no_spliced);
        assert_eq!(records[0].runs[0].accessions.len(), 2);
    }

    #[test]
    fn parse_full_record() {
        let doc = r#"[
            {
                "component": "CompA",
                "species": "species_a",
                "name": "run_2024",
                "release": 61,
                "trim_reads": true,
                "no_spliced": true,
                "runs": [{"name": "run1", "accessions": ["SRR000001"]}]
            }
        ]"#;
        let records = parse_dataset_document(doc_path(), doc).unwrap();
        assert_eq!(records[0].release, Some(61));
        assert!(records[0].trim_reads);
        assert!(records[0].no_spliced);
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let doc = r#"[{"species": "species_a", "runs": []}]"#;
        let err = parse_dataset_document(doc_path(), doc).unwrap_err();
        assert_matches!(err, RegistryError::SchemaError { .. });
    }

    #[test]
    fn unknown_field_is_a_schema_error() {
        let doc = r#"[
            {"species": "species_a", "name": "x", "runs": [], "colour": "red"}
        ]"#;
        let err = parse_dataset_document(doc_path(), doc).unwrap_err();
        assert_matches!(err, RegistryError::SchemaError { .. });
    }

    #[test]
    fn load_flags_do_not_serialize() {
        let record = DatasetRecord {
            component: Some("CompA".to_string()),
            name: "run_2024".to_string(),
            no_spliced: true,
            release: Some(61),
            runs: vec![RunRecord {
                accessions: vec!["SRR000001".to_string()],
                name: "run1".to_string(),
            }],
            species: "species_a".to_string(),
            trim_reads: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("trim_reads"));
        assert!(!json.contains("no_spliced"));
        // Keys come out in sorted order for deterministic diffing.
        let component = json.find("component").unwrap();
        let species = json.find("species").unwrap();
        assert!(component < species);
    }

    #[test]
    fn tab_file_blank_lines_are_ignored() {
        let content = "CompA\tspecies_a\n\nCompA\tspecies_b\nCompB\tspecies_c\n";
        let lines = parse_organism_table(Utf8Path::new("orgs.tab"), content).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].component, "CompA");
        assert_eq!(lines[2].organism, "species_c");
    }

    #[test]
    fn tab_file_wrong_field_count() {
        let content = "CompA\tspecies_a\nCompB species_b\n";
        let err = parse_organism_table(Utf8Path::new("orgs.tab"), content).unwrap_err();
        assert_matches!(
            err,
            RegistryError::InvalidFormat { line: 2, found: 1, .. }
        );

        let content = "CompA\tspecies_a\textra\n";
        let err = parse_organism_table(Utf8Path::new("orgs.tab"), content).unwrap_err();
        assert_matches!(
            err,
            RegistryError::InvalidFormat { line: 1, found: 3, .. }
        );
    }
}
