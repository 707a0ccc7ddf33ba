use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::document::{self, DatasetRecord, RunRecord};
use crate::error::RegistryError;
use crate::schema::{
    AccessionRow, ComponentRow, Database, DatasetId, DatasetRow, OrganismRow, SampleRow,
};
use crate::store::Store;

/// An organism joined with its owning component.
#[derive(Debug, Clone, Serialize)]
pub struct OrganismEntry {
    pub organism: OrganismRow,
    pub component: ComponentRow,
}

/// A dataset joined with its component, organism, samples and accessions.
/// Samples are ordered by name, accessions by id.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    pub component: ComponentRow,
    pub organism: OrganismRow,
    pub dataset: DatasetRow,
    pub samples: Vec<SampleEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleEntry {
    pub sample: SampleRow,
    pub accessions: Vec<AccessionRow>,
}

impl DatasetEntry {
    /// Interchange-record form used by dump and dump_to_tree.
    pub fn to_record(&self) -> DatasetRecord {
        DatasetRecord {
            component: Some(self.component.name.clone()),
            name: self.dataset.name.clone(),
            no_spliced: self.dataset.no_spliced,
            release: Some(self.dataset.release),
            runs: self
                .samples
                .iter()
                .map(|entry| RunRecord {
                    accessions: entry
                        .accessions
                        .iter()
                        .map(|acc| acc.sra_id.clone())
                        .collect(),
                    name: entry.sample.name.clone(),
                })
                .collect(),
            species: self.organism.abbrev.clone(),
            trim_reads: self.samples.iter().any(|entry| entry.sample.trim_reads),
        }
    }
}

/// Filters for `list_datasets`, AND-composed. `latest` defaults to
/// `Some(true)`; set it to `None` to include retired rows.
#[derive(Debug, Clone)]
pub struct DatasetFilter {
    pub component: Option<String>,
    pub organism: Option<String>,
    pub name: Option<String>,
    pub release: Option<i64>,
    pub latest: Option<bool>,
}

impl Default for DatasetFilter {
    fn default() -> Self {
        Self {
            component: None,
            organism: None,
            name: None,
            release: None,
            latest: Some(true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetLoadOptions {
    pub release: i64,
    pub replace: bool,
    pub ignore: bool,
}

impl Default for DatasetLoadOptions {
    fn default() -> Self {
        Self {
            release: 0,
            replace: false,
            ignore: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownOrganism,
    DuplicateLatest,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDataset {
    pub index: usize,
    pub species: String,
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetLoadReport {
    pub total: usize,
    pub inserted: usize,
    pub skipped: Vec<SkippedDataset>,
    pub aborted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganismLoadReport {
    pub inserted: usize,
    pub components_created: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemapReport {
    pub copied: usize,
    pub retired_source: bool,
}

// Triage outcome of the first pass of load_datasets. Nothing is applied to
// the database until the replace/ignore gate has passed.
#[derive(Debug, Default)]
struct LoadPlan {
    new_components: Vec<String>,
    new_organisms: Vec<(String, String)>,
    retires: Vec<DatasetId>,
    checked: Vec<usize>,
    skipped: Vec<SkippedDataset>,
}

/// Interface to one registry database. Holds the store and the loaded
/// tables for its whole lifetime; every write operation ends with a single
/// commit. Not internally synchronized: callers must serialize access.
#[derive(Debug)]
pub struct Registry {
    store: Store,
    db: Database,
}

impl Registry {
    /// Binds to an existing database file.
    pub fn open(store: Store) -> Result<Self, RegistryError> {
        let db = store.open()?;
        Ok(Self { store, db })
    }

    /// Binds to a database file, creating the empty schema first if the
    /// file does not exist. Idempotent against an initialized store.
    pub fn create(store: Store) -> Result<Self, RegistryError> {
        store.initialize(false)?;
        Self::open(store)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- components ---

    pub fn add_component(&mut self, name: &str) -> Result<ComponentRow, RegistryError> {
        let id = self.db.insert_component(name)?;
        self.store.commit(&self.db)?;
        Ok(ComponentRow {
            id,
            name: name.to_string(),
        })
    }

    pub fn get_component(&self, name: &str) -> Result<ComponentRow, RegistryError> {
        self.db
            .component_by_name(name)
            .cloned()
            .ok_or_else(|| RegistryError::ComponentNotFound(name.to_string()))
    }

    pub fn get_or_create_component(&mut self, name: &str) -> Result<ComponentRow, RegistryError> {
        if let Some(row) = self.db.component_by_name(name) {
            return Ok(row.clone());
        }
        self.add_component(name)
    }

    pub fn remove_component(&mut self, name: &str) -> Result<(), RegistryError> {
        let row = self.get_component(name)?;
        self.db.remove_component(row.id);
        self.store.commit(&self.db)
    }

    /// All components ordered by name.
    pub fn list_components(&self) -> Vec<ComponentRow> {
        let mut rows: Vec<ComponentRow> = self.db.components().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    // --- organisms ---

    pub fn add_organism(
        &mut self,
        abbrev: &str,
        component_name: &str,
    ) -> Result<OrganismEntry, RegistryError> {
        let component = self.db.component_by_name(component_name).cloned().ok_or_else(|| {
            RegistryError::OrganismComponentMissing {
                organism: abbrev.to_string(),
                component: component_name.to_string(),
            }
        })?;
        let id = self.db.insert_organism(abbrev, component.id)?;
        self.store.commit(&self.db)?;
        Ok(OrganismEntry {
            organism: OrganismRow {
                id,
                abbrev: abbrev.to_string(),
                component_id: component.id,
            },
            component,
        })
    }

    pub fn get_organism(&self, abbrev: &str) -> Result<OrganismEntry, RegistryError> {
        let organism = self
            .db
            .organism_by_abbrev(abbrev)
            .cloned()
            .ok_or_else(|| RegistryError::OrganismNotFound(abbrev.to_string()))?;
        let component = self
            .db
            .component(organism.component_id)
            .cloned()
            .ok_or_else(|| RegistryError::Referential {
                child: "organism",
                parent: "component",
                id: organism.component_id.0,
            })?;
        Ok(OrganismEntry {
            organism,
            component,
        })
    }

    pub fn remove_organism(&mut self, abbrev: &str) -> Result<(), RegistryError> {
        let entry = self.get_organism(abbrev)?;
        self.db.remove_organism(entry.organism.id);
        self.store.commit(&self.db)
    }

    /// Organisms ordered by (component name, organism abbrev), optionally
    /// restricted to one component and/or to organisms owning datasets.
    pub fn list_organisms(
        &self,
        component: Option<&str>,
        with_datasets_only: bool,
    ) -> Vec<OrganismEntry> {
        let mut entries: Vec<OrganismEntry> = self
            .db
            .organisms()
            .filter_map(|organism| {
                let comp = self.db.component(organism.component_id)?;
                if let Some(wanted) = component {
                    if comp.name != wanted {
                        return None;
                    }
                }
                if with_datasets_only && self.db.datasets_of(organism.id).next().is_none() {
                    return None;
                }
                Some(OrganismEntry {
                    organism: organism.clone(),
                    component: comp.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.component.name, &a.organism.abbrev).cmp(&(&b.component.name, &b.organism.abbrev))
        });
        entries
    }

    /// Bulk idempotent organism import from a two-column tab file. New
    /// components are created on first sight; abbreviations already present
    /// anywhere in the registry are skipped, so re-loading the same file is
    /// a no-op. One commit for the whole batch.
    pub fn load_organisms(&mut self, path: &Utf8Path) -> Result<OrganismLoadReport, RegistryError> {
        let lines = document::load_organism_table(path)?;

        let mut known_abbrevs: HashSet<String> =
            self.db.organisms().map(|row| row.abbrev.clone()).collect();
        let mut components_created = 0;
        let mut inserted = 0;
        let mut skipped = Vec::new();

        for line in lines {
            let component_id = match self.db.component_by_name(&line.component) {
                Some(row) => row.id,
                None => {
                    components_created += 1;
                    self.db.insert_component(&line.component)?
                }
            };
            if known_abbrevs.contains(&line.organism) {
                info!(organism = %line.organism, "organism already registered, skipping");
                skipped.push(line.organism);
                continue;
            }
            self.db.insert_organism(&line.organism, component_id)?;
            known_abbrevs.insert(line.organism);
            inserted += 1;
        }

        self.store.commit(&self.db)?;
        Ok(OrganismLoadReport {
            inserted,
            components_created,
            skipped,
        })
    }

    // --- datasets ---

    pub fn get_dataset(&self, organism: &str, name: &str) -> Result<DatasetEntry, RegistryError> {
        let entry = self.get_organism(organism)?;
        let row = self
            .db
            .latest_dataset(entry.organism.id, name)
            .cloned()
            .ok_or_else(|| RegistryError::DatasetNotFound {
                organism: organism.to_string(),
                name: name.to_string(),
            })?;
        Ok(self.dataset_entry(&row, entry.organism, entry.component))
    }

    /// Bulk dataset import with conflict resolution. Pass 1 triages every
    /// record against the registry without mutating anything; the gate then
    /// aborts the whole load if any record was skipped and `ignore` is not
    /// set. Pass 2 applies the plan and commits once.
    pub fn load_datasets(
        &mut self,
        path: &Utf8Path,
        options: &DatasetLoadOptions,
    ) -> Result<DatasetLoadReport, RegistryError> {
        let records = document::load_dataset_document(path)?;
        let total = records.len();

        let plan = self.triage_datasets(&records, options);

        if !plan.skipped.is_empty() && !options.ignore {
            warn!(
                rejected = plan.skipped.len(),
                total, "dataset load aborted; re-run with replace or ignore"
            );
            return Ok(DatasetLoadReport {
                total,
                inserted: 0,
                skipped: plan.skipped,
                aborted: true,
            });
        }

        for name in &plan.new_components {
            self.db.insert_component(name)?;
        }
        for (abbrev, component_name) in &plan.new_organisms {
            let component_id = self
                .db
                .component_by_name(component_name)
                .map(|row| row.id)
                .ok_or_else(|| RegistryError::OrganismComponentMissing {
                    organism: abbrev.clone(),
                    component: component_name.clone(),
                })?;
            self.db.insert_organism(abbrev, component_id)?;
        }
        for id in &plan.retires {
            self.db.retire_dataset(*id, Some(options.release));
        }

        for index in &plan.checked {
            let record = &records[*index];
            let organism_id = self
                .db
                .organism_by_abbrev(&record.species)
                .map(|row| row.id)
                .ok_or_else(|| RegistryError::OrganismNotFound(record.species.clone()))?;
            let release = record.release.unwrap_or(options.release);
            let dataset_id =
                self.db
                    .insert_dataset(&record.name, organism_id, release, record.no_spliced)?;
            for run in &record.runs {
                let sample_id = self
                    .db
                    .insert_sample(&run.name, dataset_id, record.trim_reads)?;
                for sra_id in &run.accessions {
                    self.db.insert_accession(sra_id, sample_id)?;
                }
            }
        }

        self.store.commit(&self.db)?;
        Ok(DatasetLoadReport {
            total,
            inserted: plan.checked.len(),
            skipped: plan.skipped,
            aborted: false,
        })
    }

    fn triage_datasets(&self, records: &[DatasetRecord], options: &DatasetLoadOptions) -> LoadPlan {
        let mut plan = LoadPlan::default();
        let mut pending_components: HashSet<String> = HashSet::new();
        let mut pending_organisms: HashSet<String> = HashSet::new();
        let mut pending_keys: HashSet<(String, String)> = HashSet::new();

        for (index, record) in records.iter().enumerate() {
            let organism_known = self.db.organism_by_abbrev(&record.species).is_some()
                || pending_organisms.contains(&record.species);

            if !organism_known {
                let component = options.replace.then(|| record.component.clone()).flatten();
                let Some(component) = component else {
                    warn!(
                        species = %record.species,
                        dataset = %record.name,
                        "unknown organism, skipping record"
                    );
                    plan.skipped.push(SkippedDataset {
                        index,
                        species: record.species.clone(),
                        name: record.name.clone(),
                        reason: SkipReason::UnknownOrganism,
                    });
                    continue;
                };
                if self.db.component_by_name(&component).is_none()
                    && pending_components.insert(component.clone())
                {
                    plan.new_components.push(component.clone());
                }
                info!(species = %record.species, component = %component, "will create organism");
                pending_organisms.insert(record.species.clone());
                plan.new_organisms.push((record.species.clone(), component));
            }

            let key = (record.species.clone(), record.name.clone());
            if pending_keys.contains(&key) {
                plan.skipped.push(SkippedDataset {
                    index,
                    species: record.species.clone(),
                    name: record.name.clone(),
                    reason: SkipReason::DuplicateLatest,
                });
                continue;
            }
            if let Some(organism) = self.db.organism_by_abbrev(&record.species) {
                if let Some(existing) = self.db.latest_dataset(organism.id, &record.name) {
                    if options.replace {
                        info!(
                            species = %record.species,
                            dataset = %record.name,
                            "will retire existing dataset before replacement"
                        );
                        plan.retires.push(existing.id);
                    } else {
                        warn!(
                            species = %record.species,
                            dataset = %record.name,
                            "latest dataset already exists, skipping record"
                        );
                        plan.skipped.push(SkippedDataset {
                            index,
                            species: record.species.clone(),
                            name: record.name.clone(),
                            reason: SkipReason::DuplicateLatest,
                        });
                        continue;
                    }
                }
            }
            pending_keys.insert(key);
            plan.checked.push(index);
        }

        plan
    }

    /// Marks a dataset as superseded without deleting it. With a release,
    /// the retirement marker is (over)written; with `None` it is left as is.
    pub fn retire_dataset(
        &mut self,
        organism: &str,
        name: &str,
        release: Option<i64>,
    ) -> Result<(), RegistryError> {
        let entry = self.get_dataset(organism, name)?;
        self.db.retire_dataset(entry.dataset.id, release);
        self.store.commit(&self.db)
    }

    /// Hard-deletes a latest dataset and its samples and accessions.
    pub fn remove_dataset(&mut self, organism: &str, name: &str) -> Result<(), RegistryError> {
        let entry = self.get_dataset(organism, name)?;
        self.db.remove_dataset(entry.dataset.id);
        self.store.commit(&self.db)
    }

    /// Datasets matching all provided filters, ordered by (release,
    /// component name, organism abbrev, dataset name).
    pub fn list_datasets(&self, filter: &DatasetFilter) -> Vec<DatasetEntry> {
        let mut entries: Vec<DatasetEntry> = Vec::new();
        for row in self.db.datasets() {
            if let Some(latest) = filter.latest {
                if row.latest != latest {
                    continue;
                }
            }
            if let Some(release) = filter.release {
                if row.release != release {
                    continue;
                }
            }
            if let Some(name) = &filter.name {
                if &row.name != name {
                    continue;
                }
            }
            let Some(organism) = self.db.organism(row.organism_id) else {
                continue;
            };
            if let Some(abbrev) = &filter.organism {
                if &organism.abbrev != abbrev {
                    continue;
                }
            }
            let Some(component) = self.db.component(organism.component_id) else {
                continue;
            };
            if let Some(comp_name) = &filter.component {
                if &component.name != comp_name {
                    continue;
                }
            }
            entries.push(self.dataset_entry(row, organism.clone(), component.clone()));
        }
        entries.sort_by(|a, b| {
            (
                a.dataset.release,
                &a.component.name,
                &a.organism.abbrev,
                &a.dataset.name,
            )
                .cmp(&(
                    b.dataset.release,
                    &b.component.name,
                    &b.organism.abbrev,
                    &b.dataset.name,
                ))
        });
        entries
    }

    /// Duplicates every latest dataset of `from` onto `to` at the given
    /// release, deep-copying samples and accessions into new rows. With
    /// `retire_source`, the originals are retired after copying. One commit
    /// for the whole batch.
    pub fn remap_datasets(
        &mut self,
        from: &str,
        to: &str,
        release: i64,
        retire_source: bool,
    ) -> Result<RemapReport, RegistryError> {
        let source = self.get_organism(from)?;
        let target = self.get_organism(to)?;

        let mut sources: Vec<(DatasetRow, Vec<(SampleRow, Vec<AccessionRow>)>)> = self
            .db
            .datasets_of(source.organism.id)
            .filter(|row| row.latest)
            .map(|row| {
                let samples = self
                    .db
                    .samples_of(row.id)
                    .map(|sample| {
                        let accessions = self.db.accessions_of(sample.id).cloned().collect();
                        (sample.clone(), accessions)
                    })
                    .collect();
                (row.clone(), samples)
            })
            .collect();
        sources.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        if sources.is_empty() {
            info!(from = %from, to = %to, "no latest datasets to remap");
            return Ok(RemapReport {
                copied: 0,
                retired_source: false,
            });
        }

        for (dataset, samples) in &sources {
            let new_id = self.db.insert_dataset(
                &dataset.name,
                target.organism.id,
                release,
                dataset.no_spliced,
            )?;
            for (sample, accessions) in samples {
                let new_sample = self
                    .db
                    .insert_sample(&sample.name, new_id, sample.trim_reads)?;
                for accession in accessions {
                    self.db.insert_accession(&accession.sra_id, new_sample)?;
                }
            }
        }

        if retire_source {
            for (dataset, _) in &sources {
                self.db.retire_dataset(dataset.id, Some(release));
            }
        }

        self.store.commit(&self.db)?;
        Ok(RemapReport {
            copied: sources.len(),
            retired_source: retire_source,
        })
    }

    // --- dump ---

    /// Writes the entries as one JSON array with sorted keys.
    pub fn dump(&self, path: &Utf8Path, entries: &[DatasetEntry]) -> Result<(), RegistryError> {
        let records: Vec<DatasetRecord> = entries.iter().map(DatasetEntry::to_record).collect();
        let content = serde_json::to_vec_pretty(&records)
            .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }

    /// Writes one record per file under
    /// `<root>/build_<release>/<component>/<organism>_<dataset>.json`.
    /// Returns the written paths.
    pub fn dump_to_tree(
        &self,
        root: &Utf8Path,
        entries: &[DatasetEntry],
    ) -> Result<Vec<Utf8PathBuf>, RegistryError> {
        let mut written = Vec::new();
        for entry in entries {
            let path = root
                .join(format!("build_{}", entry.dataset.release))
                .join(&entry.component.name)
                .join(format!(
                    "{}_{}.json",
                    entry.organism.abbrev, entry.dataset.name
                ));
            let content = serde_json::to_vec_pretty(&entry.to_record())
                .map_err(|err| RegistryError::Filesystem(err.to_string()))?;
            Store::write_bytes_atomic(&path, &content)?;
            written.push(path);
        }
        Ok(written)
    }

    fn dataset_entry(
        &self,
        row: &DatasetRow,
        organism: OrganismRow,
        component: ComponentRow,
    ) -> DatasetEntry {
        let mut samples: Vec<SampleEntry> = self
            .db
            .samples_of(row.id)
            .map(|sample| {
                let mut accessions: Vec<AccessionRow> =
                    self.db.accessions_of(sample.id).cloned().collect();
                accessions.sort_by_key(|acc| acc.id);
                SampleEntry {
                    sample: sample.clone(),
                    accessions,
                }
            })
            .collect();
        samples.sort_by(|a, b| (&a.sample.name, a.sample.id).cmp(&(&b.sample.name, b.sample.id)));
        DatasetEntry {
            component,
            organism,
            dataset: row.clone(),
            samples,
        }
    }
}
