use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub const SCHEMA_VERSION: u32 = 1;

macro_rules! row_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(ComponentId);
row_id!(OrganismId);
row_id!(DatasetId);
row_id!(SampleId);
row_id!(AccessionId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub id: ComponentId,
    pub name: String,
}

impl fmt::Display for ComponentRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component(id={}, name={})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismRow {
    pub id: OrganismId,
    pub abbrev: String,
    pub component_id: ComponentId,
}

impl fmt::Display for OrganismRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "organism(id={}, abbrev={}, component_id={})",
            self.id, self.abbrev, self.component_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: DatasetId,
    pub name: String,
    pub organism_id: OrganismId,
    pub release: i64,
    pub retired: i64,
    pub latest: bool,
    pub no_spliced: bool,
}

impl fmt::Display for DatasetRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dataset(id={}, name={}, organism_id={}, release={}, latest={})",
            self.id, self.name, self.organism_id, self.release, self.latest
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id: SampleId,
    pub name: String,
    pub dataset_id: DatasetId,
    pub trim_reads: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessionRow {
    pub id: AccessionId,
    pub sra_id: String,
    pub sample_id: SampleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub schema_version: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NextIds {
    component: i64,
    organism: i64,
    dataset: i64,
    sample: i64,
    accession: i64,
}

/// In-memory relational arena: one ordered table per entity, wired by
/// foreign keys, plus unique secondary indexes rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub meta: SnapshotMeta,
    components: BTreeMap<ComponentId, ComponentRow>,
    organisms: BTreeMap<OrganismId, OrganismRow>,
    datasets: BTreeMap<DatasetId, DatasetRow>,
    samples: BTreeMap<SampleId, SampleRow>,
    accessions: BTreeMap<AccessionId, AccessionRow>,
    next_ids: NextIds,

    #[serde(skip)]
    component_by_name: HashMap<String, ComponentId>,
    #[serde(skip)]
    organism_by_abbrev: HashMap<String, OrganismId>,
    // One latest dataset per (organism, name); retired rows are unconstrained.
    #[serde(skip)]
    latest_by_key: HashMap<(OrganismId, String), DatasetId>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            meta: SnapshotMeta {
                schema_version: SCHEMA_VERSION,
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            components: BTreeMap::new(),
            organisms: BTreeMap::new(),
            datasets: BTreeMap::new(),
            samples: BTreeMap::new(),
            accessions: BTreeMap::new(),
            next_ids: NextIds::default(),
            component_by_name: HashMap::new(),
            organism_by_abbrev: HashMap::new(),
            latest_by_key: HashMap::new(),
        }
    }

    /// Repopulates the secondary indexes from the tables. Must be called
    /// after deserializing a snapshot, since indexes are not persisted.
    pub fn rebuild_indexes(&mut self) {
        self.component_by_name.clear();
        self.organism_by_abbrev.clear();
        self.latest_by_key.clear();
        for row in self.components.values() {
            self.component_by_name.insert(row.name.clone(), row.id);
        }
        for row in self.organisms.values() {
            self.organism_by_abbrev.insert(row.abbrev.clone(), row.id);
        }
        for row in self.datasets.values() {
            if row.latest {
                self.latest_by_key
                    .insert((row.organism_id, row.name.clone()), row.id);
            }
        }
    }

    // --- components ---

    pub fn insert_component(&mut self, name: &str) -> Result<ComponentId, RegistryError> {
        if self.component_by_name.contains_key(name) {
            return Err(RegistryError::DuplicateComponent(name.to_string()));
        }
        self.next_ids.component += 1;
        let id = ComponentId(self.next_ids.component);
        self.components.insert(
            id,
            ComponentRow {
                id,
                name: name.to_string(),
            },
        );
        self.component_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn component(&self, id: ComponentId) -> Option<&ComponentRow> {
        self.components.get(&id)
    }

    pub fn component_by_name(&self, name: &str) -> Option<&ComponentRow> {
        self.component_by_name
            .get(name)
            .and_then(|id| self.components.get(id))
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentRow> {
        self.components.values()
    }

    /// Deletes a component and, transitively, its organisms, datasets,
    /// samples and accessions.
    pub fn remove_component(&mut self, id: ComponentId) {
        let children: Vec<OrganismId> = self
            .organisms
            .values()
            .filter(|row| row.component_id == id)
            .map(|row| row.id)
            .collect();
        for organism_id in children {
            self.remove_organism(organism_id);
        }
        if let Some(row) = self.components.remove(&id) {
            self.component_by_name.remove(&row.name);
        }
    }

    // --- organisms ---

    pub fn insert_organism(
        &mut self,
        abbrev: &str,
        component_id: ComponentId,
    ) -> Result<OrganismId, RegistryError> {
        if self.organism_by_abbrev.contains_key(abbrev) {
            return Err(RegistryError::DuplicateOrganism(abbrev.to_string()));
        }
        if !self.components.contains_key(&component_id) {
            return Err(RegistryError::Referential {
                child: "organism",
                parent: "component",
                id: component_id.0,
            });
        }
        self.next_ids.organism += 1;
        let id = OrganismId(self.next_ids.organism);
        self.organisms.insert(
            id,
            OrganismRow {
                id,
                abbrev: abbrev.to_string(),
                component_id,
            },
        );
        self.organism_by_abbrev.insert(abbrev.to_string(), id);
        Ok(id)
    }

    pub fn organism(&self, id: OrganismId) -> Option<&OrganismRow> {
        self.organisms.get(&id)
    }

    pub fn organism_by_abbrev(&self, abbrev: &str) -> Option<&OrganismRow> {
        self.organism_by_abbrev
            .get(abbrev)
            .and_then(|id| self.organisms.get(id))
    }

    pub fn organisms(&self) -> impl Iterator<Item = &OrganismRow> {
        self.organisms.values()
    }

    pub fn remove_organism(&mut self, id: OrganismId) {
        let children: Vec<DatasetId> = self
            .datasets
            .values()
            .filter(|row| row.organism_id == id)
            .map(|row| row.id)
            .collect();
        for dataset_id in children {
            self.remove_dataset(dataset_id);
        }
        if let Some(row) = self.organisms.remove(&id) {
            self.organism_by_abbrev.remove(&row.abbrev);
        }
    }

    // --- datasets ---

    pub fn insert_dataset(
        &mut self,
        name: &str,
        organism_id: OrganismId,
        release: i64,
        no_spliced: bool,
    ) -> Result<DatasetId, RegistryError> {
        let Some(organism) = self.organisms.get(&organism_id) else {
            return Err(RegistryError::Referential {
                child: "dataset",
                parent: "organism",
                id: organism_id.0,
            });
        };
        let key = (organism_id, name.to_string());
        if self.latest_by_key.contains_key(&key) {
            return Err(RegistryError::DuplicateDataset {
                organism: organism.abbrev.clone(),
                name: name.to_string(),
            });
        }
        self.next_ids.dataset += 1;
        let id = DatasetId(self.next_ids.dataset);
        self.datasets.insert(
            id,
            DatasetRow {
                id,
                name: name.to_string(),
                organism_id,
                release,
                retired: 0,
                latest: true,
                no_spliced,
            },
        );
        self.latest_by_key.insert(key, id);
        Ok(id)
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&DatasetRow> {
        self.datasets.get(&id)
    }

    pub fn latest_dataset(&self, organism_id: OrganismId, name: &str) -> Option<&DatasetRow> {
        self.latest_by_key
            .get(&(organism_id, name.to_string()))
            .and_then(|id| self.datasets.get(id))
    }

    pub fn datasets(&self) -> impl Iterator<Item = &DatasetRow> {
        self.datasets.values()
    }

    pub fn datasets_of(&self, organism_id: OrganismId) -> impl Iterator<Item = &DatasetRow> {
        self.datasets
            .values()
            .filter(move |row| row.organism_id == organism_id)
    }

    /// Clears the latest flag and stamps the retirement release. The row is
    /// kept for audit history. `release: None` leaves the marker untouched.
    pub fn retire_dataset(&mut self, id: DatasetId, release: Option<i64>) {
        let Some(row) = self.datasets.get_mut(&id) else {
            return;
        };
        if row.latest {
            self.latest_by_key.remove(&(row.organism_id, row.name.clone()));
        }
        row.latest = false;
        if let Some(release) = release {
            row.retired = release;
        }
    }

    pub fn remove_dataset(&mut self, id: DatasetId) {
        let children: Vec<SampleId> = self
            .samples
            .values()
            .filter(|row| row.dataset_id == id)
            .map(|row| row.id)
            .collect();
        for sample_id in children {
            self.accessions
                .retain(|_, row| row.sample_id != sample_id);
            self.samples.remove(&sample_id);
        }
        if let Some(row) = self.datasets.remove(&id) {
            if row.latest {
                self.latest_by_key.remove(&(row.organism_id, row.name));
            }
        }
    }

    // --- samples and accessions ---

    pub fn insert_sample(
        &mut self,
        name: &str,
        dataset_id: DatasetId,
        trim_reads: bool,
    ) -> Result<SampleId, RegistryError> {
        if !self.datasets.contains_key(&dataset_id) {
            return Err(RegistryError::Referential {
                child: "sample",
                parent: "dataset",
                id: dataset_id.0,
            });
        }
        self.next_ids.sample += 1;
        let id = SampleId(self.next_ids.sample);
        self.samples.insert(
            id,
            SampleRow {
                id,
                name: name.to_string(),
                dataset_id,
                trim_reads,
            },
        );
        Ok(id)
    }

    pub fn samples_of(&self, dataset_id: DatasetId) -> impl Iterator<Item = &SampleRow> {
        self.samples
            .values()
            .filter(move |row| row.dataset_id == dataset_id)
    }

    pub fn insert_accession(
        &mut self,
        sra_id: &str,
        sample_id: SampleId,
    ) -> Result<AccessionId, RegistryError> {
        if !self.samples.contains_key(&sample_id) {
            return Err(RegistryError::Referential {
                child: "accession",
                parent: "sample",
                id: sample_id.0,
            });
        }
        self.next_ids.accession += 1;
        let id = AccessionId(self.next_ids.accession);
        self.accessions.insert(
            id,
            AccessionRow {
                id,
                sra_id: sra_id.to_string(),
                sample_id,
            },
        );
        Ok(id)
    }

    pub fn accessions_of(&self, sample_id: SampleId) -> impl Iterator<Item = &AccessionRow> {
        self.accessions
            .values()
            .filter(move |row| row.sample_id == sample_id)
    }
}
