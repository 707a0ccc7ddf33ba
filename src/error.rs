use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("no component named {0}")]
    ComponentNotFound(String),

    #[error("no organism with abbreviation {0}")]
    OrganismNotFound(String),

    #[error("no latest dataset named {name} for organism {organism}")]
    DatasetNotFound { organism: String, name: String },

    #[error("component {0} already exists")]
    DuplicateComponent(String),

    #[error("organism abbreviation {0} already exists")]
    DuplicateOrganism(String),

    #[error("a latest dataset named {name} already exists for organism {organism}")]
    DuplicateDataset { organism: String, name: String },

    #[error("cannot add organism {organism} for unknown component {component}")]
    OrganismComponentMissing { organism: String, component: String },

    #[error("{path}:{line}: expected 2 tab-separated fields, found {found}")]
    InvalidFormat {
        path: Utf8PathBuf,
        line: usize,
        found: usize,
    },

    #[error("dataset document {path} failed validation: {message}")]
    SchemaError { path: Utf8PathBuf, message: String },

    #[error("{child} row references a missing {parent} row (id {id})")]
    Referential {
        child: &'static str,
        parent: &'static str,
        id: i64,
    },

    #[error("registry database not found: {0}")]
    DatabaseNotFound(Utf8PathBuf),

    #[error("registry database {path} is corrupt: {message}")]
    CorruptDatabase { path: Utf8PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
