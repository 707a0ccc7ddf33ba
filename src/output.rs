use std::io::{self, Write};

use serde::Serialize;

use crate::registry::{
    DatasetEntry, DatasetLoadReport, OrganismEntry, OrganismLoadReport, RemapReport,
};
use crate::schema::ComponentRow;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_components(rows: &[ComponentRow]) -> io::Result<()> {
        Self::print_json(rows)
    }

    pub fn print_organisms(entries: &[OrganismEntry]) -> io::Result<()> {
        Self::print_json(entries)
    }

    pub fn print_datasets(entries: &[DatasetEntry]) -> io::Result<()> {
        Self::print_json(entries)
    }

    pub fn print_organism_load(report: &OrganismLoadReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_dataset_load(report: &DatasetLoadReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_remap(report: &RemapReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
