use crate::{EpochReport, FeatureStore, StoreError};
use log::*;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

/// Writes the per-epoch verification reports as pretty printed JSON.
pub fn write_reports(writer: impl Write, reports: &[EpochReport]) -> Result<(), StoreError> {
    serde_json::to_writer_pretty(writer, reports)?;
    Ok(())
}

pub fn read_reports(reader: impl Read) -> Result<Vec<EpochReport>, StoreError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Saves the feature store to `path`, replacing any existing file.
pub fn save_store(store: &FeatureStore, path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    store.save(&mut writer)?;
    writer.flush()?;
    info!("saved {} epochs to {}", store.len(), path.display());
    Ok(())
}

pub fn load_store(path: impl AsRef<Path>) -> Result<FeatureStore, StoreError> {
    let path = path.as_ref();
    let store = FeatureStore::load(BufReader::new(File::open(path)?))?;
    info!("loaded {} epochs from {}", store.len(), path.display());
    Ok(store)
}

pub fn save_reports(reports: &[EpochReport], path: impl AsRef<Path>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_reports(&mut writer, reports)?;
    writer.flush()?;
    info!("saved {} epoch reports to {}", reports.len(), path.display());
    Ok(())
}
