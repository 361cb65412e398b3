//! Loading of the session record and the catalog.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;
use wave_defence_core::{Catalog, CatalogRecord, SessionConfig};

const DEFAULT_SESSION: &str = include_str!("../data/session.toml");
const DEFAULT_CATALOG: &str = include_str!("../data/catalog.toml");

/// Reads the session record from `path`, or the bundled record.
pub(crate) fn load_session(path: Option<&Path>) -> Result<SessionConfig> {
    let config: SessionConfig = load(path, DEFAULT_SESSION, "session record")?;
    config.validate().context("invalid session record")?;
    Ok(config)
}

/// Reads and validates the catalog from `path`, or the bundled catalog.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let record: CatalogRecord = load(path, DEFAULT_CATALOG, "catalog")?;
    record.into_catalog().context("invalid catalog")
}

fn load<T: DeserializeOwned>(path: Option<&Path>, bundled: &str, what: &str) -> Result<T> {
    let Some(path) = path else {
        return toml::from_str(bundled).with_context(|| format!("parse bundled {what}"));
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {what}: {}", path.display()))?;
    let value =
        toml::from_str(&text).with_context(|| format!("parse {what}: {}", path.display()))?;
    info!(path = %path.display(), "{what} loaded");
    Ok(value)
}
