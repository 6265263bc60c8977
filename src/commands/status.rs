use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::registry::Registry;

/// Read-side view of an import run manifest; every field is optional so
/// older or partial manifests still render.
#[derive(Debug, Deserialize)]
struct ImportManifestSummary {
    run_id: Option<String>,
    status: Option<String>,
    updated_at: Option<String>,
    absence_scope: Option<String>,
    source: Option<ManifestSource>,
    counts: Option<ManifestCounts>,
}

#[derive(Debug, Deserialize)]
struct ManifestSource {
    path: Option<String>,
    format: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestCounts {
    total: Option<usize>,
    new: Option<usize>,
    updated: Option<usize>,
    unchanged: Option<usize>,
    disabled: Option<usize>,
    reenabled: Option<usize>,
    protected: Option<usize>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.cache_root.join("callbook_registry.sqlite"));

    info!(cache_root = %args.cache_root.display(), "status requested");

    match latest_manifest_path(&manifest_dir)? {
        Some(path) => report_manifest(&path)?,
        None => warn!(dir = %manifest_dir.display(), "no import manifests found"),
    }

    if db_path.exists() {
        let registry = Registry::open(&db_path)?;
        let total = registry.count_all().unwrap_or(0);
        let enabled = registry.count_enabled().unwrap_or(0);

        info!(
            path = %db_path.display(),
            operators = total,
            enabled,
            disabled = total - enabled,
            "registry status"
        );

        for (country, count) in registry.counts_by_country()?.into_iter().take(5) {
            let country = if country.is_empty() {
                "(unknown)".to_string()
            } else {
                country
            };
            info!(country = %country, operators = count, "registry country share");
        }
    } else {
        warn!(path = %db_path.display(), "registry database missing");
    }

    Ok(())
}

fn report_manifest(path: &Path) -> Result<()> {
    let raw =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: ImportManifestSummary = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let source = manifest.source.unwrap_or(ManifestSource {
        path: None,
        format: None,
        country: None,
    });

    info!(
        run_id = %manifest.run_id.unwrap_or_default(),
        status = %manifest.status.unwrap_or_default(),
        updated_at = %manifest.updated_at.unwrap_or_default(),
        source = %source.path.unwrap_or_default(),
        format = %source.format.unwrap_or_default(),
        country = %source.country.unwrap_or_default(),
        absence_scope = %manifest.absence_scope.unwrap_or_default(),
        "latest import manifest"
    );

    if let Some(counts) = manifest.counts {
        info!(
            total = counts.total.unwrap_or_default(),
            new = counts.new.unwrap_or_default(),
            updated = counts.updated.unwrap_or_default(),
            unchanged = counts.unchanged.unwrap_or_default(),
            disabled = counts.disabled.unwrap_or_default(),
            reenabled = counts.reenabled.unwrap_or_default(),
            protected = counts.protected.unwrap_or_default(),
            "latest import counters"
        );
    }

    Ok(())
}

/// Run ids embed a compact UTC stamp, so the lexicographically greatest
/// manifest filename is the most recent run.
fn latest_manifest_path(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let is_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("import_run_") && name.ends_with(".json"))
            .unwrap_or(false);
        if !is_manifest {
            continue;
        }

        if latest.as_ref().map(|current| path > *current).unwrap_or(true) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_manifest_path_picks_the_newest_stamp() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("import_run_20250101T000000Z.json"), "{}").unwrap();
        fs::write(dir.path().join("import_run_20250813T120000Z.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let latest = latest_manifest_path(dir.path()).unwrap().unwrap();
        assert!(latest
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("20250813T120000Z"));
    }

    #[test]
    fn latest_manifest_path_handles_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(latest_manifest_path(&missing).unwrap().is_none());
    }
}
