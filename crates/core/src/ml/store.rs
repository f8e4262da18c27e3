//! Artifact persistence: trained model sets as JSON on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::ml::train::ArtifactSet;

const ARTIFACT_FILE: &str = "risk_models.json";

pub fn artifact_path(model_dir: &Path) -> PathBuf {
    model_dir.join(ARTIFACT_FILE)
}

/// Write atomically: serialize to a sibling temp file, then rename over the
/// previous set so a crash mid-write never leaves a truncated file behind.
pub fn save(model_dir: &Path, artifacts: &ArtifactSet) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("creating model directory {}", model_dir.display()))?;

    let path = artifact_path(model_dir);
    let tmp = path.with_extension("json.tmp");

    let body = serde_json::to_vec(artifacts).context("serializing model artifacts")?;
    std::fs::write(&tmp, body)
        .with_context(|| format!("writing model artifacts to {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("installing model artifacts at {}", path.display()))?;

    tracing::info!(path = %path.display(), models = artifacts.models.len(), "model artifacts saved");
    Ok(path)
}

/// Load a previously saved set; `Ok(None)` when none exists yet.
pub fn load(model_dir: &Path) -> anyhow::Result<Option<ArtifactSet>> {
    let path = artifact_path(model_dir);
    if !path.exists() {
        return Ok(None);
    }
    let body = std::fs::read(&path)
        .with_context(|| format!("reading model artifacts from {}", path.display()))?;
    let artifacts = serde_json::from_slice(&body)
        .with_context(|| format!("parsing model artifacts at {}", path.display()))?;
    Ok(Some(artifacts))
}
