use std::path::Path;

use anyhow::{Context, Result};

/// Cascade files the classifier backends expect next to the service.
const MODEL_SOURCES: &[(&str, &str)] = &[
    (
        "haarcascade_frontalface_default.xml",
        "https://raw.githubusercontent.com/opencv/opencv/master/data/haarcascades/haarcascade_frontalface_default.xml",
    ),
    (
        "palm.xml",
        "https://github.com/Aravindlivewire/Opencv/raw/master/haarcascade/palm.xml",
    ),
];

/// Fetch the default detector model files into `dir`, overwriting stale
/// copies. Returns the file names written.
pub(crate) async fn download_default_models(dir: &Path) -> Result<Vec<String>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create model dir {}", dir.display()))?;

    let mut written = Vec::with_capacity(MODEL_SOURCES.len());
    for (name, url) in MODEL_SOURCES {
        let response = reqwest::get(*url)
            .await
            .with_context(|| format!("fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("fetch {url}"))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;

        let path = dir.join(name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        log::info!("downloaded {} ({} bytes)", path.display(), body.len());
        written.push(name.to_string());
    }
    Ok(written)
}
