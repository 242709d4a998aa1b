use crate::config::FetchConfig;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Download a source URL into the staging directory.
///
/// HTTPS only, bounded redirects, and a size cap enforced while streaming so
/// an oversized body is abandoned rather than buffered.
pub async fn fetch_to(url: &str, staging: &Path, config: &FetchConfig) -> Result<PathBuf> {
    if !url.starts_with("https://") {
        bail!("only https:// sources are fetched; got {url}");
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("Server rejected {url}"))?;

    if let Some(length) = response.content_length() {
        if length > config.max_bytes {
            bail!("{url} is {length} bytes, above the {} byte limit", config.max_bytes);
        }
    }

    let name = file_name_from_url(url);
    let dest = staging.join(&name);

    let mut body = Vec::new();
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() as u64 > config.max_bytes {
            bail!("{url} exceeded the {} byte download limit", config.max_bytes);
        }
    }

    tokio::fs::write(&dest, &body)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(dest)
}

/// Last path segment of the URL, defaulting when the URL ends in a slash
fn file_name_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}
