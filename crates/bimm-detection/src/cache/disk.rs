//! # On-Disk Download Cache
//!
//! Resources live at ``{cache_root}/{root_cache_key}/{resource...}``.
//! A present file is a hit; it is never re-validated, so only complete,
//! successful downloads are ever moved into place.

use anyhow::{Context, bail};
use burn::config::Config;
use reqwest::blocking::Client;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// On-disk cache layout.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Directory name under the cache root.
    #[config(default = "\"bimm-detection\".to_string()")]
    pub root_cache_key: String,

    /// Cache root; ``~/.cache`` when unset.
    #[config(default = "None")]
    pub cache_root: Option<String>,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// The cache directory. Not created.
    pub fn cache_dir(&self) -> anyhow::Result<PathBuf> {
        let root = match &self.cache_root {
            Some(root) => PathBuf::from(root),
            None => dirs::home_dir()
                .context("no home directory for the default cache root")?
                .join(".cache"),
        };
        Ok(root.join(&self.root_cache_key))
    }

    /// The path of a resource. Nothing is created.
    pub fn resource_path(
        &self,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let mut path = self.cache_dir()?;
        path.extend(resource);
        Ok(path)
    }

    /// The path of a resource, with its parent directory created.
    pub fn prepare_resource_path(
        &self,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_path(resource)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        Ok(path)
    }

    /// Read-through fetch of `url` into the cache.
    ///
    /// # Returns
    ///
    /// The local path of the resource.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
        progress: bool,
    ) -> anyhow::Result<PathBuf> {
        let path = self.prepare_resource_path(resource)?;
        if path.exists() {
            tracing::debug!(path = %path.display(), "weights cache hit");
        } else {
            let client = Client::builder()
                .build()
                .context("building the http client")?;
            download_into(&client, url, &path, progress)?;
        }
        Ok(path)
    }
}

/// Byte count between progress events when the length is unknown.
const UNSIZED_PROGRESS_STEP: u64 = 16 << 20;

/// Emits `info!` download progress, every 10% or every
/// [`UNSIZED_PROGRESS_STEP`] bytes.
struct ProgressLog<'a> {
    url: &'a str,
    total: Option<u64>,
    received: u64,
    next_report: u64,
}

impl<'a> ProgressLog<'a> {
    fn new(
        url: &'a str,
        total: Option<u64>,
    ) -> Self {
        let mut log = Self {
            url,
            total,
            received: 0,
            next_report: 0,
        };
        log.next_report = log.step();
        log
    }

    fn step(&self) -> u64 {
        self.total
            .map_or(UNSIZED_PROGRESS_STEP, |total| (total / 10).max(1))
    }

    fn advance(
        &mut self,
        bytes: u64,
    ) {
        self.received += bytes;
        if self.received < self.next_report {
            return;
        }
        self.next_report = self.received + self.step();
        match self.total {
            Some(total) => tracing::info!(
                url = self.url,
                received = self.received,
                total,
                percent = self.received * 100 / total.max(1),
                "download progress"
            ),
            None => tracing::info!(url = self.url, received = self.received, "download progress"),
        }
    }
}

/// Download `url` to `path`.
///
/// The body is streamed into a ``.part`` sibling, which is renamed over
/// `path` only after the whole body is written. On any failure (transport,
/// non-success status, I/O) the ``.part`` file is removed and `path` is
/// left untouched.
///
/// With `progress`, byte counts are reported as `info!` events.
pub fn download_into(
    client: &Client,
    url: &str,
    path: &Path,
    progress: bool,
) -> anyhow::Result<()> {
    if path.file_name().is_none() {
        bail!("cache path has no file name: {}", path.display());
    }
    let staging = path.with_extension("part");

    if progress {
        tracing::info!(url, path = %path.display(), "downloading weights");
    } else {
        tracing::debug!(url, path = %path.display(), "downloading weights");
    }

    let received = match stream_to_file(client, url, &staging, progress) {
        Ok(received) => received,
        Err(err) => {
            let _ignored = fs::remove_file(&staging);
            return Err(err);
        }
    };
    tracing::debug!(url, bytes = received, "download complete");

    fs::rename(&staging, path)
        .with_context(|| format!("moving {} into place", staging.display()))
}

fn stream_to_file(
    client: &Client,
    url: &str,
    staging: &Path,
    progress: bool,
) -> anyhow::Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()
        .with_context(|| format!("fetching {url}"))?;

    let mut log = progress.then(|| ProgressLog::new(url, response.content_length()));
    let mut file =
        fs::File::create(staging).with_context(|| format!("creating {}", staging.display()))?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut received = 0u64;
    loop {
        let n = response
            .read(&mut buf)
            .with_context(|| format!("reading {url}"))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("writing {}", staging.display()))?;
        received += n as u64;
        if let Some(log) = log.as_mut() {
            log.advance(n as u64);
        }
    }
    file.flush()
        .with_context(|| format!("writing {}", staging.display()))?;

    Ok(received)
}
