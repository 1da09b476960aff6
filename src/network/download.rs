// file: src/network/download.rs
// version: 1.3.0
// guid: b3c4d5e6-f7a8-9012-3456-789012bcde34

//! HTTP download with progress tracking and archive extraction

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{PrepError, Result};

/// HTTP client for fetching the source bundle
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dietpi-prep/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| PrepError::network(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }

    /// Download a file, rendering a progress bar on the terminal
    pub async fn fetch_with_progress(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading: {url}");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PrepError::network(format!(
                "download of {url} failed with status {}",
                response.status()
            )));
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        pb.finish_and_clear();

        info!("Downloaded to: {}", dest.display());
        Ok(())
    }

    /// Whether a URL answers a HEAD request with a success status
    ///
    /// Used to validate repository owner and branch before committing to
    /// the download. Network errors read as "not reachable".
    pub async fn verify_url(&self, url: &str) -> bool {
        debug!("probing {url}");
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Unpack a gzip-compressed tarball into a directory
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    debug!("extracting {} to {}", archive.display(), dest.display());
    let file = File::open(archive)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest).map_err(|e| {
        PrepError::network(format!(
            "failed to unpack {}: {e}",
            archive.display()
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn make_bundle(dir: &Path) -> std::path::PathBuf {
        // Build a small DietPi-master/ shaped tarball.
        let archive_path = dir.join("bundle.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let tree = dir.join("DietPi-master");
        std::fs::create_dir_all(tree.join("dietpi")).unwrap();
        std::fs::write(tree.join("dietpi.txt"), "AUTO_SETUP_LOCALE=C.UTF-8\n").unwrap();
        std::fs::write(tree.join("dietpi/dietpi-software"), "#!/bin/bash\n").unwrap();
        builder.append_dir_all("DietPi-master", &tree).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    #[test]
    fn test_extract_tar_gz_roundtrip() {
        let dir = TempDir::new().unwrap();
        let archive = make_bundle(dir.path());

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        extract_tar_gz(&archive, &dest).unwrap();

        assert!(dest.join("DietPi-master/dietpi.txt").is_file());
        assert!(dest.join("DietPi-master/dietpi/dietpi-software").is_file());
    }

    #[test]
    fn test_extract_missing_archive_fails() {
        let dir = TempDir::new().unwrap();
        let result = extract_tar_gz(&dir.path().join("nope.tar.gz"), dir.path());
        assert!(result.is_err());
    }
}
