//! Archive download and extraction

use std::fs::{self, File};
use std::io;
use std::path::Path;

use futures::StreamExt;
use reqwest::{StatusCode, Url, header::LOCATION, redirect};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::HostRewrite;
use crate::error::ArchiveError;

/// File name of a downloaded archive inside its version directory
pub const ARCHIVE_FILE_NAME: &str = "ext.xpi";

/// Redirect hops followed before a download is given up
pub const MAX_REDIRECTS: usize = 32;

/// Downloads package archives, following redirects manually
///
/// Redirects are followed by hand so the host rewrite is applied to every
/// hop, not only to the first request.
pub struct ArchiveFetcher {
    client: reqwest::Client,
    rewrite: Option<HostRewrite>,
}

impl ArchiveFetcher {
    pub fn new(rewrite: Option<HostRewrite>) -> Result<Self, ArchiveError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("addon-compat/", env!("CARGO_PKG_VERSION")))
                .redirect(redirect::Policy::none())
                .build()?,
            rewrite,
        })
    }

    fn rewrite(&self, url: &str) -> String {
        match &self.rewrite {
            Some(rewrite) => rewrite.apply(url),
            None => url.to_string(),
        }
    }

    /// Download `url` to `dest`, returning the number of bytes written
    ///
    /// A partially written file is removed when the transfer fails.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, ArchiveError> {
        let response = self.resolve(url).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match write_body(response, dest).await {
            Ok(size) => {
                debug!("Downloaded {} bytes to {:?}", size, dest);
                Ok(size)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    debug!("Failed to remove partial download {:?}: {}", dest, remove_err);
                }
                Err(e)
            }
        }
    }

    /// Follow redirects until a 200 response is reached
    async fn resolve(&self, url: &str) -> Result<reqwest::Response, ArchiveError> {
        let mut current =
            Url::parse(&self.rewrite(url)).map_err(|_| ArchiveError::BadRedirect(url.to_string()))?;

        for _ in 0..=MAX_REDIRECTS {
            debug!("GET {}", current);
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if status == StatusCode::OK {
                return Ok(response);
            }
            if !status.is_redirection() {
                return Err(ArchiveError::Status {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| ArchiveError::Status {
                    status: status.as_u16(),
                    url: current.to_string(),
                })?;
            let next = current
                .join(location)
                .map_err(|_| ArchiveError::BadRedirect(location.to_string()))?;
            let next = self.rewrite(next.as_str());
            current = Url::parse(&next).map_err(|_| ArchiveError::BadRedirect(next.clone()))?;
        }

        Err(ArchiveError::TooManyRedirects(url.to_string()))
    }
}

async fn write_body(response: reqwest::Response, dest: &Path) -> Result<u64, ArchiveError> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Extract `archive` into `dest`, returning the number of files written
///
/// `dest` is wiped first. Directory entries are skipped (parents are created
/// on demand) and entries whose path would leave `dest` are ignored.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry outside of {:?}: {}", dest, entry.name());
            continue;
        };

        let outpath = dest.join(relative);
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;
        extracted += 1;
    }

    Ok(extracted)
}
