//! Remote fetch collaborator.
//!
//! Materialises a remote source (git repository, HTTP archive, or registry
//! module) inside the run cache and returns the local directory holding the
//! fetched tree.

use std::path::{Path, PathBuf};
use std::process::Command;

use terramap_common::error::{Result, TerramapError};

use crate::address::{SourceAddress, parse_address};
use crate::workspace::{module_cache_path, sanitize_source};

/// Maximum number of registry indirections followed for one source.
const MAX_REDIRECTS: usize = 3;

/// Fetches a source into a cache root and returns its local directory.
pub trait Fetcher {
    /// Fetches `source` below `cache_root`.
    ///
    /// When `module_name` is given the tree lands in that module's cache
    /// directory; otherwise in a directory named after the source.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::Fetch`] if the source is unreachable or invalid.
    fn fetch(&self, source: &str, cache_root: &Path, module_name: Option<&str>) -> Result<PathBuf>;
}

/// Returns the directory a source is fetched into.
#[must_use]
pub fn target_dir(cache_root: &Path, source: &str, module_name: Option<&str>) -> PathBuf {
    module_name.map_or_else(
        || cache_root.join(sanitize_source(source)),
        |name| module_cache_path(cache_root, name, source),
    )
}

/// Default fetcher backed by `git`, HTTP downloads, and the module registry.
#[derive(Debug)]
pub struct RemoteFetcher {
    client: reqwest::blocking::Client,
}

impl RemoteFetcher {
    /// Creates a fetcher with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("terramap/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| TerramapError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    fn fetch_address(
        &self,
        source: &str,
        address: &SourceAddress,
        target: &Path,
        depth: usize,
    ) -> Result<PathBuf> {
        tracing::info!(source, address = %address, target = %target.display(), "fetching source");
        let root = match address {
            SourceAddress::Local(path) => {
                return Err(TerramapError::fetch(
                    source,
                    format!("local path {path} cannot be fetched remotely"),
                ));
            }
            SourceAddress::Git { url, reference, .. } => {
                clone_repository(source, url, reference.as_deref(), target)?;
                target.to_path_buf()
            }
            SourceAddress::Archive { url, .. } => {
                self.download_archive(source, url, target)?;
                target.to_path_buf()
            }
            SourceAddress::Registry {
                host,
                namespace,
                name,
                provider,
                ..
            } => {
                if depth >= MAX_REDIRECTS {
                    return Err(TerramapError::fetch(source, "too many registry redirects"));
                }
                let location = self.registry_location(source, host, namespace, name, provider)?;
                let inner = parse_address(&location)?;
                self.fetch_address(source, &inner, target, depth + 1)?
            }
        };
        with_subdir(source, root, address.subdir())
    }

    /// Resolves a registry module to its download location.
    fn registry_location(
        &self,
        source: &str,
        host: &str,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<String> {
        let url = format!("https://{host}/v1/modules/{namespace}/{name}/{provider}/download");
        tracing::debug!(url, "querying module registry");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| TerramapError::fetch(source, format!("registry request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(TerramapError::fetch(
                source,
                format!("HTTP {} from {url}", response.status()),
            ));
        }
        response
            .headers()
            .get("X-Terraform-Get")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TerramapError::fetch(source, "registry response has no X-Terraform-Get"))
    }

    /// Downloads and unpacks a gzip tarball.
    fn download_archive(&self, source: &str, url: &str, target: &Path) -> Result<()> {
        if has_entries(target) {
            tracing::debug!(target = %target.display(), "archive already unpacked");
            return Ok(());
        }
        let lower = url.to_lowercase();
        if !(lower.ends_with(".tar.gz") || lower.ends_with(".tgz")) {
            return Err(TerramapError::fetch(source, "only .tar.gz and .tgz archives are supported"));
        }
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TerramapError::fetch(source, format!("failed to download {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(TerramapError::fetch(
                source,
                format!("HTTP {} downloading {url}", response.status()),
            ));
        }
        let bytes = response.bytes().map_err(|e| {
            TerramapError::fetch(source, format!("failed to read response body from {url}: {e}"))
        })?;

        std::fs::create_dir_all(target).map_err(|e| TerramapError::io(target, e))?;
        let decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut archive = tar::Archive::new(decoder);
        archive
            .unpack(target)
            .map_err(|e| TerramapError::io(target, e))?;
        tracing::info!(url, bytes = bytes.len(), "archive unpacked");
        Ok(())
    }
}

impl Fetcher for RemoteFetcher {
    fn fetch(&self, source: &str, cache_root: &Path, module_name: Option<&str>) -> Result<PathBuf> {
        let target = target_dir(cache_root, source, module_name);
        let address = parse_address(source)?;
        self.fetch_address(source, &address, &target, 0)
    }
}

/// Shallow-clones a git repository into `target`, reusing an existing clone.
fn clone_repository(source: &str, url: &str, reference: Option<&str>, target: &Path) -> Result<()> {
    if has_entries(target) {
        tracing::debug!(target = %target.display(), "repository already cloned");
        return Ok(());
    }
    let git = which::which("git")
        .map_err(|_| TerramapError::fetch(source, "git executable not found on PATH"))?;

    let mut cmd = Command::new(git);
    let _ = cmd.args(["clone", "--quiet", "--depth", "1"]);
    if let Some(r) = reference {
        let _ = cmd.args(["--branch", r]);
    }
    let _ = cmd.arg(url).arg(target);

    let output = cmd.output().map_err(|e| TerramapError::io("git", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TerramapError::fetch(
            source,
            format!("git clone failed: {}", stderr.trim()),
        ));
    }
    Ok(())
}

fn with_subdir(source: &str, root: PathBuf, subdir: Option<&str>) -> Result<PathBuf> {
    let Some(sub) = subdir else {
        return Ok(root);
    };
    let path = root.join(sub);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(TerramapError::fetch(
            source,
            format!("subdirectory {sub} not found in fetched tree"),
        ))
    }
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dir_uses_module_cache_path_for_modules() {
        let root = Path::new("/cache");
        assert_eq!(
            target_dir(root, "github.com/acme/vpc", Some("vpc")),
            Path::new("/cache/;vpc;github.com_acme_vpc")
        );
    }

    #[test]
    fn target_dir_uses_sanitized_source_without_module() {
        let root = Path::new("/cache");
        assert_eq!(
            target_dir(root, "https://github.com/acme/infra", None),
            Path::new("/cache/https:__github.com_acme_infra")
        );
    }

    #[test]
    fn local_sources_are_not_fetchable() {
        let fetcher = RemoteFetcher::new().expect("client");
        let dir = tempfile::tempdir().expect("tempdir");
        let err = fetcher
            .fetch("./modules/vpc", dir.path(), Some("vpc"))
            .unwrap_err();
        assert!(matches!(err, TerramapError::Fetch { .. }));
    }

    #[test]
    fn with_subdir_requires_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("modules/vpc")).expect("mkdir");
        let ok = with_subdir("src", dir.path().to_path_buf(), Some("modules/vpc")).expect("subdir");
        assert!(ok.ends_with("modules/vpc"));
        assert!(with_subdir("src", dir.path().to_path_buf(), Some("missing")).is_err());
    }

    #[test]
    fn existing_clone_is_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.tf"), "").expect("write");
        // No network access or git binary needed when the target is populated.
        clone_repository("src", "https://github.com/acme/none.git", None, dir.path())
            .expect("reuse");
    }
}
