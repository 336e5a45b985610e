//! System-wide constants and well-known file names.

/// Extension of primary Terraform configuration files.
pub const TF_EXTENSION: &str = ".tf";

/// Suffix of variable files Terraform loads automatically.
pub const AUTO_TFVARS_SUFFIX: &str = "auto.tfvars";

/// File names recognised as architecture annotation files.
pub const ANNOTATION_FILE_NAMES: [&str; 2] = ["architecture.yml", "architecture.yaml"];

/// Hosting services whose HTTP(S) URLs are treated as remote repositories.
pub const REMOTE_HOSTS: [&str; 3] = ["github", "bitbucket", "gitlab"];

/// Separator used when building module cache directory names.
pub const CACHE_SEPARATOR: char = ';';

/// Path prefixes that mark a module source as local and relative.
pub const LOCAL_SOURCE_MARKERS: [&str; 2] = [".", "\\"];

/// Default Terraform module registry host.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// Subdirectory of the run workspace that holds fetched modules.
pub const MODULES_DIR: &str = "modules";

/// Subdirectory of the run workspace that holds salvage copies.
pub const SALVAGE_DIR: &str = "salvage";

/// Application name used in CLI output and temporary directory names.
pub const APP_NAME: &str = "terramap";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "tmap";

/// Returns `true` if the file name is a configuration file we parse.
#[must_use]
pub fn is_config_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(TF_EXTENSION) || lower.ends_with(AUTO_TFVARS_SUFFIX)
}

/// Returns `true` if the file name is a recognised annotation file.
#[must_use]
pub fn is_annotation_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ANNOTATION_FILE_NAMES.iter().any(|name| lower.ends_with(name))
}

/// Returns `true` if the source string names a remote repository.
#[must_use]
pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("http") && REMOTE_HOSTS.iter().any(|host| source.contains(host))
}

/// Returns `true` if the module source is a local relative path.
#[must_use]
pub fn is_local_module_source(source: &str) -> bool {
    LOCAL_SOURCE_MARKERS
        .iter()
        .any(|marker| source.starts_with(marker))
}
