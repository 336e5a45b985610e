//! Terraform module source address parsing built on `nom`.
//!
//! Classifies a `source` attribute value into the fetch strategy that can
//! materialise it: local path, git repository, HTTP archive, or registry
//! module.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{all_consuming, rest},
    multi::separated_list1,
    sequence::preceded,
};
use terramap_common::constants::DEFAULT_REGISTRY_HOST;
use terramap_common::error::{Result, TerramapError};

/// Archive suffixes fetched over plain HTTP.
const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.gz", ".tgz"];

/// Hosts whose scheme-less shorthand means a git repository.
const GIT_SHORTHAND_HOSTS: [&str; 3] = ["github.com/", "bitbucket.org/", "gitlab.com/"];

/// A classified module source address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddress {
    /// Relative path on disk (`./modules/vpc`).
    Local(String),
    /// Git repository, optionally pinned to a ref and narrowed to a subdirectory.
    Git {
        /// Clone URL.
        url: String,
        /// Branch or tag from `?ref=`.
        reference: Option<String>,
        /// Subdirectory from the `//subdir` suffix.
        subdir: Option<String>,
    },
    /// HTTP(S) archive download.
    Archive {
        /// Archive URL.
        url: String,
        /// Subdirectory from the `//subdir` suffix.
        subdir: Option<String>,
    },
    /// Module registry address `[host/]namespace/name/provider`.
    Registry {
        /// Registry host.
        host: String,
        /// Module namespace.
        namespace: String,
        /// Module name.
        name: String,
        /// Target provider.
        provider: String,
        /// Subdirectory from the `//subdir` suffix.
        subdir: Option<String>,
    },
}

impl SourceAddress {
    /// Returns the `//subdir` component, if any.
    #[must_use]
    pub fn subdir(&self) -> Option<&str> {
        match self {
            Self::Local(_) => None,
            Self::Git { subdir, .. } | Self::Archive { subdir, .. } | Self::Registry { subdir, .. } => {
                subdir.as_deref()
            }
        }
    }
}

impl fmt::Display for SourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "local:{path}"),
            Self::Git { url, reference, .. } => match reference {
                Some(r) => write!(f, "git:{url}@{r}"),
                None => write!(f, "git:{url}"),
            },
            Self::Archive { url, .. } => write!(f, "archive:{url}"),
            Self::Registry {
                host,
                namespace,
                name,
                provider,
                ..
            } => write!(f, "registry:{host}/{namespace}/{name}/{provider}"),
        }
    }
}

/// Parses a module source string.
///
/// # Errors
///
/// Returns [`TerramapError::Fetch`] if the string matches no known form.
pub fn parse_address(source: &str) -> Result<SourceAddress> {
    let trimmed = source.trim();
    address(trimmed)
        .map(|(_, addr)| addr)
        .map_err(|_| TerramapError::fetch(source, "unrecognised module source address"))
}

fn address(input: &str) -> IResult<&str, SourceAddress> {
    alt((local, forced_git, ssh_git, http_url, shorthand_git, registry)).parse(input)
}

fn local(input: &str) -> IResult<&str, SourceAddress> {
    let _ = alt((tag("."), tag("\\"))).parse(input)?;
    Ok(("", SourceAddress::Local(input.to_string())))
}

fn forced_git(input: &str) -> IResult<&str, SourceAddress> {
    let (url, _) = tag("git::").parse(input)?;
    Ok(("", git_address(url)))
}

fn ssh_git(input: &str) -> IResult<&str, SourceAddress> {
    let _ = tag("git@").parse(input)?;
    Ok(("", git_address(input)))
}

fn http_url(input: &str) -> IResult<&str, SourceAddress> {
    let _ = alt((tag("https://"), tag("http://"))).parse(input)?;
    let (base, _) = split_query(input);
    let (repo, subdir) = split_subdir(base);
    let lower = repo.to_lowercase();
    if ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Ok((
            "",
            SourceAddress::Archive {
                url: repo.to_string(),
                subdir,
            },
        ));
    }
    Ok(("", git_address(input)))
}

fn shorthand_git(input: &str) -> IResult<&str, SourceAddress> {
    let _ = alt((
        tag(GIT_SHORTHAND_HOSTS[0]),
        tag(GIT_SHORTHAND_HOSTS[1]),
        tag(GIT_SHORTHAND_HOSTS[2]),
    ))
    .parse(input)?;
    Ok(("", git_address(&format!("https://{input}"))))
}

fn registry(input: &str) -> IResult<&str, SourceAddress> {
    let (path, subdir) = split_subdir(input);
    let (_, segments) =
        all_consuming(separated_list1(char('/'), take_while1(is_segment_char))).parse(path)?;
    let (host, namespace, name, provider) = match segments.as_slice() {
        [namespace, name, provider] => (DEFAULT_REGISTRY_HOST, *namespace, *name, *provider),
        [host, namespace, name, provider] if host.contains('.') => {
            (*host, *namespace, *name, *provider)
        }
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            )));
        }
    };
    Ok((
        "",
        SourceAddress::Registry {
            host: host.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            subdir,
        },
    ))
}

const fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn ref_param(input: &str) -> IResult<&str, &str> {
    preceded(tag("ref="), rest).parse(input)
}

/// Splits `url?query` and extracts the `ref` parameter.
fn split_query(url: &str) -> (&str, Option<String>) {
    match url.split_once('?') {
        Some((base, query)) => {
            let reference = query
                .split('&')
                .find_map(|pair| ref_param(pair).ok().map(|(_, r)| r.to_string()));
            (base, reference)
        }
        None => (url, None),
    }
}

/// Splits the `//subdir` suffix off a URL, ignoring the scheme separator.
fn split_subdir(url: &str) -> (&str, Option<String>) {
    let start = url.find("://").map_or(0, |idx| idx + 3);
    match url[start..].find("//") {
        Some(idx) => {
            let split = start + idx;
            let subdir = url[split + 2..].trim_matches('/');
            let subdir = (!subdir.is_empty()).then(|| subdir.to_string());
            (&url[..split], subdir)
        }
        None => (url, None),
    }
}

fn git_address(url: &str) -> SourceAddress {
    let (base, reference) = split_query(url);
    let (repo, subdir) = split_subdir(base);
    SourceAddress::Git {
        url: repo.to_string(),
        reference,
        subdir,
    }
}
