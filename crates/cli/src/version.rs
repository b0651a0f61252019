//! Build information and the release update check

use crate::client::ReleaseClient;
use std::cmp::Ordering;
use std::io::{self, Write};
use thiserror::Error;
use tracing::info;

/// Version of this build, in the `vMAJOR.MINOR.PATCH` form used for release tags
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Commit this build was made from, set through `KUBESLEEP_COMMIT` at build time
pub const COMMIT: &str = match option_env!("KUBESLEEP_COMMIT") {
    Some(commit) => commit,
    None => "none",
};

#[derive(Debug, Error)]
pub enum UpdateCheckError {
    #[error("invalid {origin} version string: {value}")]
    InvalidVersion { origin: &'static str, value: String },

    #[error("failed update check http request: {0}")]
    Request(#[from] reqwest::Error),
}

pub fn write_build_info(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Version:    {}", VERSION)?;
    writeln!(out, "Commit:     {}", COMMIT)?;
    writeln!(
        out,
        "Platform:   {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    )?;
    Ok(())
}

/// A `vMAJOR.MINOR.PATCH[-PRERELEASE]` version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseVersion {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
}

impl ReleaseVersion {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix('v')?;
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return None,
            None => (rest, None),
        };

        let mut parts = core.split('.').map(|part| part.parse::<u64>().ok());
        let version = Self {
            major: parts.next()??,
            minor: parts.next()??,
            patch: parts.next()??,
            pre,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(version)
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // a pre-release sorts before its release
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_version(origin: &'static str, value: &str) -> Result<ReleaseVersion, UpdateCheckError> {
    ReleaseVersion::parse(value).ok_or_else(|| UpdateCheckError::InvalidVersion {
        origin,
        value: value.to_string(),
    })
}

/// Message announcing `remote`, or `None` when `current` is up to date.
pub fn compare_versions(
    current: &str,
    remote: &str,
    url: &str,
) -> Result<Option<String>, UpdateCheckError> {
    let current_version = parse_version("build", current)?;
    let remote_version = parse_version("remote", remote)?;

    if current_version >= remote_version {
        info!(
            build_version = %current,
            latest_version = %remote,
            "No new kubesleep version available on github"
        );
        return Ok(None);
    }
    Ok(Some(format!(
        "A new kubesleep version has been released: {} -> {} {}",
        current, remote, url
    )))
}

/// Ask the releases API whether something newer than `current` is out.
pub async fn check_for_update(
    client: &ReleaseClient,
    current: &str,
) -> Result<Option<String>, UpdateCheckError> {
    parse_version("build", current)?;
    let release = client.latest_release().await?;
    compare_versions(current, &release.version, &release.url)
}
