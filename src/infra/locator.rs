//! Repository and file locators.
//!
//! A locator names one file on one branch of one hosted repository. The
//! editor hands us any of the URL shapes users paste around; everything is
//! normalized to a [`FileLocation`] and rendered back in the canonical
//! `github://getFileList/...` form.

use std::fmt;

use lazy_regex::regex_captures;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters escaped when rendering a locator component.
/// Mirrors `encodeURIComponent`, which the editor uses on its side.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const FILE_LIST_SCHEME: &str = "github://getFileList/";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LocatorError {
    #[error("Unsupported locator: {0}")]
    Unsupported(String),

    #[error("Could not parse repository URI: {0}")]
    InvalidRepositoryUri(String),
}

/// A hosted repository, identified by its web URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub uri: String,
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    /// Parse a repository URI such as `https://github.com/owner/repo`.
    pub fn from_uri(uri: &str) -> Result<Self, LocatorError> {
        let trimmed = uri.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let Some((_, owner, name)) = regex_captures!(r"/([^/]+)/([^/]+)$", trimmed) else {
            return Err(LocatorError::InvalidRepositoryUri(uri.to_string()));
        };
        Ok(Self {
            uri: trimmed.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn github(owner: &str, name: &str) -> Self {
        Self {
            uri: format!("https://github.com/{owner}/{name}"),
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Where the edited document lives: repository, branch and path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub repository: RepositoryRef,
    pub branch: String,
    pub path: String,
}

impl FileLocation {
    /// Parse any supported locator form.
    ///
    /// - `github://getFileList/<repo uri>/<branch>/<path>` (components percent-encoded)
    /// - `github://getFileContent/<owner>/<repo>/<branch>/<path>`
    /// - `https://github.com/<owner>/<repo>/blob/<branch>/<path>` (or `tree`)
    /// - `https://raw.githubusercontent.com/<owner>/<repo>/<branch>/<path>`
    pub fn parse(locator: &str) -> Result<Self, LocatorError> {
        let url = match locator.rfind('#') {
            Some(index) => &locator[..index],
            None => locator,
        };

        if let Some((_, repo_uri, branch, path)) =
            regex_captures!(r"^github://getFileList/([^/]+)/([^/]+)/(.+)$", url)
        {
            return Ok(Self {
                repository: RepositoryRef::from_uri(&decode(repo_uri))?,
                branch: decode(branch),
                path: decode_path(path),
            });
        }

        let parts = regex_captures!(
            r"^github://getFileContent/([^/]+)/([^/]+)/+([^/]+)/+(.+)$",
            url
        )
        .or_else(|| {
            regex_captures!(
                r"^https?://(?:www\.)?github\.com/([^/]+)/([^/]+)/+(?:blob|tree)/+([^/]+)/+(.+)$",
                url
            )
        })
        .or_else(|| {
            regex_captures!(
                r"^https?://raw\.githubusercontent\.com/([^/]+)/([^/]+)/+([^/]+)/+(.+)$",
                url
            )
        });

        match parts {
            Some((_, owner, repo, branch, path)) => Ok(Self {
                repository: RepositoryRef::github(owner, repo),
                branch: decode(branch),
                path: decode_path(path),
            }),
            None => Err(LocatorError::Unsupported(locator.to_string())),
        }
    }

    /// Render the canonical `github://getFileList/...` locator.
    pub fn to_locator(&self) -> String {
        let path = self
            .path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, COMPONENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{FILE_LIST_SCHEME}{}/{}/{}",
            utf8_percent_encode(&self.repository.uri, COMPONENT),
            utf8_percent_encode(&self.branch, COMPONENT),
            path
        )
    }

    /// The same file on another repository and/or branch.
    pub fn relocated(&self, repository: &RepositoryRef, branch: &str) -> Self {
        Self {
            repository: repository.clone(),
            branch: branch.to_string(),
            path: self.path.clone(),
        }
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component)
        .decode_utf8_lossy()
        .into_owned()
}

fn decode_path(path: &str) -> String {
    path.split('/').map(decode).collect::<Vec<_>>().join("/")
}
