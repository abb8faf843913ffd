//! Repository identity parsed from a GitHub URL.

use std::fmt;

use crate::GithubError;

const GITHUB_HOST: &str = "github.com";

/// Lowercased `(owner, name)` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    pub fn new(owner: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            owner: owner.as_ref().to_lowercase(),
            name: name.as_ref().to_lowercase(),
        }
    }

    /// Parse a repository URL such as `https://github.com/Owner/Repo`.
    ///
    /// The `github.com` segment is located case-insensitively and the two
    /// segments after it become owner and name. Extra path segments
    /// (`/releases`, `/tree/main`, ...) are ignored.
    pub fn parse(url: &str) -> Result<Self, GithubError> {
        let parts: Vec<&str> = url.trim().split('/').collect();
        let base = parts
            .iter()
            .position(|part| part.eq_ignore_ascii_case(GITHUB_HOST))
            .ok_or_else(|| GithubError::InvalidUrl(url.to_string()))?;

        let owner = parts.get(base + 1).copied().unwrap_or_default();
        let name = parts.get(base + 2).copied().unwrap_or_default();
        let name = name.split(['?', '#']).next().unwrap_or_default();
        let name = name.strip_suffix(".git").unwrap_or(name);

        if owner.is_empty() || name.is_empty() {
            return Err(GithubError::InvalidUrl(url.to_string()));
        }

        Ok(Self::new(owner, name))
    }

    /// Canonical web URL for the repository.
    pub fn html_url(&self) -> String {
        format!("https://{}/{}/{}", GITHUB_HOST, self.owner, self.name)
    }

    /// `owner/name` form used in messages.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
