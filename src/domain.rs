use std::fmt;

use chrono::{DateTime, Utc};

// Domain data structures shared across modules.

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub api_url: String,
    pub repository_url: RepositoryUrl,
    pub user: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Comment {
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IssueScope {
    #[default]
    All,
    Assigned,
}

impl IssueScope {
    /// Value of the `filter` parameter on the issue listing endpoint.
    pub fn api_filter(&self) -> &'static str {
        match self {
            IssueScope::All => "all",
            IssueScope::Assigned => "assigned",
        }
    }
}

/// Which issues a run considers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueSelection {
    Scope(IssueScope),
    /// Rendered search queries, run one after another.
    Queries(Vec<String>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestFormat {
    #[default]
    Text,
    Html,
    Plain,
}

/// API URL of a repository, e.g. `https://api.github.com/repos/acme/widgets`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryUrl(String);

impl RepositoryUrl {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// `owner/repository`, or the raw URL when it does not look like
    /// `https://<host>/repos/...`.
    pub fn name(&self) -> &str {
        self.strip_prefix().unwrap_or(&self.0)
    }

    pub fn owner_and_repository(&self) -> Option<(&str, &str)> {
        let path = self.strip_prefix()?;
        let (owner, repository) = path.split_once('/')?;
        if owner.is_empty() || repository.is_empty() || repository.contains('/') {
            return None;
        }
        Some((owner, repository))
    }

    fn strip_prefix(&self) -> Option<&str> {
        let (host, path) = self.0.strip_prefix("https://")?.split_once('/')?;
        if host.is_empty() {
            return None;
        }
        // GitHub Enterprise serves the API under `/api/v3/repos/`.
        path.strip_prefix("repos/")
            .or_else(|| path.split_once("/repos/").map(|(_, tail)| tail))
    }
}

impl fmt::Display for RepositoryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
