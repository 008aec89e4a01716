use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    Url,
    blocking::Client,
    header::{ACCEPT, LINK},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Comment, Credentials, Issue, IssueSelection, RepositoryUrl};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT_HEADER: &str = concat!("issue-reminders/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";
const PER_PAGE: &str = "100";

/// Read access to the issue tracker, as needed by a reminder run.
pub trait IssueSource {
    /// Open issues updated at or after `since`, newest update first.
    fn open_issues(
        &self,
        selection: &IssueSelection,
        since: DateTime<Utc>,
    ) -> Result<Vec<Issue>, FetchError>;

    /// Newest comment on `issue` among those touched at or after `since`.
    fn latest_comment(
        &self,
        issue: &Issue,
        since: DateTime<Utc>,
    ) -> Result<Option<Comment>, FetchError>;
}

pub fn build_client() -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT_HEADER)
        .build()
        .map_err(FetchError::Http)
}

pub struct GitHubClient {
    http: Client,
    api_base: Url,
    credentials: Credentials,
}

impl GitHubClient {
    pub fn new(api_url: &str, credentials: Credentials) -> Result<Self, FetchError> {
        // Joining relative paths onto a base without a trailing slash would
        // drop its last segment (`/api/v3` on GitHub Enterprise).
        let normalized = if api_url.ends_with('/') {
            api_url.to_owned()
        } else {
            format!("{api_url}/")
        };
        let api_base = Url::parse(&normalized).map_err(|err| FetchError::InvalidUrl {
            url: api_url.to_owned(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            http: build_client()?,
            api_base,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.api_base
            .join(path)
            .map_err(|err| FetchError::InvalidUrl {
                url: format!("{}{path}", self.api_base),
                reason: err.to_string(),
            })
    }

    fn get(&self, url: Url) -> Result<(Vec<u8>, Option<Url>), FetchError> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, GITHUB_JSON)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()?
            .error_for_status()?;

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_link);
        let body = response.bytes()?.to_vec();
        Ok((body, next))
    }

    fn fetch_issue_page(&self, url: Url, shape: PageShape) -> Result<IssuePage, FetchError> {
        let (body, next) = self.get(url)?;
        let items = match shape {
            PageShape::List => serde_json::from_slice::<Vec<IssuePayload>>(&body)?,
            PageShape::Search => serde_json::from_slice::<SearchResponse>(&body)?.items,
        };
        Ok(IssuePage { items, next })
    }

    fn pager(
        &self,
        first: Url,
        shape: PageShape,
        since: DateTime<Utc>,
    ) -> IssuePager<impl FnMut(Url) -> Result<IssuePage, FetchError> + '_> {
        IssuePager::new(first, since, move |url| self.fetch_issue_page(url, shape))
    }

    fn listing_urls(&self, selection: &IssueSelection) -> Result<Vec<(Url, PageShape)>, FetchError> {
        match selection {
            IssueSelection::Scope(scope) => {
                let mut url = self.endpoint("issues")?;
                url.query_pairs_mut()
                    .append_pair("filter", scope.api_filter())
                    .append_pair("state", "open")
                    .append_pair("sort", "updated")
                    .append_pair("direction", "desc")
                    .append_pair("per_page", PER_PAGE);
                Ok(vec![(url, PageShape::List)])
            }
            IssueSelection::Queries(queries) => queries
                .iter()
                .map(|query| {
                    let mut url = self.endpoint("search/issues")?;
                    url.query_pairs_mut()
                        .append_pair("q", query)
                        .append_pair("sort", "updated")
                        .append_pair("order", "desc")
                        .append_pair("per_page", PER_PAGE);
                    Ok((url, PageShape::Search))
                })
                .collect(),
        }
    }
}

impl IssueSource for GitHubClient {
    fn open_issues(
        &self,
        selection: &IssueSelection,
        since: DateTime<Utc>,
    ) -> Result<Vec<Issue>, FetchError> {
        let mut batches = Vec::new();
        for (url, shape) in self.listing_urls(selection)? {
            let batch = self.pager(url, shape, since).collect::<Result<Vec<_>, _>>()?;
            info!("fetched {} issue(s) updated since {since}", batch.len());
            batches.push(batch);
        }

        Ok(match selection {
            IssueSelection::Scope(_) => batches.into_iter().flatten().collect(),
            IssueSelection::Queries(_) => merge_search_results(batches),
        })
    }

    fn latest_comment(
        &self,
        issue: &Issue,
        since: DateTime<Utc>,
    ) -> Result<Option<Comment>, FetchError> {
        let (owner, repository) = split_repository(&issue.repository_url)?;
        let mut url = self.endpoint(&format!(
            "repos/{owner}/{repository}/issues/{}/comments",
            issue.number
        ))?;
        url.query_pairs_mut()
            .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("per_page", PER_PAGE);

        let mut next = Some(url);
        let mut comments = Vec::new();
        while let Some(url) = next.take() {
            let (body, following) = self.get(url)?;
            let page: Vec<CommentPayload> = serde_json::from_slice(&body)?;
            for payload in page {
                comments.push(payload.into_comment(&issue.api_url)?);
            }
            next = following;
        }

        debug!(
            "{} comment(s) on {}#{} since {since}",
            comments.len(),
            issue.repository_url.name(),
            issue.number
        );
        Ok(newest_comment(comments))
    }
}

fn split_repository(url: &RepositoryUrl) -> Result<(&str, &str), FetchError> {
    url.owner_and_repository()
        .ok_or_else(|| FetchError::DataShape {
            field: "repository_url",
            context: format!("expected https://<host>/repos/<owner>/<repo>, got [{url}]"),
        })
}

fn newest_comment(comments: Vec<Comment>) -> Option<Comment> {
    comments.into_iter().max_by_key(|comment| comment.updated_at)
}

/// Search results from several queries, de-duplicated by API URL and ordered
/// newest update first.
fn merge_search_results(batches: Vec<Vec<Issue>>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Issue> = batches
        .into_iter()
        .flatten()
        .filter(|issue| seen.insert(issue.api_url.clone()))
        .collect();
    merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    merged
}

/// Extracts the `rel="next"` target from a `Link` response header.
fn parse_next_link(header: &str) -> Option<Url> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

// -----------------------------------------------------------------------------
// Paging
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum PageShape {
    List,
    Search,
}

struct IssuePage {
    items: Vec<IssuePayload>,
    next: Option<Url>,
}

/// Lazily walks issue pages sorted newest update first, and stops at the first
/// issue older than the lookback so no further pages are requested.
struct IssuePager<F> {
    fetch: F,
    next: Option<Url>,
    buffered: VecDeque<IssuePayload>,
    since: DateTime<Utc>,
    finished: bool,
}

impl<F> IssuePager<F>
where
    F: FnMut(Url) -> Result<IssuePage, FetchError>,
{
    fn new(first: Url, since: DateTime<Utc>, fetch: F) -> Self {
        Self {
            fetch,
            next: Some(first),
            buffered: VecDeque::new(),
            since,
            finished: false,
        }
    }

    fn fail(&mut self, err: FetchError) -> Option<Result<Issue, FetchError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<F> Iterator for IssuePager<F>
where
    F: FnMut(Url) -> Result<IssuePage, FetchError>,
{
    type Item = Result<Issue, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if let Some(payload) = self.buffered.pop_front() {
                let issue = match payload.into_issue() {
                    Ok(issue) => issue,
                    Err(err) => return self.fail(err),
                };
                if issue.updated_at < self.since {
                    debug!(
                        "stopping at {}#{}, last updated {}",
                        issue.repository_url.name(),
                        issue.number,
                        issue.updated_at
                    );
                    self.finished = true;
                    return None;
                }
                return Some(Ok(issue));
            }

            let Some(url) = self.next.take() else {
                self.finished = true;
                break;
            };
            match (self.fetch)(url) {
                Ok(page) => {
                    self.buffered.extend(page.items);
                    self.next = page.next;
                }
                Err(err) => return self.fail(err),
            }
        }
        None
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("GitHub API response has no usable {field}: {context}")]
    DataShape {
        field: &'static str,
        context: String,
    },
    #[error("Invalid API URL [{url}]: {reason}")]
    InvalidUrl { url: String, reason: String },
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    html_url: String,
    url: String,
    repository_url: String,
    updated_at: DateTime<Utc>,
    user: Option<GitHubUser>,
}

impl IssuePayload {
    fn into_issue(self) -> Result<Issue, FetchError> {
        let user = self
            .user
            .and_then(|user| user.login)
            .ok_or_else(|| FetchError::DataShape {
                field: "user.login",
                context: format!("issue {}", self.url),
            })?;

        Ok(Issue {
            number: self.number,
            title: self.title,
            html_url: self.html_url,
            api_url: self.url,
            repository_url: RepositoryUrl::new(self.repository_url),
            user,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<IssuePayload>,
}

#[derive(Debug, Deserialize)]
struct CommentPayload {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user: Option<GitHubUser>,
}

impl CommentPayload {
    fn into_comment(self, issue_url: &str) -> Result<Comment, FetchError> {
        let user = self
            .user
            .and_then(|user| user.login)
            .ok_or_else(|| FetchError::DataShape {
                field: "user.login",
                context: format!("comment on {issue_url}"),
            })?;

        Ok(Comment {
            user,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: Option<String>,
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
