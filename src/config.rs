use crate::domain::{Credentials, DigestFormat, IssueScope, IssueSelection};

pub const DEFAULT_SEARCH_DISTANCE: &str = "6 months ago";
pub const DEFAULT_NEAR_DISTANCE: &str = "3 days ago";

/// Everything a run needs, fixed once the flags are parsed.
#[derive(Clone, Debug)]
pub struct ReminderConfig {
    pub credentials: Credentials,
    pub api_url: String,
    pub search_distance: String,
    pub near_distance: String,
    pub email: Option<String>,
    pub format: DigestFormat,
    pub selection: IssueSelection,
}

impl ReminderConfig {
    pub fn username(&self) -> &str {
        &self.credentials.username
    }
}

/// Chooses the list endpoint for `scope`, or the search endpoint when query
/// templates were supplied.
pub fn issue_selection(scope: IssueScope, templates: &[String], username: &str) -> IssueSelection {
    if templates.is_empty() {
        IssueSelection::Scope(scope)
    } else {
        IssueSelection::Queries(
            templates
                .iter()
                .map(|template| render_query(template, username))
                .collect(),
        )
    }
}

/// Substitutes every `{{.username}}` placeholder (inner spaces allowed).
pub fn render_query(template: &str, username: &str) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start..].find("}}") else {
            break;
        };
        let inner = rest[start + 2..start + len].trim();
        rendered.push_str(&rest[..start]);
        if inner == ".username" {
            rendered.push_str(username);
        } else {
            rendered.push_str(&rest[start..start + len + 2]);
        }
        rest = &rest[start + len + 2..];
    }
    rendered.push_str(rest);
    rendered
}
