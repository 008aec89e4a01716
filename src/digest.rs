use tabled::{
    Table, Tabled,
    settings::{Modify, Style, Width, object::Segment},
};

use crate::domain::{DigestFormat, Issue};

const COLUMN_WIDTH: usize = 50;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

#[derive(Tabled)]
struct DigestRow {
    #[tabled(rename = "Updated At")]
    updated_at: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Title")]
    title: String,
}

impl From<&Issue> for DigestRow {
    fn from(issue: &Issue) -> Self {
        Self {
            updated_at: issue.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            url: issue.html_url.clone(),
            repository: issue.repository_url.name().to_owned(),
            user: issue.user.clone(),
            title: issue.title.clone(),
        }
    }
}

/// Renders issues in the order given; callers pass them newest first.
pub fn render(issues: &[Issue], format: DigestFormat) -> String {
    let rows = issues.iter().map(DigestRow::from);
    match format {
        DigestFormat::Text => render_text(rows),
        DigestFormat::Html => render_html(rows),
        DigestFormat::Plain => render_plain(rows),
    }
}

fn render_text(rows: impl Iterator<Item = DigestRow>) -> String {
    let mut table = Table::new(rows);
    table
        .with(Style::ascii())
        .with(Modify::new(Segment::all()).with(Width::wrap(COLUMN_WIDTH)));
    format!("{table}\n")
}

// Field values come straight from the API and are emitted unescaped.
fn render_html(rows: impl Iterator<Item = DigestRow>) -> String {
    let mut html = String::from("<table>\n");
    html.push_str(
        "<tr><th align=\"left\">Updated At</th><th align=\"left\">URL</th>\
         <th align=\"left\">Repository</th><th align=\"left\">User</th>\
         <th align=\"left\">Title</th></tr>\n",
    );
    for row in rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            row.updated_at, row.url, row.repository, row.user, row.title
        ));
    }
    html.push_str("</table>\n");
    html
}

fn render_plain(rows: impl Iterator<Item = DigestRow>) -> String {
    rows.map(|row| {
        format!(
            "{} {} {} {} {}\n",
            row.updated_at, row.url, row.repository, row.user, row.title
        )
    })
    .collect()
}
