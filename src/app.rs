use std::io::{self, Write};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::info;

use crate::{
    config::ReminderConfig,
    digest,
    domain::Issue,
    github::{FetchError, IssueSource},
    mail::{self, DeliveryError, DigestMailer},
    recency,
    timephrase::{self, PhraseError},
};

pub const APP_NAME: &str = "issue-reminders";
pub const NO_REMINDERS_MESSAGE: &str = "You currently do not have or need any reminders.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Windows {
    pub search: TimeDelta,
    pub near: TimeDelta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    NoReminders,
    Reminded { count: usize, delivered: bool },
}

/// One reminder run: fetch, filter, render, optionally deliver.
pub struct ReminderApp<'a> {
    config: &'a ReminderConfig,
    source: &'a dyn IssueSource,
    mailer: &'a dyn DigestMailer,
}

impl<'a> ReminderApp<'a> {
    pub fn new(
        config: &'a ReminderConfig,
        source: &'a dyn IssueSource,
        mailer: &'a dyn DigestMailer,
    ) -> Self {
        Self {
            config,
            source,
            mailer,
        }
    }

    pub fn run(&self, out: &mut dyn Write) -> Result<RunOutcome, ReminderError> {
        self.run_at(Utc::now(), out)
    }

    pub fn run_at(&self, now: DateTime<Utc>, out: &mut dyn Write) -> Result<RunOutcome, ReminderError> {
        let windows = validate_windows(self.config, now)?;

        let since = timephrase::shift(now, windows.search);
        let candidates = self.source.open_issues(&self.config.selection, since)?;
        info!("{} candidate issue(s) updated since {since}", candidates.len());

        let reminders = self.filter_handled(candidates, windows.near, now)?;
        if reminders.is_empty() {
            writeln!(out, "{NO_REMINDERS_MESSAGE}")?;
            return Ok(RunOutcome::NoReminders);
        }

        let content = digest::render(&reminders, self.config.format);
        out.write_all(content.as_bytes())?;
        out.flush()?;

        let delivered = match &self.config.email {
            Some(to) => {
                self.mailer
                    .deliver(to, mail::SUBJECT, &content, self.config.format)?;
                true
            }
            None => false,
        };

        Ok(RunOutcome::Reminded {
            count: reminders.len(),
            delivered,
        })
    }

    fn filter_handled(
        &self,
        candidates: Vec<Issue>,
        near_window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<Vec<Issue>, ReminderError> {
        let mut reminders = Vec::with_capacity(candidates.len());
        for issue in candidates {
            let suppress = recency::should_suppress(
                self.source,
                &issue,
                near_window,
                self.config.username(),
                now,
            )
            .map_err(|source| ReminderError::Classify {
                issue: issue.html_url.clone(),
                source,
            })?;

            if !suppress {
                reminders.push(issue);
            }
        }
        info!("{} issue(s) need a reminder", reminders.len());
        Ok(reminders)
    }
}

/// Both windows must be intervals reaching into the past.
pub fn validate_windows(config: &ReminderConfig, now: DateTime<Utc>) -> Result<Windows, ReminderError> {
    let search = timephrase::interpret(&config.search_distance, now)
        .map_err(ReminderError::SearchWindow)?;
    let near =
        timephrase::interpret(&config.near_distance, now).map_err(ReminderError::NearWindow)?;

    Ok(Windows {
        search: search.duration,
        near: near.duration,
    })
}

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("invalid --search-distance: {0}")]
    SearchWindow(PhraseError),
    #[error("invalid --near-distance: {0}")]
    NearWindow(PhraseError),
    #[error("failed to fetch issues: {0}")]
    Fetch(#[from] FetchError),
    #[error("failed to check recent activity on {issue}: {source}")]
    Classify {
        issue: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to deliver digest: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("failed to write digest: {0}")]
    Output(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use chrono::TimeZone;

    use super::*;
    use crate::domain::{
        Comment, Credentials, DigestFormat, IssueScope, IssueSelection, RepositoryUrl,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn config(email: Option<&str>, format: DigestFormat) -> ReminderConfig {
        ReminderConfig {
            credentials: Credentials {
                username: "alice".into(),
                password: "secret".into(),
            },
            api_url: "https://api.example.com".into(),
            search_distance: "6 months ago".into(),
            near_distance: "3 days ago".into(),
            email: email.map(str::to_owned),
            format,
            selection: IssueSelection::Scope(IssueScope::All),
        }
    }

    fn issue(number: u64, age: TimeDelta) -> Issue {
        Issue {
            number,
            title: format!("Issue {number}"),
            html_url: format!("https://example.com/acme/widgets/issues/{number}"),
            api_url: format!("https://api.example.com/repos/acme/widgets/issues/{number}"),
            repository_url: RepositoryUrl::new("https://api.example.com/repos/acme/widgets"),
            user: "carol".into(),
            updated_at: now() - age,
        }
    }

    #[derive(Default)]
    struct FakeTracker {
        issues: Vec<Issue>,
        last_comments: HashMap<u64, Comment>,
        failing_comments: Option<u64>,
        issue_requests: RefCell<Vec<DateTime<Utc>>>,
        comment_requests: RefCell<Vec<u64>>,
    }

    impl FakeTracker {
        fn with_comment(mut self, number: u64, user: &str, age: TimeDelta) -> Self {
            let at = now() - age;
            self.last_comments.insert(
                number,
                Comment {
                    user: user.into(),
                    created_at: at,
                    updated_at: at,
                },
            );
            self
        }
    }

    impl IssueSource for FakeTracker {
        fn open_issues(
            &self,
            _selection: &IssueSelection,
            since: DateTime<Utc>,
        ) -> Result<Vec<Issue>, FetchError> {
            self.issue_requests.borrow_mut().push(since);
            Ok(self
                .issues
                .iter()
                .filter(|issue| issue.updated_at >= since)
                .cloned()
                .collect())
        }

        fn latest_comment(
            &self,
            issue: &Issue,
            since: DateTime<Utc>,
        ) -> Result<Option<Comment>, FetchError> {
            self.comment_requests.borrow_mut().push(issue.number);
            if self.failing_comments == Some(issue.number) {
                return Err(FetchError::DataShape {
                    field: "user.login",
                    context: "test".into(),
                });
            }
            Ok(self
                .last_comments
                .get(&issue.number)
                .filter(|comment| comment.updated_at >= since)
                .cloned())
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: RefCell<Vec<(String, String, String, DigestFormat)>>,
    }

    impl DigestMailer for RecordingMailer {
        fn deliver(
            &self,
            to: &str,
            subject: &str,
            body: &str,
            format: DigestFormat,
        ) -> Result<(), DeliveryError> {
            self.sent
                .borrow_mut()
                .push((to.into(), subject.into(), body.into(), format));
            Ok(())
        }
    }

    #[test]
    fn own_recent_reply_is_suppressed_and_others_are_reported() {
        let tracker = FakeTracker {
            issues: vec![issue(43, TimeDelta::hours(20)), issue(42, TimeDelta::hours(22))],
            ..Default::default()
        }
        .with_comment(42, "alice", TimeDelta::days(1))
        .with_comment(43, "bob", TimeDelta::days(1));
        let mailer = RecordingMailer::default();
        let config = config(None, DigestFormat::Text);

        let mut out: Vec<u8> = Vec::new();
        let outcome = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut out)
            .expect("run");

        assert_eq!(
            outcome,
            RunOutcome::Reminded {
                count: 1,
                delivered: false
            }
        );
        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("https://example.com/acme/widgets/issues/43"));
        assert!(!printed.contains("https://example.com/acme/widgets/issues/42"));
        assert_eq!(tracker.comment_requests.borrow().as_slice(), [43, 42]);
        assert!(mailer.sent.borrow().is_empty());
    }

    #[test]
    fn stale_own_reply_and_silent_issues_are_reported() {
        let tracker = FakeTracker {
            issues: vec![issue(1, TimeDelta::days(1)), issue(2, TimeDelta::days(2))],
            ..Default::default()
        }
        .with_comment(1, "alice", TimeDelta::days(5));
        let mailer = RecordingMailer::default();
        let config = config(None, DigestFormat::Plain);

        let mut out: Vec<u8> = Vec::new();
        let outcome = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut out)
            .expect("run");

        assert!(matches!(outcome, RunOutcome::Reminded { count: 2, .. }));
        assert_eq!(String::from_utf8(out).expect("utf8").lines().count(), 2);
    }

    #[test]
    fn nothing_left_prints_message_and_skips_delivery() {
        let tracker = FakeTracker {
            issues: vec![issue(42, TimeDelta::hours(2))],
            ..Default::default()
        }
        .with_comment(42, "alice", TimeDelta::hours(3));
        let mailer = RecordingMailer::default();
        let config = config(Some("alice@example.com"), DigestFormat::Html);

        let mut out: Vec<u8> = Vec::new();
        let outcome = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut out)
            .expect("run");

        assert_eq!(outcome, RunOutcome::NoReminders);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            format!("{NO_REMINDERS_MESSAGE}\n")
        );
        assert!(mailer.sent.borrow().is_empty());
    }

    #[test]
    fn digest_is_printed_then_mailed() {
        let tracker = FakeTracker {
            issues: vec![issue(7, TimeDelta::days(1))],
            ..Default::default()
        };
        let mailer = RecordingMailer::default();
        let config = config(Some("alice@example.com"), DigestFormat::Html);

        let mut out: Vec<u8> = Vec::new();
        let outcome = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut out)
            .expect("run");

        assert_eq!(
            outcome,
            RunOutcome::Reminded {
                count: 1,
                delivered: true
            }
        );
        let printed = String::from_utf8(out).expect("utf8");
        let sent = mailer.sent.borrow();
        assert_eq!(sent.len(), 1);
        let (to, subject, body, format) = &sent[0];
        assert_eq!(to, "alice@example.com");
        assert_eq!(subject, mail::SUBJECT);
        assert_eq!(body, &printed);
        assert_eq!(*format, DigestFormat::Html);
    }

    #[test]
    fn search_window_bounds_the_fetch() {
        let tracker = FakeTracker::default();
        let mailer = RecordingMailer::default();
        let config = config(None, DigestFormat::Text);

        ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut std::io::sink())
            .expect("run");

        assert_eq!(
            tracker.issue_requests.borrow().as_slice(),
            [now() - TimeDelta::days(180)]
        );
    }

    #[test]
    fn invalid_windows_abort_before_fetching() {
        let tracker = FakeTracker::default();
        let mailer = RecordingMailer::default();

        let mut bad_search = config(None, DigestFormat::Text);
        bad_search.search_distance = "in 6 months".into();
        let err = ReminderApp::new(&bad_search, &tracker, &mailer)
            .run_at(now(), &mut std::io::sink())
            .expect_err("future search window");
        assert!(matches!(err, ReminderError::SearchWindow(PhraseError::NotInPast(_))));

        let mut bad_near = config(None, DigestFormat::Text);
        bad_near.near_distance = "January 2020".into();
        let err = ReminderApp::new(&bad_near, &tracker, &mailer)
            .run_at(now(), &mut std::io::sink())
            .expect_err("absolute near window");
        assert!(matches!(err, ReminderError::NearWindow(PhraseError::NotAnInterval(_))));

        assert!(tracker.issue_requests.borrow().is_empty());
    }

    #[test]
    fn search_window_past_calendar_range_is_an_error() {
        let tracker = FakeTracker::default();
        let mailer = RecordingMailer::default();
        let mut config = config(None, DigestFormat::Text);
        config.search_distance = "300000 years ago".into();

        let err = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut std::io::sink())
            .expect_err("out of range search window");

        assert!(matches!(err, ReminderError::SearchWindow(PhraseError::OutOfRange(_))));
        assert!(tracker.issue_requests.borrow().is_empty());
    }

    #[test]
    fn classification_failure_aborts_the_run() {
        let tracker = FakeTracker {
            issues: vec![issue(1, TimeDelta::days(1)), issue(2, TimeDelta::days(2))],
            failing_comments: Some(1),
            ..Default::default()
        };
        let mailer = RecordingMailer::default();
        let config = config(Some("alice@example.com"), DigestFormat::Text);

        let mut out: Vec<u8> = Vec::new();
        let err = ReminderApp::new(&config, &tracker, &mailer)
            .run_at(now(), &mut out)
            .expect_err("classification error");

        assert!(matches!(err, ReminderError::Classify { ref issue, .. } if issue.ends_with("/1")));
        assert_eq!(tracker.comment_requests.borrow().as_slice(), [1]);
        assert!(out.is_empty());
        assert!(mailer.sent.borrow().is_empty());
    }
}
