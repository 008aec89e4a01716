use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::{
    domain::{Comment, Issue},
    github::{FetchError, IssueSource},
    timephrase,
};

/// Whether `issue` can be left out of the digest because `username` wrote the
/// newest comment within `near_window` (a negative offset) of `now`.
pub fn should_suppress(
    source: &dyn IssueSource,
    issue: &Issue,
    near_window: TimeDelta,
    username: &str,
    now: DateTime<Utc>,
) -> Result<bool, FetchError> {
    let threshold = timephrase::shift(now, near_window);
    let latest = source.latest_comment(issue, threshold)?;
    let handled = responded_since(latest.as_ref(), username, threshold);

    debug!(
        issue = %issue.html_url,
        last_commenter = latest.as_ref().map(|c| c.user.as_str()).unwrap_or("-"),
        handled,
        "classified"
    );
    Ok(handled)
}

/// The decision rule on its own, given the newest comment (if any).
pub fn responded_since(latest: Option<&Comment>, username: &str, threshold: DateTime<Utc>) -> bool {
    match latest {
        None => false,
        Some(comment) if !comment.user.eq_ignore_ascii_case(username) => false,
        Some(comment) => comment.updated_at >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::{IssueSelection, RepositoryUrl};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn comment(user: &str, age: TimeDelta) -> Comment {
        Comment {
            user: user.into(),
            created_at: now() - age,
            updated_at: now() - age,
        }
    }

    fn issue() -> Issue {
        Issue {
            number: 42,
            title: "Widget is wobbly".into(),
            html_url: "https://github.com/acme/widgets/issues/42".into(),
            api_url: "https://api.github.com/repos/acme/widgets/issues/42".into(),
            repository_url: RepositoryUrl::new("https://api.github.com/repos/acme/widgets"),
            user: "carol".into(),
            updated_at: now(),
        }
    }

    struct OneComment {
        comment: Option<Comment>,
        asked_since: Cell<Option<DateTime<Utc>>>,
    }

    impl IssueSource for OneComment {
        fn open_issues(
            &self,
            _selection: &IssueSelection,
            _since: DateTime<Utc>,
        ) -> Result<Vec<Issue>, FetchError> {
            Ok(Vec::new())
        }

        fn latest_comment(
            &self,
            _issue: &Issue,
            since: DateTime<Utc>,
        ) -> Result<Option<Comment>, FetchError> {
            self.asked_since.set(Some(since));
            Ok(self.comment.clone().filter(|c| c.updated_at >= since))
        }
    }

    #[test]
    fn no_comments_is_not_handled() {
        let threshold = now() - TimeDelta::days(3);
        assert!(!responded_since(None, "alice", threshold));
    }

    #[test]
    fn someone_else_speaking_last_is_not_handled() {
        let threshold = now() - TimeDelta::days(3);
        for age in [TimeDelta::minutes(5), TimeDelta::days(1), TimeDelta::days(30)] {
            let latest = comment("bob", age);
            assert!(!responded_since(Some(&latest), "alice", threshold));
        }
    }

    #[test]
    fn own_fresh_comment_is_handled() {
        let threshold = now() - TimeDelta::days(3);
        let latest = comment("alice", TimeDelta::days(1));
        assert!(responded_since(Some(&latest), "alice", threshold));

        let latest = comment("Alice", TimeDelta::days(1));
        assert!(responded_since(Some(&latest), "alice", threshold));
    }

    #[test]
    fn own_comment_exactly_at_threshold_is_handled() {
        let threshold = now() - TimeDelta::days(3);
        let latest = comment("alice", TimeDelta::days(3));
        assert!(responded_since(Some(&latest), "alice", threshold));
    }

    #[test]
    fn own_stale_comment_is_not_handled() {
        let threshold = now() - TimeDelta::days(3);
        let latest = comment("alice", TimeDelta::days(4));
        assert!(!responded_since(Some(&latest), "alice", threshold));
    }

    #[test]
    fn should_suppress_asks_for_comments_since_near_threshold() {
        let source = OneComment {
            comment: Some(comment("alice", TimeDelta::days(1))),
            asked_since: Cell::new(None),
        };
        let suppressed =
            should_suppress(&source, &issue(), -TimeDelta::days(3), "alice", now()).expect("ok");
        assert!(suppressed);
        assert_eq!(source.asked_since.get(), Some(now() - TimeDelta::days(3)));
    }

    #[test]
    fn should_suppress_keeps_issue_with_stale_own_comment() {
        let source = OneComment {
            comment: Some(comment("alice", TimeDelta::days(10))),
            asked_since: Cell::new(None),
        };
        let suppressed =
            should_suppress(&source, &issue(), -TimeDelta::days(3), "alice", now()).expect("ok");
        assert!(!suppressed);
    }

    #[test]
    fn should_suppress_survives_window_past_calendar_range() {
        let source = OneComment {
            comment: Some(comment("alice", TimeDelta::days(400))),
            asked_since: Cell::new(None),
        };
        let near_window = -TimeDelta::days(365 * 300_000);
        let suppressed =
            should_suppress(&source, &issue(), near_window, "alice", now()).expect("ok");
        assert!(suppressed);
        assert_eq!(source.asked_since.get(), Some(DateTime::<Utc>::MIN_UTC));
    }
}
