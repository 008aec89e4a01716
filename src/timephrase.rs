use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhraseKind {
    /// Relative offset from now, e.g. "3 days ago".
    Interval,
    /// Fixed point in time, e.g. "January 2020".
    Point,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimePhrase {
    pub duration: TimeDelta,
    pub kind: PhraseKind,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PhraseError {
    #[error("could not understand time phrase: [{0}]")]
    Unparseable(String),
    #[error("time phrase must describe an interval, not a point in time: [{0}]")]
    NotAnInterval(String),
    #[error("time phrase must describe the past: [{0}]")]
    NotInPast(String),
    #[error("time phrase reaches past the representable date range: [{0}]")]
    OutOfRange(String),
}

/// Interprets `phrase` as an interval reaching into the past from `now`.
pub fn interpret(phrase: &str, now: DateTime<Utc>) -> Result<TimePhrase, PhraseError> {
    let parsed = parse(phrase, now).ok_or_else(|| PhraseError::Unparseable(phrase.to_owned()))?;
    if parsed.kind != PhraseKind::Interval {
        return Err(PhraseError::NotAnInterval(phrase.to_owned()));
    }
    if parsed.duration >= TimeDelta::zero() {
        return Err(PhraseError::NotInPast(phrase.to_owned()));
    }
    if now.checked_add_signed(parsed.duration).is_none() {
        return Err(PhraseError::OutOfRange(phrase.to_owned()));
    }
    Ok(parsed)
}

/// `now + delta`, clamped to the representable range instead of panicking.
pub fn shift(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Parses without any kind or sign checks.
pub fn parse(phrase: &str, now: DateTime<Utc>) -> Option<TimePhrase> {
    let normalized = phrase.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    parse_interval(&normalized)
        .map(|duration| TimePhrase {
            duration,
            kind: PhraseKind::Interval,
        })
        .or_else(|| {
            parse_point(&normalized, now).map(|point| TimePhrase {
                duration: point - now,
                kind: PhraseKind::Point,
            })
        })
}

// -----------------------------------------------------------------------------
// Relative intervals
// -----------------------------------------------------------------------------

fn parse_interval(phrase: &str) -> Option<TimeDelta> {
    match phrase {
        "yesterday" => return Some(-TimeDelta::days(1)),
        "tomorrow" => return Some(TimeDelta::days(1)),
        _ => {}
    }

    let words: Vec<&str> = phrase
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|word| !word.is_empty() && *word != "and")
        .collect();

    match words.as_slice() {
        ["last", unit] => return unit_length(unit).map(|length| -length),
        ["next", unit] => return unit_length(unit),
        _ => {}
    }

    let (body, sign) = match words.as_slice() {
        [body @ .., "ago"] => (body, -1),
        [body @ .., "from", "now"] | [body @ .., "later"] => (body, 1),
        ["in", body @ ..] => (body, 1),
        _ => return None,
    };

    sum_quantities(body).map(|total| total * sign)
}

fn sum_quantities(words: &[&str]) -> Option<TimeDelta> {
    if words.is_empty() || words.len() % 2 != 0 {
        return None;
    }

    words.chunks(2).try_fold(TimeDelta::zero(), |total, pair| {
        let count = parse_count(pair[0])?;
        let length = unit_length(pair[1])?;
        total.checked_add(&length.checked_mul(count)?)
    })
}

fn parse_count(word: &str) -> Option<i32> {
    let count = match word {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => digits.parse::<u32>().ok().and_then(|n| i32::try_from(n).ok())?,
    };
    Some(count)
}

fn unit_length(word: &str) -> Option<TimeDelta> {
    let unit = match word {
        "second" | "seconds" | "sec" | "secs" => TimeDelta::seconds(1),
        "minute" | "minutes" | "min" | "mins" => TimeDelta::minutes(1),
        "hour" | "hours" | "hr" | "hrs" => TimeDelta::hours(1),
        "day" | "days" => TimeDelta::days(1),
        "week" | "weeks" => TimeDelta::weeks(1),
        "fortnight" | "fortnights" => TimeDelta::weeks(2),
        "month" | "months" => TimeDelta::days(30),
        "year" | "years" => TimeDelta::days(365),
        _ => return None,
    };
    Some(unit)
}

// -----------------------------------------------------------------------------
// Absolute points
// -----------------------------------------------------------------------------

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

fn parse_point(phrase: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match phrase {
        "now" => return Some(now),
        "today" => return now.date_naive().and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        _ => {}
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(phrase) {
        return Some(timestamp.with_timezone(&Utc));
    }

    let date = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(phrase, format).ok())
        .or_else(|| parse_month_year(phrase))
        .or_else(|| parse_year(phrase))?;

    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn parse_month_year(phrase: &str) -> Option<NaiveDate> {
    let first_of_month = format!("1 {phrase}");
    ["%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&first_of_month, format).ok())
}

fn parse_year(phrase: &str) -> Option<NaiveDate> {
    if phrase.len() != 4 || !phrase.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::from_ymd_opt(phrase.parse().ok()?, 1, 1)
}
