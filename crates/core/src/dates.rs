//! Event-date grammar.
//!
//! Provenance records carry dates in whatever form the source archive used.
//! The parser turns the common shapes into an inclusive [`DateSpan`]:
//!
//! | input | span |
//! |---|---|
//! | `1945-08-20` | that day |
//! | `1945-08` | that month |
//! | `1885` | that year |
//! | `1880s` | 1880-01-01 ..= 1889-12-31 |
//! | `19th century` | 1801-01-01 ..= 1900-12-31 |
//! | `1885-1890`, `1885/1890`, `1885 – 1890` | start of left ..= end of right |
//! | `c. 1885`, `ca. 1885`, `circa 1885` | same as `1885` |
//!
//! Anything else keeps its raw text and has no span; such dates sort after
//! every dated event and are reported as unordered.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    fn year(year: i32) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start.year()
    }
}

/// A date as recorded plus its parsed span, if it parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDate {
    pub raw: String,
    pub span: Option<DateSpan>,
}

impl EventDate {
    pub fn is_ordered(&self) -> bool {
        self.span.is_some()
    }

    /// Century of the span's start (1885 → 19, 1900 → 19, 1901 → 20).
    pub fn century(&self) -> Option<i32> {
        self.span.map(|s| century_of(s.start_year()))
    }
}

/// Parse a recorded date. Never fails: unknown shapes come back unordered.
pub fn parse_date(raw: &str) -> EventDate {
    let trimmed = raw.trim();
    EventDate {
        raw: trimmed.to_string(),
        span: parse_span(trimmed),
    }
}

pub fn century_of(year: i32) -> i32 {
    if year > 0 {
        (year - 1) / 100 + 1
    } else {
        year / 100 - 1
    }
}

/// `19` → `19th`, `21` → `21st`, `12` → `12th`.
pub fn ordinal(n: i32) -> String {
    let suffix = match (n.rem_euclid(100), n.rem_euclid(10)) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn parse_span(text: &str) -> Option<DateSpan> {
    if text.is_empty() {
        return None;
    }
    let text = strip_circa(text);
    if let Some(span) = parse_single(text) {
        return Some(span);
    }
    let (left, right) = split_range(text)?;
    let left = parse_single(strip_circa(left.trim()))?;
    let right = parse_single(strip_circa(right.trim()))?;
    (left.start <= right.end).then_some(DateSpan {
        start: left.start,
        end: right.end,
    })
}

fn strip_circa(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    for prefix in ["circa ", "circa", "cca.", "ca.", "c.", "ca "] {
        if lower.starts_with(prefix) {
            return text[prefix.len()..].trim_start();
        }
    }
    text
}

fn split_range(text: &str) -> Option<(&str, &str)> {
    for sep in ['/', '–', '—'] {
        if let Some(pair) = text.split_once(sep) {
            return Some(pair);
        }
    }
    if let Some(pair) = text.split_once(" - ") {
        return Some(pair);
    }
    // `1885-1890`: a hyphen between two bare years.
    let (left, right) = text.split_once('-')?;
    let bare_year = |s: &str| (3..=4).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit());
    (bare_year(left) && bare_year(right)).then_some((left, right))
}

fn parse_single(text: &str) -> Option<DateSpan> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(DateSpan::day(date));
    }
    if let Some((y, m)) = text.split_once('-') {
        if y.len() == 4 && m.len() <= 2 && !m.is_empty() && all_digits(y) && all_digits(m) {
            return DateSpan::month(y.parse().ok()?, m.parse().ok()?);
        }
    }
    if (3..=4).contains(&text.len()) && all_digits(text) {
        return DateSpan::year(text.parse().ok()?);
    }
    if let Some(decade) = text.strip_suffix("'s").or_else(|| text.strip_suffix('s')) {
        if decade.len() == 4 && decade.ends_with('0') && all_digits(decade) {
            let start: i32 = decade.parse().ok()?;
            return Some(DateSpan {
                start: DateSpan::year(start)?.start,
                end: DateSpan::year(start + 9)?.end,
            });
        }
    }
    parse_century(text)
}

fn parse_century(text: &str) -> Option<DateSpan> {
    let lower = text.to_ascii_lowercase();
    let number = lower
        .strip_suffix("century")
        .or_else(|| lower.strip_suffix("c."))?
        .trim();
    let digits = number
        .strip_suffix("st")
        .or_else(|| number.strip_suffix("nd"))
        .or_else(|| number.strip_suffix("rd"))
        .or_else(|| number.strip_suffix("th"))
        .unwrap_or(number);
    let century: i32 = digits.parse().ok().filter(|c| (1..=30).contains(c))?;
    let first = (century - 1) * 100 + 1;
    Some(DateSpan {
        start: DateSpan::year(first)?.start,
        end: DateSpan::year(first + 99)?.end,
    })
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
