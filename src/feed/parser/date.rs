use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Layouts seen in the wild that neither RFC 3339 nor RFC 2822 accept.
const LAYOUTS_WITH_OFFSET: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%A, %d %B %Y %H:%M:%S %z",
];

const LAYOUTS_NAIVE: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// Named zones that RFC 2822 parsing in chrono does not know about.
const ZONES: &[(&str, &str)] = &[
    ("UTC", "+0000"),
    ("UT", "+0000"),
    ("GMT", "+0000"),
    ("Z", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("BST", "+0100"),
    ("IST", "+0530"),
    ("JST", "+0900"),
    ("AEST", "+1000"),
];

/// Parses a feed date leniently.
///
/// Returns `None` when nothing matches; callers keep the entry with an empty
/// date rather than rejecting it.
pub(crate) fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = replace_zone_name(value);
    for layout in LAYOUTS_WITH_OFFSET {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(&normalized, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for layout in LAYOUTS_NAIVE {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn replace_zone_name(value: &str) -> String {
    match value.rsplit_once(' ') {
        Some((head, zone)) => match ZONES.iter().find(|(name, _)| *name == zone) {
            Some((_, offset)) => format!("{head} {offset}"),
            None => value.to_string(),
        },
        None => value.to_string(),
    }
}
