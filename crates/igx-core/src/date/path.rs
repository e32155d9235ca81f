use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static NUMERIC_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{10,}").unwrap());

/// `media/<posts|reels>/<YYYY><MM>/` anywhere in a `/`-separated path
static FOLDER_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)media/(?:posts|reels)/(\d{4})(\d{2})/").unwrap());

/// Trailing path segment of a URI or path, with any query string or fragment removed.
/// Returns `None` for references that end in a separator.
pub fn reference_basename(reference: &str) -> Option<&str> {
    let trimmed = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let name = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Every run of 10 or more digits in a filename, in order of appearance.
pub fn numeric_tokens(name: &str) -> Vec<&str> {
    NUMERIC_TOKEN_RE.find_iter(name).map(|m| m.as_str()).collect()
}

/// Mid-month noon UTC for a path under `media/posts/YYYYMM/` or `media/reels/YYYYMM/`.
/// Only year and month are known, so the day and hour are fixed at 15 and 12:00.
pub fn folder_date_ms(path: &Path) -> Option<i64> {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let caps = FOLDER_DATE_RE.captures(&normalized)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let dt = NaiveDate::from_ymd_opt(year, month, 15)?.and_hms_opt(12, 0, 0)?;
    Some(Utc.from_utc_datetime(&dt).timestamp_millis())
}
