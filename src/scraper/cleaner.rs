use scraper::Html;
use url::Url;

// ── Text ──────────────────────────────────────────────────────────────────────

/// Texts the sites render in place of a value.
const PLACEHOLDERS: &[&str] = &["n/a", "-", "—", "unknown", "not found", "none"];

/// Trim and collapse internal whitespace; placeholders and blanks become `None`.
/// "  Senior \n Engineer " → "Senior Engineer" | "N/A" → None
pub fn clean_text(s: &str) -> Option<String> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || PLACEHOLDERS.contains(&collapsed.to_lowercase().as_str()) {
        return None;
    }
    Some(collapsed)
}

/// Reduce an HTML fragment to its visible text.
pub fn html_to_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    clean_text(&text)
}

// ── Combinators ───────────────────────────────────────────────────────────────

/// Multi-valued field: non-empty parts joined by `separator`.
pub fn join_values<I, S>(values: I, separator: &str) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = values
        .into_iter()
        .filter_map(|v| clean_text(v.as_ref()))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(separator))
    }
}

/// "{min} - {max}", falling back to whichever bound is present.
pub fn format_range(min: Option<&str>, max: Option<&str>) -> Option<String> {
    match (min.and_then(clean_text), max.and_then(clean_text)) {
        (Some(lo), Some(hi)) if lo == hi => Some(lo),
        (Some(lo), Some(hi)) => Some(format!("{} - {}", lo, hi)),
        (Some(lo), None) => Some(lo),
        (None, Some(hi)) => Some(hi),
        (None, None) => None,
    }
}

// ── Transforms ────────────────────────────────────────────────────────────────

/// Text after the last `delimiter`. "Level: Senior" → "Senior"
pub fn after_last(s: &str, delimiter: &str) -> Option<String> {
    let tail = match s.rfind(delimiter) {
        Some(i) => &s[i + delimiter.len()..],
        None => s,
    };
    clean_text(tail)
}

/// Path segment `from_end` places from the end (1 = last), ignoring a trailing slash.
/// "https://x.com/jobs/4411/" with 1 → "4411"
pub fn url_segment(url: &str, from_end: usize) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    if from_end == 0 || from_end > segments.len() {
        return None;
    }
    clean_text(segments[segments.len() - from_end])
}

/// Resolve a possibly relative `href` against the page it was found on.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(abs) => Some(abs.to_string()),
        Err(_) => Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}
