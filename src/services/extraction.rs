//! Field extraction from recognized label and compass text.
//!
//! Every extractor is an ordered list of strategies. Each strategy returns
//! an optional result and the first hit wins, so each fallback can be
//! tested on its own. "Nothing found" is a normal `None`, never an error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::photo::ExtractedFields;

/// Vendor prefixes that are expected on this fleet's hardware.
const PREFERRED_OUIS: &[&str] = &["CC:54:FE"];

/// Packaging words that look like serials to a naive token scan.
const RSN_STOPWORDS: &[&str] = &[
    "COMMODITY", "INDIA", "MADEININDIA", "WARRANTY", "MODEL", "MANUFACTURED", "EXPIRY", "BATCH",
    "ADDRESS", "CONTACT", "SUPPORT", "SERVICE", "HELPLINE", "SERIES", "PRODUCT", "POWER", "VOLT",
    "AMPS", "HERTZ", "DATE", "CODE", "EAN",
];

static MAC_LINE_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:MAC(?:\s*ID)?|WLAN\s*MAC|WIFI\s*MAC|LAN\s*MAC|ETH(?:ERNET)?\s*MAC)\b")
        .unwrap()
});

// Value class admits the glyphs OCR confuses with hex digits.
static MAC_KEYWORD_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:MAC(?:\s*ID)?|WLAN\s*MAC|WIFI\s*MAC|LAN\s*MAC|ETH(?:ERNET)?\s*MAC)\b[:\-\s]*([0-9A-FOQILSZ:\-.\s]{12,64})",
    )
    .unwrap()
});

static MAC_SEPARATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[0-9A-Fa-f]{2}[:\-.]){5}[0-9A-Fa-f]{2}\b").unwrap());

static MAC_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9A-Fa-f]{12}\b").unwrap());

// Applied to cleaned text, which has no word boundaries left.
static MAC_CLEANED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[0-9A-F]{2}[:\-.]){5}[0-9A-F]{2}").unwrap());

static MAC_SHAPED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9A-F]{2}[:\-.]){5}[0-9A-F]{2}$").unwrap());

static HEX_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9A-F]{2}").unwrap());

static RSN_LABELED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:RSN|S/N|SERIAL|SRN|ASN)(?:\s*(?:NO|NUMBER)\.?)?\s*[:#\-]?\s*([A-Z0-9\-]{6,24})\b",
    )
    .unwrap()
});

static RSN_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z0-9\-]{6,24}").unwrap());

static ANGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?P<deg>\d{1,3})\s*(?:°|º|deg(?:rees)?\b)?\s*(?P<dir>NE|NW|SE|SW|N|E|S|W)?\b",
    )
    .unwrap()
});

// A unit mark or an intercardinal direction. A lone N/E/S/W after a number
// is too common on labels ("Rev 2 E") to count.
static DEGREE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?P<deg>\d{1,3})\s*(?:°|º|deg(?:rees)?\b|(?:NE|NW|SE|SW)\b)").unwrap()
});

/// A compass reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Azimuth {
    pub degrees: u16,
    pub direction: Option<String>,
}

/// A scored MAC reading.
#[derive(Debug, Clone, PartialEq)]
struct MacCandidate {
    mac: String,
    score: f64,
    colon_origin: bool,
}

type TextStrategy<T> = fn(&[&str]) -> Option<T>;
type LineStrategy = fn(&str, usize) -> Option<MacCandidate>;

const MAC_STRATEGIES: &[TextStrategy<MacCandidate>] =
    &[mac_from_keyword_lines, mac_from_strict_patterns, mac_from_cleaned_lines];

/// Tried in order on each keyword line; first hit wins for that line.
const MAC_KEYWORD_LINE_STRATEGIES: &[LineStrategy] =
    &[keyword_value, strict_pattern_on_line, pair_window_after_keyword];

const RSN_STRATEGIES: &[TextStrategy<String>] = &[labeled_rsn, best_unlabeled_rsn];

const AZIMUTH_STRATEGIES: &[TextStrategy<Azimuth>] = &[reading_with_direction, bare_reading];

fn first_hit<T>(strategies: &[TextStrategy<T>], lines: &[&str]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(lines))
}

fn split_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
}

/// Recover a MAC address in canonical `AA:BB:CC:DD:EE:FF` form.
pub fn extract_mac(text: &str) -> Option<String> {
    first_hit(MAC_STRATEGIES, &split_lines(text)).map(|c| c.mac)
}

/// Recover a serial/RSN code, upper-cased.
pub fn extract_rsn(text: &str) -> Option<String> {
    first_hit(RSN_STRATEGIES, &split_lines(text))
}

/// Recover a compass reading with degrees in `0..=360`.
pub fn extract_azimuth(text: &str) -> Option<Azimuth> {
    first_hit(AZIMUTH_STRATEGIES, &split_lines(text))
}

/// Whether the text carries something that reads like a compass value.
pub fn mentions_degrees(text: &str) -> bool {
    DEGREE_TOKEN
        .captures_iter(text)
        .any(|caps| caps["deg"].parse::<u16>().is_ok_and(|deg| deg <= 360))
}

/// MAC and RSN for label photos.
pub fn extract_label_fields(text: &str) -> ExtractedFields {
    ExtractedFields {
        mac_id: extract_mac(text),
        rsn: extract_rsn(text),
        ..Default::default()
    }
}

/// Degrees and direction for compass photos.
pub fn extract_azimuth_fields(text: &str) -> ExtractedFields {
    match extract_azimuth(text) {
        Some(a) => ExtractedFields {
            azimuth_deg: Some(a.degrees),
            azimuth_dir: a.direction,
            ..Default::default()
        },
        None => ExtractedFields::default(),
    }
}

// ── MAC ─────────────────────────────────────────────────────────────────

/// Map OCR look-alikes onto hex digits and drop everything except hex and
/// the `:` `-` `.` separators.
fn cleanup_hexish(raw: &str) -> String {
    raw.chars()
        .map(|c| match c.to_ascii_uppercase() {
            'O' | 'Q' => '0',
            'I' | 'L' => '1',
            'S' => '5',
            'B' => '8',
            'Z' => '2',
            other => other,
        })
        .filter(|c| c.is_ascii_hexdigit() || matches!(c, ':' | '-' | '.'))
        .collect()
}

/// Score every 6-pair window of a MAC-like string and keep the best.
fn normalize_mac(raw: &str) -> Option<MacCandidate> {
    let cleaned = cleanup_hexish(raw);
    let pairs: Vec<&str> = HEX_PAIR.find_iter(&cleaned).map(|m| m.as_str()).collect();
    if pairs.len() < 6 {
        return None;
    }

    let separated = cleaned.contains([':', '-', '.']);
    let sep_bonus = if separated { 1.0 } else { 0.0 };

    let mut best: Option<MacCandidate> = None;
    for window in pairs.windows(6) {
        let mac = window.join(":");
        let oui_bonus = if PREFERRED_OUIS.contains(&&mac[..8]) { 2.0 } else { 0.0 };
        let digitful = window
            .iter()
            .filter(|p| p.chars().any(|c| c.is_ascii_digit()))
            .count() as f64
            / 6.0;
        let score = sep_bonus + oui_bonus + digitful;
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(MacCandidate {
                mac,
                score,
                colon_origin: cleaned.contains(':'),
            });
        }
    }
    best
}

/// Highest score wins; colon-separated origin breaks ties; then earliest.
fn best_candidate(candidates: Vec<MacCandidate>) -> Option<MacCandidate> {
    candidates.into_iter().fold(None, |best, c| match best {
        None => Some(c),
        Some(b) => {
            let better = c.score > b.score
                || (c.score == b.score && c.colon_origin && !b.colon_origin);
            Some(if better { c } else { b })
        }
    })
}

fn is_barcode_line(line: &str) -> bool {
    line.to_uppercase().contains("EAN")
}

fn mac_from_keyword_lines(lines: &[&str]) -> Option<MacCandidate> {
    let candidates = lines
        .iter()
        .filter(|line| !is_barcode_line(line))
        .filter_map(|line| {
            let hint = MAC_LINE_HINT.find(line)?;
            MAC_KEYWORD_LINE_STRATEGIES
                .iter()
                .find_map(|strategy| strategy(line, hint.end()))
        })
        .collect();
    best_candidate(candidates)
}

fn keyword_value(line: &str, _keyword_end: usize) -> Option<MacCandidate> {
    let caps = MAC_KEYWORD_VALUE.captures(line)?;
    normalize_mac(caps.get(1)?.as_str())
}

fn strict_pattern_on_line(line: &str, _keyword_end: usize) -> Option<MacCandidate> {
    [&*MAC_SEPARATED, &*MAC_BARE]
        .iter()
        .filter_map(|pattern| pattern.find(line))
        .find_map(|m| normalize_mac(m.as_str()))
}

fn pair_window_after_keyword(line: &str, keyword_end: usize) -> Option<MacCandidate> {
    let tail = cleanup_hexish(&line[keyword_end..]);
    let pairs: Vec<&str> = tail
        .split(|c: char| !c.is_ascii_hexdigit())
        .filter(|t| t.len() == 2)
        .collect();
    if pairs.len() < 6 {
        return None;
    }
    normalize_mac(&pairs.join(":"))
}

fn mac_from_strict_patterns(lines: &[&str]) -> Option<MacCandidate> {
    let candidates = lines
        .iter()
        .filter(|line| !is_barcode_line(line))
        .filter_map(|line| strict_pattern_on_line(line, 0))
        .collect();
    best_candidate(candidates)
}

fn mac_from_cleaned_lines(lines: &[&str]) -> Option<MacCandidate> {
    lines
        .iter()
        .filter(|line| !is_barcode_line(line))
        .find_map(|line| {
            let cleaned = cleanup_hexish(line);
            MAC_CLEANED
                .find(&cleaned)
                .and_then(|m| normalize_mac(m.as_str()))
        })
}

// ── RSN ─────────────────────────────────────────────────────────────────

fn digit_count(token: &str) -> usize {
    token.chars().filter(|c| c.is_ascii_digit()).count()
}

fn is_probable_rsn(token: &str) -> bool {
    let t = token.trim().to_uppercase();
    (8..=24).contains(&t.len())
        && !MAC_SHAPED_TOKEN.is_match(&t)
        && !RSN_STOPWORDS.contains(&t.as_str())
        && digit_count(&t) >= 3
}

fn labeled_rsn(lines: &[&str]) -> Option<String> {
    lines.iter().find_map(|line| {
        RSN_LABELED
            .captures_iter(line)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .find(|token| is_probable_rsn(token))
    })
}

/// Most digits wins, then the longest token, then the earliest.
fn best_unlabeled_rsn(lines: &[&str]) -> Option<String> {
    let mut best: Option<(usize, usize, String)> = None;
    for line in lines {
        let upper = line.to_uppercase();
        for m in RSN_TOKEN.find_iter(&upper) {
            let token = m.as_str();
            if !is_probable_rsn(token) {
                continue;
            }
            let key = (digit_count(token), token.len());
            if best.as_ref().map_or(true, |(d, l, _)| key > (*d, *l)) {
                best = Some((key.0, key.1, token.to_string()));
            }
        }
    }
    best.map(|(_, _, token)| token)
}

// ── Azimuth ─────────────────────────────────────────────────────────────

fn readings<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = Azimuth> + 'a {
    lines.iter().copied().flat_map(|line| {
        ANGLE.captures_iter(line).filter_map(|caps| {
            let degrees: u16 = caps.name("deg")?.as_str().parse().ok()?;
            if degrees > 360 {
                return None;
            }
            Some(Azimuth {
                degrees,
                direction: caps.name("dir").map(|d| d.as_str().to_uppercase()),
            })
        })
    })
}

fn reading_with_direction(lines: &[&str]) -> Option<Azimuth> {
    readings(lines).find(|a| a.direction.is_some())
}

fn bare_reading(lines: &[&str]) -> Option<Azimuth> {
    readings(lines).next()
}
