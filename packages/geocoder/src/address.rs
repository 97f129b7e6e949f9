//! Address parsing for listing feeds.
//!
//! Listing providers deliver free-form Canadian addresses in many shapes:
//! - Unit prefixes: `"Apt 2700 - 456 Queen Street"`, `"2700-456 Queen St"`
//! - Trailing units and floors: `"1425 Gerrard Street E 2nd Flr"`, `"395 Dundas St W 603"`
//! - Regional area codes glued to the city: `"Toronto E01"`
//! - Repeated city segments: `"London South, ON N6M 0K1, London South, ON"`
//!
//! [`parse`] decomposes these into [`AddressComponents`]. It never fails:
//! anything it cannot recognize is left empty.

use std::sync::LazyLock;

use listing_geocoder_models::AddressComponents;
use regex::Regex;

use crate::tables;

/// Leading unit designator followed by a separator and the real address.
static LEADING_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^((?:(?:apt|apartment|unit|suite|ste|ph|penthouse)\b\.?|#)\s*#?\s*[A-Z]?\d+[A-Z]?)\s*[-,]\s*(\S.*)$",
    )
    .expect("valid regex")
});

/// `"2700-456 Queen St"`: unit number, dash, civic number.
static UNIT_DASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([A-Z]?\d+[A-Z]?)\s*-\s*(\d+[A-Z]?\s+\S.*)$").expect("valid regex")
});

/// Canadian postal code, with or without the inner space.
static POSTAL_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z]\d[A-Z])\s?(\d[A-Z]\d)\b").expect("valid regex")
});

/// Regional area code trailing a city name (`"Toronto E01"`).
static AREA_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+[A-Z]\d{2}$").expect("valid regex"));

/// Leading civic number.
static HOUSE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+[A-Z]?)\b\s*(.*)$").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

static FLOOR_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\b(\d+(?:st|nd|rd|th)\s+(?:flr|floor|fl)\b\.?)").expect("valid regex")
});

static DIRECTION_TRAILING_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let types = alternation(&tables::street_type_aliases());
    let directions = alternation(&tables::direction_aliases());
    Regex::new(&format!(
        r"(?i)^(.*\b(?:{types})\b\.?\s+(?:{directions})\b\.?)\s+(#?\d+[A-Z]{{0,2}})$"
    ))
    .expect("valid regex")
});

static TYPE_TRAILING_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let types = alternation(&tables::street_type_aliases());
    Regex::new(&format!(
        r"(?i)^(.*\S\s+(?:{types})\b\.?)\s+(#?\d+[A-Z]{{0,2}})$"
    ))
    .expect("valid regex")
});

static BARE_TRAILING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*\S\s+\S+)\s+(\d+[A-Z]?)$").expect("valid regex")
});

static HASH_UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(#\s*[A-Z0-9-]+)").expect("valid regex"));

static PENTHOUSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(PH(?:\s*\d+[A-Z]?)?)$").expect("valid regex"));

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

/// Collapses runs of whitespace and trims separator debris.
fn tidy(s: &str) -> String {
    WHITESPACE_RE
        .replace_all(s, " ")
        .trim()
        .trim_matches(|c: char| c == ',' || c == '-')
        .trim()
        .to_string()
}

/// A fragment removed by a [`CleanupRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    /// The street text with the fragment removed.
    pub rest: String,
    /// The fragment that was removed.
    pub removed: String,
}

/// A named street-noise removal pass.
#[derive(Clone, Copy)]
pub struct CleanupRule {
    /// Short identifier used in debug logging.
    pub name: &'static str,
    apply: fn(&str) -> Option<Stripped>,
}

impl std::fmt::Debug for CleanupRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CleanupRule {
    /// Runs the rule, returning `None` when it does not apply.
    #[must_use]
    pub fn apply(&self, street: &str) -> Option<Stripped> {
        (self.apply)(street)
    }
}

/// Street cleanup passes, in application order. The order matters: the
/// directional and street-type rules must see trailing numbers before the
/// generic trailing-number rule consumes them.
pub static STREET_RULES: &[CleanupRule] = &[
    CleanupRule {
        name: "floor_phrase",
        apply: strip_floor_phrase,
    },
    CleanupRule {
        name: "direction_trailing_unit",
        apply: strip_direction_trailing_unit,
    },
    CleanupRule {
        name: "type_trailing_unit",
        apply: strip_type_trailing_unit,
    },
    CleanupRule {
        name: "unit_keyword",
        apply: strip_unit_keyword,
    },
    CleanupRule {
        name: "bare_trailing_number",
        apply: strip_bare_trailing_number,
    },
    CleanupRule {
        name: "hash_unit",
        apply: strip_hash_unit,
    },
    CleanupRule {
        name: "penthouse",
        apply: strip_penthouse,
    },
];

fn strip_floor_phrase(street: &str) -> Option<Stripped> {
    let caps = FLOOR_PHRASE_RE.captures(street)?;
    Some(Stripped {
        rest: tidy(&FLOOR_PHRASE_RE.replace_all(street, "")),
        removed: caps[1].to_string(),
    })
}

/// For regexes shaped `^(keep)\s+(tail)$`.
fn strip_captured_tail(re: &Regex, street: &str) -> Option<Stripped> {
    let caps = re.captures(street)?;
    Some(Stripped {
        rest: tidy(&caps[1]),
        removed: caps[2].to_string(),
    })
}

fn strip_direction_trailing_unit(street: &str) -> Option<Stripped> {
    strip_captured_tail(&DIRECTION_TRAILING_UNIT_RE, street)
}

fn strip_type_trailing_unit(street: &str) -> Option<Stripped> {
    strip_captured_tail(&TYPE_TRAILING_UNIT_RE, street)
}

fn strip_bare_trailing_number(street: &str) -> Option<Stripped> {
    strip_captured_tail(&BARE_TRAILING_NUMBER_RE, street)
}

fn strip_hash_unit(street: &str) -> Option<Stripped> {
    let caps = HASH_UNIT_RE.captures(street)?;
    Some(Stripped {
        rest: tidy(&HASH_UNIT_RE.replace_all(street, "")),
        removed: caps[1].to_string(),
    })
}

fn strip_penthouse(street: &str) -> Option<Stripped> {
    let caps = PENTHOUSE_RE.captures(street)?;
    Some(Stripped {
        rest: tidy(&PENTHOUSE_RE.replace(street, "")),
        removed: caps[1].to_string(),
    })
}

/// Removes `"Apt 5"`, `"Suite 200B"`, `"Bsmt"`, `"Lower Level"` and the like
/// from the end of a street. Keywords that double as street words (`"Main"`,
/// `"Upper"`) are only treated as units when they clearly trail the street.
fn strip_unit_keyword(street: &str) -> Option<Stripped> {
    let tokens: Vec<&str> = street.split_whitespace().collect();
    let is_street_word = |t: &str| tables::street_type(t).is_some() || tables::direction(t).is_some();

    let idx = (1..tokens.len()).find(|&i| {
        if !tables::is_unit_keyword(tokens[i]) {
            return false;
        }
        match &tokens[i + 1..] {
            [] => is_street_word(tokens[i - 1]),
            [next] => {
                let designator = next.chars().any(|c| c.is_ascii_digit())
                    || (next.len() <= 2 && next.chars().all(char::is_alphanumeric))
                    || tables::is_unit_keyword(next);
                designator && !is_street_word(next)
            }
            _ => false,
        }
    })?;

    Some(Stripped {
        rest: tokens[..idx].join(" "),
        removed: tokens[idx..].join(" "),
    })
}

/// Applies every [`STREET_RULES`] pass to a street (without house number).
///
/// Returns the cleaned street and the first removed fragment, which is
/// usually the unit.
#[must_use]
pub fn clean_street(street: &str) -> (String, Option<String>) {
    let mut current = tidy(street);
    let mut unit = None;

    for rule in STREET_RULES {
        if let Some(stripped) = rule.apply(&current) {
            log::trace!(
                "Street rule {} removed '{}' from '{current}'",
                rule.name,
                stripped.removed
            );
            if unit.is_none() && !stripped.removed.trim().is_empty() {
                unit = Some(stripped.removed.trim().to_string());
            }
            current = stripped.rest;
        }
    }

    (current, unit)
}

/// Cleans a full street line, keeping its civic number in front.
#[must_use]
pub fn clean_street_line(line: &str) -> String {
    let line = tidy(line);
    match HOUSE_NUMBER_RE.captures(&line) {
        Some(caps) => {
            let (street, _) = clean_street(&caps[2]);
            tidy(&format!("{} {street}", &caps[1]))
        }
        None => clean_street(&line).0,
    }
}

/// Removes a leading unit designator (`"Apt 2700 - "`, `"2700-"`).
///
/// Returns the remaining address and the unit, if one was found.
#[must_use]
pub fn strip_leading_unit(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim();

    if let Some(caps) = LEADING_UNIT_RE.captures(trimmed) {
        return (caps[2].trim().to_string(), Some(tidy(&caps[1])));
    }

    if let Some(caps) = UNIT_DASH_RE.captures(trimmed) {
        return (caps[2].trim().to_string(), Some(caps[1].to_uppercase()));
    }

    (trimmed.to_string(), None)
}

/// Finds a postal code and returns it formatted as `"A1A 1A1"`.
#[must_use]
pub fn find_postal_code(s: &str) -> Option<String> {
    POSTAL_CODE_RE
        .captures(s)
        .map(|caps| format!("{} {}", caps[1].to_uppercase(), caps[2].to_uppercase()))
}

/// Removes every postal code occurrence.
#[must_use]
pub fn remove_postal_codes(s: &str) -> String {
    POSTAL_CODE_RE.replace_all(s, "").to_string()
}

/// Removes a trailing regional area code (`"Toronto E01"` → `"Toronto"`).
#[must_use]
pub fn strip_area_code(city: &str) -> String {
    tidy(&AREA_CODE_RE.replace(city.trim(), ""))
}

/// Removes a trailing subdivision word (`"London South"` → `"London"`).
///
/// A city that is nothing but the subdivision word is returned unchanged.
#[must_use]
pub fn strip_city_subdivision(city: &str) -> String {
    let city = city.trim();
    if let Some((head, last)) = city.rsplit_once(char::is_whitespace) {
        let is_subdivision = tables::CITY_SUBDIVISIONS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(last));
        if is_subdivision && !head.trim().is_empty() {
            return head.trim().to_string();
        }
    }
    city.to_string()
}

/// Splits on commas, drops empty segments, and removes repeats
/// (case-insensitive, first occurrence wins).
#[must_use]
pub fn split_segments(s: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in s.split(',').map(tidy) {
        if segment.is_empty() || segments.iter().any(|s| s.eq_ignore_ascii_case(&segment)) {
            continue;
        }
        segments.push(segment);
    }
    segments
}

fn is_country(segment: &str) -> bool {
    segment.eq_ignore_ascii_case("canada") || segment.eq_ignore_ascii_case("ca")
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

pub(crate) fn is_unit_segment(segment: &str) -> bool {
    segment.starts_with('#')
        || segment
            .split_whitespace()
            .next()
            .is_some_and(tables::is_unit_keyword)
}

/// Parses a raw listing address into components.
#[must_use]
pub fn parse(raw: &str) -> AddressComponents {
    let mut components = AddressComponents::default();

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return components;
    }

    let (working, unit) = strip_leading_unit(trimmed);
    components.unit = unit;

    components.postal_code = find_postal_code(&working);
    let working = remove_postal_codes(&working);

    let mut segments = split_segments(&working);

    if segments.last().is_some_and(|s| is_country(s)) {
        segments.pop();
        components.country = Some(listing_geocoder_models::DEFAULT_COUNTRY.to_string());
    }

    extract_province(&mut segments, &mut components);

    let city_present = segments.len() >= 2
        || segments
            .first()
            .is_some_and(|s| !starts_with_digit(s) && !is_unit_segment(s));
    if city_present && let Some(city) = segments.pop() {
        components.city = strip_area_code(&city);
    }

    if segments.len() > 1 && is_unit_segment(&segments[0]) {
        let unit = segments.remove(0);
        components.unit.get_or_insert(unit);
    }

    let street = segments.join(" ");
    parse_street(&street, &mut components);

    components
}

/// Pulls the province out of the trailing segment(s), and discards stray
/// province or country segments left behind by repeated-city noise.
fn extract_province(segments: &mut Vec<String>, components: &mut AddressComponents) {
    if let Some(code) = segments.last().and_then(|s| tables::province_code(s)) {
        components.province = Some(code.to_string());
        segments.pop();
    } else if segments.len() >= 2
        && let Some(last) = segments.last_mut()
        && let Some((head, token)) = last.rsplit_once(char::is_whitespace)
        && let Some(code) = tables::province_code(token)
    {
        components.province = Some(code.to_string());
        *last = tidy(head);
    }

    let mut index = 1;
    while index < segments.len() {
        let segment = &segments[index];
        if let Some(code) = tables::province_code(segment) {
            components.province.get_or_insert_with(|| code.to_string());
            segments.remove(index);
        } else if is_country(segment) {
            components
                .country
                .get_or_insert_with(|| listing_geocoder_models::DEFAULT_COUNTRY.to_string());
            segments.remove(index);
        } else {
            index += 1;
        }
    }
}

/// Splits a street line into house number, name, type, and direction.
fn parse_street(street: &str, components: &mut AddressComponents) {
    let street = tidy(street);
    if street.is_empty() {
        return;
    }

    let remainder = match HOUSE_NUMBER_RE.captures(&street) {
        Some(caps) => {
            components.house_number = Some(caps[1].to_uppercase());
            caps[2].to_string()
        }
        None => street.clone(),
    };

    let (cleaned, unit) = clean_street(&remainder);
    if components.unit.is_none() {
        components.unit = unit;
    }

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();

    if tokens.len() >= 2
        && let Some(direction) = tokens.last().and_then(|t| tables::direction(t))
    {
        components.direction = Some(direction.abbr.to_string());
        tokens.pop();
    }

    let mut type_token = None;
    if let Some(street_type) = tokens.last().and_then(|t| tables::street_type(t)) {
        components.street_type = Some(street_type.abbr.to_string());
        type_token = tokens.pop();
    }

    components.street_name = tokens.join(" ");

    if components.street_name.is_empty()
        && let Some(token) = type_token
    {
        components.street_name = token.trim_end_matches('.').to_string();
        components.street_type = None;
    }
}
