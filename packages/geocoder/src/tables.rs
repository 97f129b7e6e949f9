#![allow(clippy::too_many_lines)]
//! Street type, directional, province, and unit keyword tables.
//!
//! All lookups are keyed by the uppercase token with any trailing period
//! removed, so `"st."`, `"St"` and `"STREET"` resolve to the same entry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Canonical abbreviation and full word for a street type or direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonical {
    /// Abbreviated form (`"St"`, `"E"`).
    pub abbr: &'static str,
    /// Full word (`"Street"`, `"East"`).
    pub full: &'static str,
}

/// `(full word, abbreviation, extra aliases)` per Canada Post street type.
const STREET_TYPE_ENTRIES: &[(&str, &str, &[&str])] = &[
    ("Street", "St", &[]),
    ("Avenue", "Ave", &["AV"]),
    ("Road", "Rd", &[]),
    ("Drive", "Dr", &[]),
    ("Boulevard", "Blvd", &["BLV"]),
    ("Crescent", "Cres", &["CRESC", "CR"]),
    ("Court", "Crt", &["CT"]),
    ("Place", "Pl", &[]),
    ("Lane", "Lane", &["LN"]),
    ("Circle", "Cir", &["CIRC"]),
    ("Terrace", "Terr", &["TER"]),
    ("Trail", "Trail", &["TRL"]),
    ("Parkway", "Pky", &["PKWY"]),
    ("Highway", "Hwy", &[]),
    ("Square", "Sq", &[]),
    ("Gardens", "Gdns", &[]),
    ("Heights", "Hts", &[]),
    ("Grove", "Grove", &["GRV"]),
    ("Gate", "Gate", &[]),
    ("Way", "Way", &[]),
    ("Line", "Line", &[]),
    ("Sideroad", "Sdrd", &[]),
    ("Concession", "Conc", &[]),
    ("Close", "Cl", &[]),
    ("Common", "Common", &["CMN"]),
    ("Crossing", "Cross", &["XING"]),
    ("Glen", "Glen", &[]),
    ("Green", "Green", &["GRN"]),
    ("Hill", "Hill", &[]),
    ("Landing", "Landng", &["LNDG"]),
    ("Mews", "Mews", &[]),
    ("Park", "Pk", &[]),
    ("Path", "Path", &[]),
    ("Point", "Pt", &[]),
    ("Promenade", "Prom", &[]),
    ("Ridge", "Ridge", &[]),
    ("Row", "Row", &[]),
    ("Run", "Run", &[]),
    ("Walk", "Walk", &[]),
    ("Wynd", "Wynd", &[]),
    ("Esplanade", "Espl", &[]),
    ("Quay", "Quay", &[]),
];

/// `(full word, abbreviation)` per compass direction.
const DIRECTION_ENTRIES: &[(&str, &str)] = &[
    ("North", "N"),
    ("South", "S"),
    ("East", "E"),
    ("West", "W"),
    ("Northeast", "NE"),
    ("Northwest", "NW"),
    ("Southeast", "SE"),
    ("Southwest", "SW"),
];

/// `(code, English name, other accepted names)` per province and territory.
const PROVINCE_ENTRIES: &[(&str, &str, &[&str])] = &[
    ("ON", "Ontario", &["ONT"]),
    ("QC", "Quebec", &["QUÉBEC", "PQ", "QUE"]),
    ("BC", "British Columbia", &["COLOMBIE-BRITANNIQUE"]),
    ("AB", "Alberta", &["ALTA"]),
    ("MB", "Manitoba", &["MAN"]),
    ("SK", "Saskatchewan", &["SASK"]),
    ("NS", "Nova Scotia", &["NOUVELLE-ÉCOSSE"]),
    ("NB", "New Brunswick", &["NOUVEAU-BRUNSWICK"]),
    ("NL", "Newfoundland and Labrador", &["NEWFOUNDLAND", "NF", "NFLD"]),
    ("PE", "Prince Edward Island", &["PEI", "ÎLE-DU-PRINCE-ÉDOUARD"]),
    ("NT", "Northwest Territories", &["NWT"]),
    ("YT", "Yukon", &["YUKON TERRITORY"]),
    ("NU", "Nunavut", &[]),
];

/// Keywords that introduce a unit, suite, or floor designator.
pub const UNIT_KEYWORDS: &[&str] = &[
    "APT",
    "APARTMENT",
    "UNIT",
    "SUITE",
    "STE",
    "BSMT",
    "BASEMENT",
    "MAIN",
    "UPPER",
    "LOWER",
    "FLOOR",
    "FLR",
    "LEVEL",
    "LVL",
    "RM",
    "ROOM",
    "PH",
    "PENTHOUSE",
];

/// Trailing city words that name a subdivision of a larger municipality
/// (`"London South"`, `"Toronto Central"`).
pub const CITY_SUBDIVISIONS: &[&str] = &["North", "South", "East", "West", "Central"];

/// Abbreviations that appear inside street and place names.
const NAME_ABBREVIATIONS: &[(&str, &str)] = &[
    ("ST", "Saint"),
    ("STE", "Sainte"),
    ("MT", "Mount"),
    ("FT", "Fort"),
    ("PT", "Point"),
];

static STREET_TYPES: LazyLock<BTreeMap<String, Canonical>> = LazyLock::new(|| {
    let mut map = BTreeMap::new();
    for &(full, abbr, aliases) in STREET_TYPE_ENTRIES {
        let canonical = Canonical { abbr, full };
        map.insert(full.to_uppercase(), canonical);
        map.insert(abbr.to_uppercase(), canonical);
        for alias in aliases {
            map.insert((*alias).to_string(), canonical);
        }
    }
    map
});

static DIRECTIONS: LazyLock<BTreeMap<String, Canonical>> = LazyLock::new(|| {
    DIRECTION_ENTRIES
        .iter()
        .flat_map(|&(full, abbr)| {
            let canonical = Canonical { abbr, full };
            [(full.to_uppercase(), canonical), (abbr.to_string(), canonical)]
        })
        .collect()
});

static PROVINCES: LazyLock<BTreeMap<String, &'static str>> = LazyLock::new(|| {
    let mut map = BTreeMap::new();
    for &(code, name, aliases) in PROVINCE_ENTRIES {
        map.insert(code.to_string(), code);
        map.insert(name.to_uppercase(), code);
        for alias in aliases {
            map.insert((*alias).to_string(), code);
        }
    }
    map
});

static UNIT_KEYWORD_SET: LazyLock<BTreeSet<&'static str>> =
    LazyLock::new(|| UNIT_KEYWORDS.iter().copied().collect());

fn key(token: &str) -> String {
    token.trim().trim_end_matches('.').to_uppercase()
}

/// Looks up a street type by any accepted spelling.
#[must_use]
pub fn street_type(token: &str) -> Option<Canonical> {
    STREET_TYPES.get(&key(token)).copied()
}

/// Looks up a direction by abbreviation or full word.
#[must_use]
pub fn direction(token: &str) -> Option<Canonical> {
    DIRECTIONS.get(&key(token)).copied()
}

/// Resolves a province code or name to its two-letter code.
#[must_use]
pub fn province_code(token: &str) -> Option<&'static str> {
    PROVINCES.get(&key(token)).copied()
}

/// Returns the English name of a two-letter province code.
#[must_use]
pub fn province_name(code: &str) -> Option<&'static str> {
    let code = key(code);
    PROVINCE_ENTRIES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, _)| *name)
}

/// Whether `token` introduces a unit designator.
#[must_use]
pub fn is_unit_keyword(token: &str) -> bool {
    UNIT_KEYWORD_SET.contains(key(token).as_str())
}

/// Expands an in-name abbreviation (`"St"` → `"Saint"`), if it is one.
#[must_use]
pub fn expand_name_abbreviation(token: &str) -> Option<&'static str> {
    let token = key(token);
    NAME_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, full)| *full)
}

/// Every street type spelling, longest first, for building alternations.
#[must_use]
pub fn street_type_aliases() -> Vec<&'static str> {
    let mut aliases: Vec<&'static str> = STREET_TYPE_ENTRIES
        .iter()
        .flat_map(|&(full, abbr, extra)| [full, abbr].into_iter().chain(extra.iter().copied()))
        .collect();
    aliases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    aliases.dedup();
    aliases
}

/// Every direction spelling, longest first.
#[must_use]
pub fn direction_aliases() -> Vec<&'static str> {
    let mut aliases: Vec<&'static str> = DIRECTION_ENTRIES
        .iter()
        .flat_map(|&(full, abbr)| [full, abbr])
        .collect();
    aliases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_street_types_in_any_form() {
        let street = Canonical {
            abbr: "St",
            full: "Street",
        };
        assert_eq!(street_type("Street"), Some(street));
        assert_eq!(street_type("st."), Some(street));
        assert_eq!(street_type("ST"), Some(street));
        assert_eq!(street_type("CT").map(|c| c.full), Some("Court"));
        assert_eq!(street_type("Queen"), None);
    }

    #[test]
    fn resolves_directions() {
        assert_eq!(direction("w").map(|c| c.full), Some("West"));
        assert_eq!(direction("East").map(|c| c.abbr), Some("E"));
        assert_eq!(direction("Ea"), None);
    }

    #[test]
    fn resolves_provinces() {
        assert_eq!(province_code("on"), Some("ON"));
        assert_eq!(province_code("Ontario"), Some("ON"));
        assert_eq!(province_code("British Columbia"), Some("BC"));
        assert_eq!(province_code("Toronto"), None);
        assert_eq!(province_name("qc"), Some("Quebec"));
    }

    #[test]
    fn recognizes_unit_keywords() {
        assert!(is_unit_keyword("Apt"));
        assert!(is_unit_keyword("bsmt."));
        assert!(!is_unit_keyword("Queen"));
    }

    #[test]
    fn aliases_are_longest_first() {
        let aliases = street_type_aliases();
        assert!(aliases.contains(&"Street"));
        for pair in aliases.windows(2) {
            assert!(pair[0].len() >= pair[1].len());
        }
    }
}
