//! Geocoder query variants.
//!
//! [`generate`] composes up to four canonical query strings from parsed
//! components, most specific first. [`supplementary`] derives extra
//! queries straight from the raw string for the cases the parser gets
//! wrong. [`normalize`] runs both and merges them.

use std::sync::LazyLock;

use listing_geocoder_models::{AddressComponents, CountryBias};
use regex::Regex;

use crate::{address, tables};

/// `"street, city, PR"` at the start of a cleaned raw address.
static MINIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+[A-Z]?\s+[^,]+),\s*([^,]+),\s*([A-Z]{2})\b").expect("valid regex")
});

/// A canonical variant builder.
type VariantBuilder = fn(&AddressComponents, &CountryBias) -> Option<String>;

/// Canonical builders in priority order.
const BUILDERS: &[(&str, VariantBuilder)] = &[
    ("building", building),
    ("expanded", expanded),
    ("simplified", simplified),
    ("basic", basic),
];

/// Title-cases each word, including words joined by hyphens.
#[must_use]
pub fn proper_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        word_start = c.is_whitespace() || c == '-';
    }
    out
}

fn expand_names(s: &str) -> String {
    s.split_whitespace()
        .map(|token| {
            tables::expand_name_abbreviation(token)
                .map_or_else(|| proper_case(token), str::to_string)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn type_full(components: &AddressComponents) -> Option<&'static str> {
    components
        .street_type
        .as_deref()
        .and_then(tables::street_type)
        .map(|t| t.full)
}

fn direction_full(components: &AddressComponents) -> Option<&'static str> {
    components
        .direction
        .as_deref()
        .and_then(tables::direction)
        .map(|d| d.full)
}

fn join_words<'a>(words: impl IntoIterator<Item = Option<&'a str>>) -> String {
    words
        .into_iter()
        .flatten()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// House number, street name, and full-word type and direction.
///
/// Returns `None` when there is no street name.
#[must_use]
pub fn street_line(components: &AddressComponents) -> Option<String> {
    if components.street_name.is_empty() {
        return None;
    }
    let name = proper_case(&components.street_name);
    Some(join_words([
        components.house_number.as_deref(),
        Some(name.as_str()),
        type_full(components),
        direction_full(components),
    ]))
}

fn region(province: &str, postal_code: Option<&str>) -> String {
    postal_code.map_or_else(|| province.to_string(), |p| format!("{province} {p}"))
}

fn compose(components: &AddressComponents, city: &str, bias: &CountryBias) -> Option<String> {
    let street = street_line(components)?;
    Some(format!(
        "{street}, {city}, {}, {}",
        region(
            &components.province_or(&bias.province).to_uppercase(),
            components.postal_code.as_deref()
        ),
        components.country_or(&bias.name),
    ))
}

/// `"123 Main Street East, Toronto, ON M5V 1A1, Canada"`.
fn building(components: &AddressComponents, bias: &CountryBias) -> Option<String> {
    if !components.has_building() {
        return None;
    }
    compose(components, &proper_case(&components.city), bias)
}

/// Building-level with in-name abbreviations and the province spelled out:
/// `"10 Saint Clair Avenue West, Toronto, Ontario M4V 1L5, Canada"`.
fn expanded(components: &AddressComponents, bias: &CountryBias) -> Option<String> {
    if !components.has_building() {
        return None;
    }
    let street = join_words([
        components.house_number.as_deref(),
        Some(expand_names(&components.street_name).as_str()),
        type_full(components),
        direction_full(components),
    ]);
    let code = components.province_or(&bias.province).to_uppercase();
    let province = tables::province_name(&code).unwrap_or(code.as_str());
    Some(format!(
        "{street}, {}, {}, {}",
        expand_names(&components.city),
        region(province, components.postal_code.as_deref()),
        components.country_or(&bias.name),
    ))
}

/// Building-level with the city subdivision (`"London South"`) removed.
fn simplified(components: &AddressComponents, bias: &CountryBias) -> Option<String> {
    if !components.has_building() {
        return None;
    }
    let city = address::strip_city_subdivision(&proper_case(&components.city));
    compose(components, &city, bias)
}

/// `"123 Main St E, Toronto, Canada"`.
fn basic(components: &AddressComponents, bias: &CountryBias) -> Option<String> {
    if !components.has_building() {
        return None;
    }
    let name = proper_case(&components.street_name);
    let street = join_words([
        components.house_number.as_deref(),
        Some(name.as_str()),
        components.street_type.as_deref(),
        components.direction.as_deref(),
    ]);
    let city = address::strip_city_subdivision(&proper_case(&components.city));
    Some(format!(
        "{street}, {city}, {}",
        components.country_or(&bias.name)
    ))
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if !candidate.is_empty() && !variants.contains(&candidate) {
        variants.push(candidate);
    }
}

/// Builds the canonical variants for parsed components, most specific
/// first, without duplicates.
#[must_use]
pub fn generate(components: &AddressComponents, bias: &CountryBias) -> Vec<String> {
    let mut variants = Vec::new();
    for (name, builder) in BUILDERS {
        if let Some(variant) = builder(components, bias) {
            log::trace!("Variant {name}: {variant}");
            push_unique(&mut variants, variant);
        }
    }
    variants
}

/// Derives variants directly from the raw string: area code removed,
/// city subdivision removed, postal code removed, and a minimal
/// `"street, city, PR, Country"` form.
///
/// Like the canonical variants, these need a house number, street and
/// city; anything less is left to the resolver's degraded tier. The
/// street segment is cleaned of unit noise first and unit or repeated
/// segments are dropped, so none of these carry units or duplicates.
#[must_use]
pub fn supplementary(raw: &str, bias: &CountryBias) -> Vec<String> {
    supplementary_for(raw, &address::parse(raw), bias)
}

fn supplementary_for(
    raw: &str,
    components: &AddressComponents,
    bias: &CountryBias,
) -> Vec<String> {
    if !components.has_building() {
        return Vec::new();
    }

    let (working, _) = address::strip_leading_unit(raw);
    let mut segments = address::split_segments(&working);
    let Some(first) = segments.first_mut() else {
        return Vec::new();
    };
    *first = address::clean_street_line(first);

    let mut index = 0;
    segments.retain(|segment| {
        let keep = index == 0
            || !address::is_unit_segment(segment)
            || address::strip_area_code(segment).eq_ignore_ascii_case(&components.city);
        index += 1;
        keep
    });

    let without_area_code: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| if i == 0 { s.clone() } else { address::strip_area_code(s) })
        .collect();

    let without_subdivision: Vec<String> = without_area_code
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if i == 0 {
                s.clone()
            } else {
                address::strip_city_subdivision(s)
            }
        })
        .collect();

    let without_postal: Vec<String> = without_area_code
        .iter()
        .map(|s| address::remove_postal_codes(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let area_code_line = without_area_code.join(", ");
    let minimal = MINIMAL_RE.captures(&area_code_line).and_then(|caps| {
        let code = tables::province_code(&caps[3])?;
        Some(format!(
            "{}, {}, {code}, {}",
            caps[1].trim(),
            caps[2].trim(),
            bias.name
        ))
    });

    let mut variants = Vec::new();
    push_unique(&mut variants, area_code_line);
    push_unique(&mut variants, without_subdivision.join(", "));
    push_unique(&mut variants, without_postal.join(", "));
    if let Some(minimal) = minimal {
        push_unique(&mut variants, minimal);
    }
    variants
}

/// Every variant for a raw address: canonical ones first, then the
/// raw-derived ones, in order and without duplicates.
#[must_use]
pub fn normalize(raw: &str, bias: &CountryBias) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let components = address::parse(raw);
    let mut variants = generate(&components, bias);
    for variant in supplementary_for(raw, &components, bias) {
        push_unique(&mut variants, variant);
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ca() -> CountryBias {
        CountryBias::default()
    }

    #[test]
    fn first_variant_is_building_level() {
        let variants = normalize("123 Main Street, Toronto, ON M5V 1A1", &ca());
        assert_eq!(variants[0], "123 Main Street, Toronto, ON M5V 1A1, Canada");
    }

    #[test]
    fn strips_floor_and_area_code_from_every_variant() {
        let variants = normalize(
            "1425 Gerrard Street E 2nd Flr, Toronto E01, ON M4L 1Z7",
            &ca(),
        );
        assert!(!variants.is_empty());
        for variant in &variants {
            assert!(!variant.contains("2nd Flr"), "unit leaked: {variant}");
            assert!(!variant.contains("E01"), "area code leaked: {variant}");
        }
        assert_eq!(
            variants[0],
            "1425 Gerrard Street East, Toronto, ON M4L 1Z7, Canada"
        );
    }

    #[test]
    fn expands_direction_and_drops_unit() {
        let variants = normalize("395 Dundas Street W 603, Oakville, ON L6M 5R8", &ca());
        assert_eq!(
            variants[0],
            "395 Dundas Street West, Oakville, ON L6M 5R8, Canada"
        );
        assert!(variants.iter().all(|v| !v.contains("603")));
    }

    #[test]
    fn canonical_address_is_a_fixed_point() {
        let first = normalize("123 Main Street, Toronto, ON M5V 1A1", &ca())[0].clone();
        let again = normalize(&first, &ca());
        assert_eq!(again[0], first);

        let first = normalize("395 Dundas Street W 603, Oakville, ON L6M 5R8", &ca())[0].clone();
        assert_eq!(normalize(&first, &ca())[0], first);
    }

    #[test]
    fn variants_are_ordered_and_distinct() {
        let variants = normalize(
            "3328 Oriole Drive, London South, ON N6M 0K1, London South, ON",
            &ca(),
        );
        assert_eq!(
            variants[..4],
            [
                "3328 Oriole Drive, London South, ON N6M 0K1, Canada",
                "3328 Oriole Drive, London South, Ontario N6M 0K1, Canada",
                "3328 Oriole Drive, London, ON N6M 0K1, Canada",
                "3328 Oriole Dr, London, Canada",
            ]
        );
        for (i, variant) in variants.iter().enumerate() {
            assert!(!variants[i + 1..].contains(variant), "duplicate: {variant}");
        }
        assert_eq!(
            variants.iter().filter(|v| v.matches("London South").count() > 1).count(),
            0
        );
    }

    #[test]
    fn expanded_spells_out_name_abbreviations() {
        let variants = normalize("10 St Clair Ave W, Toronto, ON M4V 1L5", &ca());
        assert_eq!(variants[0], "10 St Clair Avenue West, Toronto, ON M4V 1L5, Canada");
        assert_eq!(
            variants[1],
            "10 Saint Clair Avenue West, Toronto, Ontario M4V 1L5, Canada"
        );
    }

    #[test]
    fn skips_canonical_variants_without_house_number() {
        let components = address::parse("Queen Street, Toronto, ON");
        assert!(generate(&components, &ca()).is_empty());
    }

    #[test]
    fn supplementary_variants_come_from_raw_text() {
        let variants = supplementary("1425 Gerrard Street E 2nd Flr, Toronto E01, ON M4L 1Z7", &ca());
        assert_eq!(
            variants,
            [
                "1425 Gerrard Street E, Toronto, ON M4L 1Z7",
                "1425 Gerrard Street E, Toronto, ON",
                "1425 Gerrard Street E, Toronto, ON, Canada",
            ]
        );
    }

    #[test]
    fn drops_unit_segments_from_raw_variants() {
        let variants = normalize("123 Main St, Unit 5, Toronto, ON M5V 1A1", &ca());
        assert!(variants.contains(&"123 Main St, Toronto, ON M5V 1A1".to_string()));
        for variant in &variants {
            assert!(!variant.contains("Unit"), "unit leaked: {variant}");
        }

        let variants = supplementary("88 Queens Quay W, Suite 2301, Toronto, ON", &ca());
        assert_eq!(variants[0], "88 Queens Quay W, Toronto, ON");
    }

    #[test]
    fn raw_variants_need_a_building() {
        for raw in ["Toronto, ON", "M5V 1A1", "Mississauga", "Queen Street, Toronto, ON"] {
            assert!(normalize(raw, &ca()).is_empty(), "{raw}");
        }
    }

    #[test]
    fn missing_province_follows_the_bias() {
        let quebec = CountryBias {
            province: "QC".to_string(),
            ..CountryBias::default()
        };
        let variants = normalize("123 Rue Main, Montreal", &quebec);
        assert!(!variants.is_empty());
        assert!(variants[0].ends_with(", Montreal, QC, Canada"), "{}", variants[0]);
        assert!(variants[1].contains("Quebec"), "{}", variants[1]);
        for variant in &variants {
            assert!(!variant.contains(", ON"), "default province leaked: {variant}");
        }
    }

    #[test]
    fn empty_input_has_no_variants() {
        assert!(normalize("", &ca()).is_empty());
        assert!(normalize("  ", &ca()).is_empty());
    }

    #[test]
    fn proper_cases_words() {
        assert_eq!(proper_case("GERRARD"), "Gerrard");
        assert_eq!(proper_case("niagara-on-the-lake"), "Niagara-On-The-Lake");
        assert_eq!(proper_case("2nd line"), "2nd Line");
    }
}
