use regex::Regex;
use std::sync::OnceLock;

/// Packaging words that carry no identity for matching purposes.
const STOP_WORDS: [&str; 10] = [
    "soft", "drink", "bottle", "pack", "packet", "box", "can", "tin", "jar", "pouch",
];

const LITRE_UNITS: &str = r"litres?|liters?|ltrs?|lt|l";
const MILLILITRE_UNITS: &str = r"millilitres?|milliliters?|milli|ml";
const KILOGRAM_UNITS: &str = r"kilograms?|kilos?|kgs?";
const GRAM_UNITS: &str = r"grams?|gms?|g";

fn quantity_regex(units: &str) -> Regex {
    // Leftmost match wins, so the first quantity in the name is the one reported.
    Regex::new(&format!(r"(\d+(?:\.\d+)?)\s*(?:{units})\b")).expect("static quantity pattern")
}

fn litre_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| quantity_regex(LITRE_UNITS))
}

fn millilitre_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| quantity_regex(MILLILITRE_UNITS))
}

fn kilogram_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| quantity_regex(KILOGRAM_UNITS))
}

fn gram_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| quantity_regex(GRAM_UNITS))
}

fn any_quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        quantity_regex(&format!(
            "{MILLILITRE_UNITS}|{LITRE_UNITS}|{KILOGRAM_UNITS}|{GRAM_UNITS}"
        ))
    })
}

/// Canonical unit for a unit token, or `None` if the token is not a unit spelling.
fn canonical_unit(token: &str) -> Option<&'static str> {
    let unit = match token {
        "litre" | "litres" | "liter" | "liters" | "ltr" | "ltrs" | "lt" | "l" => "l",
        "millilitre" | "millilitres" | "milliliter" | "milliliters" | "milli" | "ml" => "ml",
        "kilogram" | "kilograms" | "kilo" | "kilos" | "kgs" | "kg" => "kg",
        "gram" | "grams" | "gm" | "gms" | "g" => "g",
        _ => return None,
    };
    Some(unit)
}

/// Rewrites `1litre` / `litre` style tokens onto their canonical unit spelling.
fn canonicalize_token(token: &str) -> String {
    let split = token
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(token.len());
    let (digits, word) = token.split_at(split);
    match canonical_unit(word) {
        Some(unit) => format!("{digits}{unit}"),
        None => token.to_string(),
    }
}

/// Canonical comparison form of a free-form product name.
///
/// Lower-cases, replaces everything outside `[a-z0-9 ]` with a space, drops
/// packaging stop words, rewrites unit spellings (`litre` -> `l`, `gram` -> `g`)
/// and collapses whitespace. Pure and deterministic.
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !STOP_WORDS.contains(token))
        .map(canonicalize_token)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized name with its quantity expressions removed, so "Milk 1L" and
/// "Milk 990 ml" share a key while their extracted sizes still differ.
pub fn name_key(name: &str) -> String {
    let lowered = name.to_lowercase();
    let without_sizes = any_quantity_re().replace_all(&lowered, " ");
    normalize(&without_sizes)
}

/// Brand comparison key: the normalized name without any whitespace, so
/// "Coca Cola", "Coca-Cola" and "CocaCola" collapse together.
pub fn compact_key(name: &str) -> String {
    normalize(name).split_whitespace().collect()
}

/// URL-safe slug: lower-case ASCII alphanumerics with `-` between runs.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

fn first_quantity(re: &Regex, haystack: &str) -> Option<f64> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn scale(value: f64, factor: f64) -> f64 {
    // Keeps 1.5 * 1000 style conversions free of binary noise.
    (value * factor * 1000.0).round() / 1000.0
}

/// Volume in millilitres from the first `<number><unit>` in the name.
/// Litre quantities take precedence over millilitre ones.
pub fn extract_volume_ml(name: &str) -> Option<f64> {
    let lowered = name.to_lowercase();
    first_quantity(litre_re(), &lowered)
        .map(|litres| scale(litres, 1000.0))
        .or_else(|| first_quantity(millilitre_re(), &lowered).map(|ml| scale(ml, 1.0)))
}

/// Weight in grams from the first `<number><unit>` in the name.
/// Kilogram quantities take precedence over gram ones.
pub fn extract_weight_g(name: &str) -> Option<f64> {
    let lowered = name.to_lowercase();
    first_quantity(kilogram_re(), &lowered)
        .map(|kg| scale(kg, 1000.0))
        .or_else(|| first_quantity(gram_re(), &lowered).map(|g| scale(g, 1.0)))
}

/// Every name-derived column of a product, computed together so the write
/// paths cannot update one without the others.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedName {
    pub normalized_name: String,
    pub name_key: String,
    pub volume_ml: Option<f64>,
    pub weight_g: Option<f64>,
}

impl DerivedName {
    pub fn of(name: &str) -> Self {
        Self {
            normalized_name: normalize(name),
            name_key: name_key(name),
            volume_ml: extract_volume_ml(name),
            weight_g: extract_weight_g(name),
        }
    }
}
