use std::collections::HashSet;
use std::str::FromStr;

use strsim::jaro_winkler;

use super::product_name::normalize;

/// String similarity on a 0-1 scale used by the fuzzy matching layer.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Which scorer the matcher uses; selected through `MATCH_SIMILARITY`.
///
/// Candidates are ranked by trigram similarity before scoring whichever kind
/// is chosen, so only the `MATCH_CANDIDATE_LIMIT` most trigram-similar names
/// reach the scorer. Postgres additionally applies the `pg_trgm` `%` cut for
/// [`SimilarityKind::Trigram`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityKind {
    #[default]
    Trigram,
    JaroWinkler,
}

impl SimilarityKind {
    pub fn scorer(self) -> Box<dyn SimilarityScorer> {
        match self {
            Self::Trigram => Box::new(TrigramSimilarity),
            Self::JaroWinkler => Box::new(JaroWinklerSimilarity),
        }
    }
}

impl FromStr for SimilarityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "trigram" | "trgm" => Ok(Self::Trigram),
            "jaro_winkler" | "jarowinkler" => Ok(Self::JaroWinkler),
            other => Err(format!("unknown similarity scorer '{other}'")),
        }
    }
}

/// Trigram similarity with the same shape as Postgres `pg_trgm`: each
/// alphanumeric word is lower-cased, padded with two leading and one trailing
/// space, cut into 3-character windows, and the two trigram sets are compared
/// as shared / union.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrigramSimilarity;

fn trigrams(input: &str) -> HashSet<[char; 3]> {
    let mut out = HashSet::new();
    let lowered = input.to_lowercase();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            out.insert([window[0], window[1], window[2]]);
        }
    }
    out
}

impl SimilarityScorer for TrigramSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let left = trigrams(a);
        let right = trigrams(b);
        if left.is_empty() || right.is_empty() {
            return 0.0;
        }
        let shared = left.intersection(&right).count();
        let union = left.len() + right.len() - shared;
        shared as f64 / union as f64
    }
}

/// Jaro-Winkler over normalized names.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerSimilarity;

impl SimilarityScorer for JaroWinklerSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (normalize(a), normalize(b));
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        jaro_winkler(&a, &b)
    }
}
