//! Sensor field normalization.
//!
//! Incoming records use whatever field names each room's logger emits
//! ("Temp", "CO₂ (ppm)", "Relative Humidity"...). Every key is mapped onto a
//! fixed canonical schema: an abbreviation table is consulted first, then a
//! string-similarity fallback; keys that match nothing survive unchanged.

use lazy_static::lazy_static;
use serde_json::{Map, Value};
use std::collections::HashMap;
use strsim::jaro_winkler;

/// The fixed canonical field set sensor data is normalized toward.
pub const CANONICAL_FIELDS: [&str; 4] = ["co2", "temperature", "humidity", "timestamp"];

/// Minimum similarity score for accepting a fuzzy match.
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

lazy_static! {
    /// Known synonyms, keyed by their cleaned (lower-cased, unit-stripped) form.
    static ref ABBREVIATIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("co2", "co2");
        m.insert("co₂", "co2");
        m.insert("co2 level", "co2");
        m.insert("temperature", "temperature");
        m.insert("temp", "temperature");
        m.insert("t", "temperature");
        m.insert("humidity", "humidity");
        m.insert("relative humidity", "humidity");
        m.insert("rh", "humidity");
        m.insert("humidity (%)", "humidity");
        m.insert("timestamp", "timestamp");
        m.insert("log_time", "timestamp");
        m.insert("time", "timestamp");
        m
    };
}

/// Pluggable string-similarity backend for the fuzzy fallback.
pub trait Similarity: Send + Sync {
    /// Score between 0.0 and 1.0, higher meaning more similar.
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Default backend: Jaro-Winkler distance.
pub struct JaroWinklerSimilarity;

impl Similarity for JaroWinklerSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        jaro_winkler(a, b)
    }
}

/// Maps raw sensor field names onto the canonical schema.
///
/// Built once at startup and shared read-only; `normalize` is a pure
/// function over a single record.
pub struct FieldNormalizer {
    similarity: Box<dyn Similarity>,
    threshold: f64,
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        Self {
            similarity: Box::new(JaroWinklerSimilarity),
            threshold: SIMILARITY_THRESHOLD,
        }
    }
}

impl FieldNormalizer {
    pub fn new(similarity: Box<dyn Similarity>, threshold: f64) -> Self {
        Self {
            similarity,
            threshold,
        }
    }

    /// Lower-case, trim, and strip unit suffixes from a raw key.
    fn clean_key(key: &str) -> String {
        key.trim()
            .to_lowercase()
            .replace("°c", "")
            .replace("(ppm)", "")
            .replace('%', "")
            .trim()
            .to_string()
    }

    /// Resolve one raw key to a canonical field name, or None if nothing
    /// matches above the threshold.
    fn resolve(&self, raw_key: &str) -> Option<&'static str> {
        let cleaned = Self::clean_key(raw_key);

        if let Some(canonical) = ABBREVIATIONS.get(cleaned.as_str()) {
            return Some(*canonical);
        }
        if let Some(canonical) = CANONICAL_FIELDS.iter().copied().find(|f| *f == cleaned) {
            return Some(canonical);
        }

        let mut best: Option<(&'static str, f64)> = None;
        for field in CANONICAL_FIELDS {
            let score = self.similarity.score(&cleaned, field);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((field, score));
            }
        }
        match best {
            Some((field, score)) if score >= self.threshold => Some(field),
            _ => None,
        }
    }

    /// Normalize all keys of one record. Values pass through untouched;
    /// unresolvable keys keep their original spelling.
    pub fn normalize(&self, entry: &Map<String, Value>) -> Map<String, Value> {
        let mut normalized = Map::new();
        for (raw_key, value) in entry {
            let key = match self.resolve(raw_key) {
                Some(canonical) => canonical.to_string(),
                None => raw_key.clone(),
            };
            normalized.insert(key, value.clone());
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_abbreviations_win() {
        let n = FieldNormalizer::default();
        let e = entry(&[
            ("Temp", Value::from(21.5)),
            ("T", Value::from(21.5)),
            ("RH", Value::from(40.0)),
            ("log_time", Value::from("2025-07-10T10:00:00")),
        ]);
        let out = n.normalize(&e);
        assert!(out.contains_key("temperature"));
        assert!(out.contains_key("humidity"));
        assert!(out.contains_key("timestamp"));
    }

    #[test]
    fn test_unit_suffixes_stripped() {
        let n = FieldNormalizer::default();
        let e = entry(&[
            ("CO2 (ppm)", Value::from(415)),
            ("Humidity (%)", Value::from(38.2)),
            ("Temperature °C", Value::from(22.0)),
        ]);
        let out = n.normalize(&e);
        assert_eq!(out.get("co2"), Some(&Value::from(415)));
        assert_eq!(out.get("humidity"), Some(&Value::from(38.2)));
        assert_eq!(out.get("temperature"), Some(&Value::from(22.0)));
    }

    #[test]
    fn test_fuzzy_fallback() {
        let n = FieldNormalizer::default();
        // "humid" is close enough to "humidity" for Jaro-Winkler
        let e = entry(&[("humid", Value::from(40.0))]);
        let out = n.normalize(&e);
        assert!(out.contains_key("humidity"));
    }

    #[test]
    fn test_below_threshold_keeps_raw_key() {
        let n = FieldNormalizer::default();
        let e = entry(&[("xq7_flag", Value::from(true))]);
        let out = n.normalize(&e);
        assert_eq!(out.get("xq7_flag"), Some(&Value::from(true)));
    }

    #[test]
    fn test_values_untouched() {
        let n = FieldNormalizer::default();
        let e = entry(&[("co2", Value::from(400))]);
        let out = n.normalize(&e);
        assert_eq!(out.get("co2"), Some(&Value::from(400)));
    }
}
