use crate::models::Crop;

pub const STATE: &str = "State";
pub const DISTRICT: &str = "District";
pub const SUB_BASIN: &str = "Sub-basin";
pub const YEAR: &str = "Year";
pub const DATE: &str = "Date";
pub const RAINFALL: &str = "Rainfall";
pub const PRODUCTION: &str = "Production";
pub const RAINFED_AREA: &str = "Rainfed_Area";
pub const IRRIGATED_AREA: &str = "Irrigated_Area";
pub const TOTAL_AREA: &str = "Total_Area";

/// Provider rainfall columns, highest priority first.
const RAINFALL_ALIASES: [&str; 2] = ["Avg_rainfall", "Rainfall_mm"];

/// Single-letter columns used by the crop snapshots.
const CROP_CODES: [(&str, &str); 4] = [
    ("b", DISTRICT),
    ("c", RAINFED_AREA),
    ("d", IRRIGATED_AREA),
    ("e", TOTAL_AREA),
];

/// Maps provider column names onto the canonical schema by name only.
pub struct FieldClassifier {
    field_mappings: Vec<(&'static str, &'static str)>,
}

impl FieldClassifier {
    pub fn new() -> Self {
        let field_mappings = vec![
            ("state", STATE),
            ("state_name", STATE),
            ("district", DISTRICT),
            ("district_name", DISTRICT),
            ("sub_basin", SUB_BASIN),
            ("subbasin_name", SUB_BASIN),
            ("year", YEAR),
            ("date", DATE),
        ];

        FieldClassifier { field_mappings }
    }

    pub fn normalize_field_name(&self, name: &str) -> String {
        name.to_lowercase()
            .replace("_", "")
            .replace("-", "")
            .replace(" ", "")
    }

    /// Canonical name for a descriptive column, if any.
    pub fn classify_field(&self, field_name: &str) -> Option<&'static str> {
        let normalized = self.normalize_field_name(field_name);
        self.field_mappings
            .iter()
            .find(|(pattern, _)| self.normalize_field_name(pattern) == normalized)
            .map(|(_, canonical)| *canonical)
    }

    /// The column carrying rainfall amounts: `Avg_rainfall` wins over
    /// `Rainfall_mm` whenever both are present.
    pub fn rainfall_column<'a>(&self, columns: &[&'a str]) -> Option<&'a str> {
        RAINFALL_ALIASES.iter().find_map(|alias| {
            let alias = self.normalize_field_name(alias);
            columns
                .iter()
                .find(|c| self.normalize_field_name(c) == alias)
                .copied()
        })
    }

    /// Renames for a crop snapshot, in application order. The production
    /// source differs per crop: rice prefers `n`, jowar prefers `r`.
    pub fn crop_renames(&self, crop: Crop, columns: &[&str]) -> Vec<(String, &'static str)> {
        let mut renames: Vec<(String, &'static str)> = CROP_CODES
            .iter()
            .filter(|(code, _)| columns.contains(code))
            .map(|(code, canonical)| (code.to_string(), *canonical))
            .collect();

        let production_order: [&str; 2] = match crop {
            Crop::Rice => ["n", "r"],
            Crop::Jowar => ["r", "n"],
        };
        if let Some(code) = production_order.iter().find(|c| columns.contains(*c)) {
            renames.push((code.to_string(), PRODUCTION));
        }

        renames
    }
}

impl Default for FieldClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_rainfall_takes_priority() {
        let classifier = FieldClassifier::new();
        assert_eq!(
            classifier.rainfall_column(&["Rainfall_mm", "Avg_rainfall", "State"]),
            Some("Avg_rainfall")
        );
        assert_eq!(classifier.rainfall_column(&["State", "Rainfall_mm"]), Some("Rainfall_mm"));
        assert_eq!(classifier.rainfall_column(&["State", "District"]), None);
    }

    #[test]
    fn test_rice_production_prefers_n() {
        let classifier = FieldClassifier::new();
        let renames = classifier.crop_renames(Crop::Rice, &["a", "b", "n", "r"]);
        assert!(renames.contains(&("n".to_string(), PRODUCTION)));
        assert!(!renames.iter().any(|(code, _)| code == "r"));
        assert!(renames.contains(&("b".to_string(), DISTRICT)));
    }

    #[test]
    fn test_jowar_production_prefers_r() {
        let classifier = FieldClassifier::new();
        let renames = classifier.crop_renames(Crop::Jowar, &["b", "c", "d", "e", "n", "r"]);
        assert_eq!(renames.last(), Some(&("r".to_string(), PRODUCTION)));
        assert_eq!(renames.len(), 5);

        let only_n = classifier.crop_renames(Crop::Jowar, &["b", "n"]);
        assert_eq!(only_n.last(), Some(&("n".to_string(), PRODUCTION)));
    }

    #[test]
    fn test_classify_descriptive_fields() {
        let classifier = FieldClassifier::new();
        assert_eq!(classifier.classify_field("state_name"), Some(STATE));
        assert_eq!(classifier.classify_field("Sub-basin"), Some(SUB_BASIN));
        assert_eq!(classifier.classify_field("YEAR"), Some(YEAR));
        assert_eq!(classifier.classify_field("Avg_rainfall"), None);
    }
}
