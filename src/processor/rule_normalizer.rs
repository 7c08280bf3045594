use anyhow::{Result, bail};
use polars::prelude::*;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use super::aggregator::{RainfallFrame, region_key};
use super::field_classifier::*;
use crate::models::{Crop, CropRecord};

/// Raised when a rainfall table has neither `Avg_rainfall` nor `Rainfall_mm`.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingFields {
    pub found: Vec<String>,
}

impl fmt::Display for MissingFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dataset missing rainfall fields (columns: {})",
            self.found.join(", ")
        )
    }
}

impl std::error::Error for MissingFields {}

pub struct RuleNormalizer {
    classifier: FieldClassifier,
    year_regex: Regex,
}

impl RuleNormalizer {
    pub fn new() -> Result<Self> {
        Ok(RuleNormalizer {
            classifier: FieldClassifier::new(),
            year_regex: Regex::new(r"\b(1[89]\d{2}|2\d{3})\b")?,
        })
    }

    /// Projects a raw rainfall table onto `State`, region, `Year` and
    /// `Rainfall` columns. Text columns are title-cased, numbers coerced with
    /// anything non-numeric becoming null.
    pub fn normalize_rainfall(&self, raw: &DataFrame) -> Result<RainfallFrame> {
        let names: Vec<String> = raw
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let Some(rainfall_source) = self.classifier.rainfall_column(&name_refs) else {
            return Err(MissingFields { found: names }.into());
        };

        let mut columns: Vec<Column> = Vec::new();
        let mut year_source = None;
        let mut date_source = None;

        for name in &name_refs {
            match self.classifier.classify_field(name) {
                Some(STATE) if !has_column(&columns, STATE) => {
                    columns.push(self.title_case_column(raw, name, STATE)?);
                }
                Some(canonical @ (DISTRICT | SUB_BASIN)) if !has_column(&columns, canonical) => {
                    columns.push(self.title_case_column(raw, name, canonical)?);
                }
                Some(YEAR) if year_source.is_none() => year_source = Some(*name),
                Some(DATE) if date_source.is_none() => date_source = Some(*name),
                _ => {}
            }
        }

        let years: Option<Vec<Option<i32>>> = if let Some(source) = year_source {
            Some(
                raw.column(source)?
                    .str()?
                    .into_iter()
                    .map(|v| coerce_f64(v).map(|y| y as i32))
                    .collect(),
            )
        } else if let Some(source) = date_source {
            Some(
                raw.column(source)?
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(|d| self.year_from_date(d)))
                    .collect(),
            )
        } else {
            None
        };
        if let Some(years) = years {
            columns.push(Series::new(YEAR.into(), years).into());
        }

        let rainfall: Vec<Option<f64>> = raw
            .column(rainfall_source)?
            .str()?
            .into_iter()
            .map(coerce_f64)
            .collect();
        let nulls = rainfall.iter().filter(|v| v.is_none()).count();
        if nulls > 0 {
            debug!("{} of {} {} values were not numeric", nulls, rainfall.len(), rainfall_source);
        }
        columns.push(Series::new(RAINFALL.into(), rainfall).into());

        let df = DataFrame::new(columns)?;
        // District wins over sub-basin when a table carries both.
        let region_column = region_key(&df);
        Ok(RainfallFrame::new(df, region_column))
    }

    /// Crop snapshot rows with the single-letter codes resolved. Rows without
    /// a district are dropped.
    pub fn normalize_crop(&self, raw: &DataFrame, crop: Crop) -> Result<Vec<CropRecord>> {
        let mut df = raw.clone();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

        for (code, canonical) in self.classifier.crop_renames(crop, &name_refs) {
            df.rename(&code, canonical.into())?;
        }

        if df.column(DISTRICT).is_err() {
            bail!(
                "{} snapshot has no district column (expected 'b'), columns: {:?}",
                crop,
                names
            );
        }

        let state_source = name_refs
            .iter()
            .find(|n| self.classifier.classify_field(n) == Some(STATE))
            .map(|n| n.to_string());

        let districts = df.column(DISTRICT)?.str()?;
        let states = match &state_source {
            Some(name) => Some(df.column(name)?.str()?),
            None => None,
        };
        let production = numeric_values(&df, PRODUCTION)?;
        let rainfed = numeric_values(&df, RAINFED_AREA)?;
        let irrigated = numeric_values(&df, IRRIGATED_AREA)?;
        let total = numeric_values(&df, TOTAL_AREA)?;

        let mut records = Vec::with_capacity(df.height());
        let mut dropped = 0;

        for idx in 0..df.height() {
            let Some(district) = districts
                .get(idx)
                .map(str::trim)
                .filter(|d| !d.is_empty())
            else {
                dropped += 1;
                continue;
            };

            records.push(CropRecord {
                district: title_case(district),
                crop,
                state: states
                    .and_then(|s| s.get(idx))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(title_case),
                production_tonnes: production[idx],
                rainfed_area: rainfed[idx],
                irrigated_area: irrigated[idx],
                total_area: total[idx],
            });
        }

        if dropped > 0 {
            info!("Dropped {} {} rows without a district", dropped, crop);
        }
        info!("Normalized {} {} records", records.len(), crop);

        Ok(records)
    }

    fn title_case_column(&self, raw: &DataFrame, source: &str, target: &str) -> Result<Column> {
        let values: Vec<Option<String>> = raw
            .column(source)?
            .str()?
            .into_iter()
            .map(|v| v.map(|s| title_case(s.trim())))
            .collect();
        Ok(Series::new(target.into(), values).into())
    }

    fn year_from_date(&self, date: &str) -> Option<i32> {
        self.year_regex
            .captures(date)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

fn has_column(columns: &[Column], name: &str) -> bool {
    columns.iter().any(|c| c.name().as_str() == name)
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    match df.column(name) {
        Ok(column) => Ok(column.str()?.into_iter().map(coerce_f64).collect()),
        Err(_) => Ok(vec![None; df.height()]),
    }
}

/// Non-numeric and non-finite values become `None`.
pub fn coerce_f64(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| f64::from_str(v).ok())
        .filter(|v| v.is_finite())
}

/// Upper-cases the first letter of every word and lower-cases the rest. A
/// word starts after any non-alphabetic character.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_is_letter = false;

    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }

    out
}
