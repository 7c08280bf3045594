use anyhow::Result;
use polars::prelude::*;
use std::cmp::Ordering;

use super::field_classifier::{DISTRICT, RAINFALL, STATE, SUB_BASIN, YEAR};
use crate::models::RainfallRecord;

/// A normalized rainfall table: optional `State`, the region column
/// (`District` or `Sub-basin`), optional `Year`, and `Rainfall`.
#[derive(Debug, Clone)]
pub struct RainfallFrame {
    df: DataFrame,
    region_column: Option<&'static str>,
}

impl RainfallFrame {
    pub fn new(df: DataFrame, region_column: Option<&'static str>) -> Self {
        Self { df, region_column }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn region_column(&self) -> Option<&'static str> {
        self.region_column
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Mean over non-null rainfall values.
    pub fn mean(&self) -> Option<f64> {
        self.df.column(RAINFALL).ok()?.f64().ok()?.mean()
    }

    /// Mean rainfall per region, largest first. Ties keep alphabetical order,
    /// null regions and all-null groups are left out.
    pub fn grouped_means(&self) -> Result<Vec<(String, f64)>> {
        let Some(region) = self.region_column else {
            return Ok(Vec::new());
        };

        let grouped = self
            .df
            .clone()
            .lazy()
            .group_by([col(region)])
            .agg([col(RAINFALL).mean()])
            .collect()?;

        let regions = grouped.column(region)?.str()?;
        let means = grouped.column(RAINFALL)?.f64()?;

        let mut out: Vec<(String, f64)> = regions
            .into_iter()
            .zip(means.into_iter())
            .filter_map(|(r, m)| Some((r?.to_string(), m?)))
            .collect();

        out.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(out)
    }

    /// Typed rows. Rows with no year take `default_year`; rows with no
    /// region get an empty name.
    pub fn records(&self, default_year: i32) -> Result<Vec<RainfallRecord>> {
        let height = self.df.height();
        let states = self.optional_str(STATE)?;
        let regions = match self.region_column {
            Some(region) => self.optional_str(region)?,
            None => None,
        };
        let years = match self.df.column(YEAR) {
            Ok(column) => Some(column.i32()?),
            Err(_) => None,
        };
        let rainfall = self.df.column(RAINFALL)?.f64()?;

        let records = (0..height)
            .map(|idx| RainfallRecord {
                state: states.and_then(|s| s.get(idx)).map(str::to_string),
                district_or_subbasin: regions
                    .and_then(|r| r.get(idx))
                    .unwrap_or_default()
                    .to_string(),
                year: years.and_then(|y| y.get(idx)).unwrap_or(default_year),
                rainfall_mm: rainfall.get(idx),
            })
            .collect();
        Ok(records)
    }

    fn optional_str(&self, name: &str) -> Result<Option<&StringChunked>> {
        match self.df.column(name) {
            Ok(column) => Ok(Some(column.str()?)),
            Err(_) => Ok(None),
        }
    }
}

/// Mean of the present values, `None` when there are none.
pub fn mean_of<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Region key for a frame that has `District` or `Sub-basin`.
pub fn region_key(df: &DataFrame) -> Option<&'static str> {
    if df.column(DISTRICT).is_ok() {
        Some(DISTRICT)
    } else if df.column(SUB_BASIN).is_ok() {
        Some(SUB_BASIN)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rainfall_frame(regions: Vec<Option<&str>>, values: Vec<Option<f64>>) -> RainfallFrame {
        let df = DataFrame::new(vec![
            Series::new(DISTRICT.into(), regions).into(),
            Series::new(RAINFALL.into(), values).into(),
        ])
        .unwrap();
        let region = region_key(&df);
        RainfallFrame::new(df, region)
    }

    #[test]
    fn test_grouped_means_descending() {
        let frame = rainfall_frame(
            vec![Some("A"), Some("B"), Some("A"), Some("C"), Some("B")],
            vec![Some(10.0), Some(50.0), Some(30.0), Some(5.0), None],
        );
        let grouped = frame.grouped_means().unwrap();
        assert_eq!(
            grouped,
            vec![
                ("B".to_string(), 50.0),
                ("A".to_string(), 20.0),
                ("C".to_string(), 5.0),
            ]
        );
    }

    #[test]
    fn test_grouped_means_skip_null_keys_and_empty_groups() {
        let frame = rainfall_frame(
            vec![Some("A"), None, Some("Z")],
            vec![Some(10.0), Some(99.0), None],
        );
        assert_eq!(frame.grouped_means().unwrap(), vec![("A".to_string(), 10.0)]);
    }

    #[test]
    fn test_grouped_means_ties_alphabetical() {
        let frame = rainfall_frame(
            vec![Some("Beta"), Some("Alpha")],
            vec![Some(7.0), Some(7.0)],
        );
        let grouped = frame.grouped_means().unwrap();
        assert_eq!(grouped[0].0, "Alpha");
        assert_eq!(grouped[1].0, "Beta");
    }

    #[test]
    fn test_mean_skips_nulls() {
        let frame = rainfall_frame(vec![Some("A"), Some("B")], vec![Some(4.0), None]);
        assert_eq!(frame.mean(), Some(4.0));

        let empty = rainfall_frame(vec![Some("A")], vec![None]);
        assert_eq!(empty.mean(), None);
    }

    #[test]
    fn test_records_default_year() {
        let frame = rainfall_frame(vec![Some("Pune")], vec![Some(3.0)]);
        let records = frame.records(2018).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].year, 2018);
        assert_eq!(records[0].district_or_subbasin, "Pune");
        assert_eq!(records[0].state, None);
        assert_eq!(records[0].rainfall_mm, Some(3.0));
    }

    #[test]
    fn test_mean_of() {
        assert_eq!(mean_of(vec![Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(mean_of(Vec::<Option<f64>>::new()), None);
    }
}
