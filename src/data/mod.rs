pub mod loader;
pub mod preprocessing;
pub mod feature_engineering;

use crate::error::{Result, WideDeepError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Range;

/// Values held by a single table column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Numeric column
    Numeric(Vec<f64>),
    /// Free-form text column
    Text(Vec<String>),
}

/// Named column of a column-oriented table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    /// Create a numeric column
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Create a text column
    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw values
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    /// Check if column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// String form of the value at `row`.
    ///
    /// Integral numbers render without a fractional part, so a column loaded
    /// as `3` and one loaded as `3.0` produce the same string.
    pub fn render(&self, row: usize) -> String {
        match &self.values {
            ColumnValues::Numeric(v) => render_number(v[row]),
            ColumnValues::Text(v) => v[row].clone(),
        }
    }

    /// Convert to `f32`, parsing text values if needed
    pub fn to_f32(&self) -> Result<Vec<f32>> {
        match &self.values {
            ColumnValues::Numeric(v) => Ok(v.iter().map(|&x| x as f32).collect()),
            ColumnValues::Text(v) => v
                .iter()
                .enumerate()
                .map(|(row, s)| {
                    s.trim().parse::<f32>().map_err(|_| {
                        WideDeepError::data(
                            &self.name,
                            format!("value {:?} at row {} is not numeric", s, row),
                        )
                    })
                })
                .collect(),
        }
    }
}

fn render_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Column-oriented table, one row per example
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `push_column`
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.push_column(column)?;
        Ok(self)
    }

    /// Append a column; all columns must have the same length and unique names
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(WideDeepError::data(column.name, "duplicate column name"));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(WideDeepError::shape(
                "table",
                format!("rows of column `{}`", column.name),
                self.rows,
                column.len(),
            ));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| WideDeepError::data(name, "column not found in table"))
    }

    /// All columns in insertion order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Check if table has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T = f32> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Per-row embedding indices, `rows × category_field_size`
pub type CategoryIndex = Matrix<i64>;

impl<T: Clone> Matrix<T> {
    /// Create matrix from row-major data
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(WideDeepError::shape(
                "matrix",
                format!("element count of {}x{} matrix", rows, cols),
                rows * cols,
                data.len(),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Create matrix from a list of equally sized columns
    pub fn from_columns(rows: usize, columns: &[Vec<T>]) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(WideDeepError::shape(
                    "matrix",
                    format!("length of column {}", i),
                    rows,
                    column.len(),
                ));
            }
        }

        let cols = columns.len();
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for column in columns {
                data.push(column[row].clone());
            }
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major data
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Single row
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copy of a contiguous range of rows
    pub fn slice_rows(&self, range: Range<usize>) -> Self {
        let rows = range.end - range.start;
        let data = self.data[range.start * self.cols..range.end * self.cols].to_vec();
        Self {
            rows,
            cols: self.cols,
            data,
        }
    }

    /// Copy of a contiguous range of columns
    pub fn slice_cols(&self, range: Range<usize>) -> Self {
        let cols = range.end - range.start;
        let mut data = Vec::with_capacity(self.rows * cols);
        for row in 0..self.rows {
            data.extend_from_slice(&self.row(row)[range.clone()]);
        }
        Self {
            rows: self.rows,
            cols,
            data,
        }
    }
}

/// Which table columns feed which part of the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    continuous: Vec<String>,
    categorical: Vec<String>,
    cross: Vec<Vec<String>>,
    ignored: Vec<String>,
}

impl FeatureSpec {
    /// Create feature lists with continuous and categorical features and no crosses
    pub fn new<C, K, S>(continuous: C, categorical: K) -> Result<Self>
    where
        C: IntoIterator<Item = S>,
        K: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self {
            continuous: continuous.into_iter().map(Into::into).collect(),
            categorical: categorical.into_iter().map(Into::into).collect(),
            cross: Vec::new(),
            ignored: Vec::new(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Add cross-feature groups, e.g. `[["education", "occupation"]]`
    pub fn with_cross<G, I, S>(mut self, groups: G) -> Result<Self>
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cross = groups
            .into_iter()
            .map(|group| group.into_iter().map(Into::into).collect())
            .collect();
        self.validate()?;
        Ok(self)
    }

    /// Declare columns that must never reach the model
    pub fn with_ignored<I, S>(mut self, ignored: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored = ignored.into_iter().map(Into::into).collect();
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.continuous.is_empty() && self.categorical.is_empty() {
            return Err(WideDeepError::config(
                "at least one continuous or categorical feature is required",
            ));
        }

        let mut seen = HashSet::new();
        let declared = self
            .continuous
            .iter()
            .map(|n| (n, "continuous"))
            .chain(self.categorical.iter().map(|n| (n, "categorical")))
            .chain(self.ignored.iter().map(|n| (n, "ignored")));
        for (name, list) in declared {
            if !seen.insert(name.as_str()) {
                return Err(WideDeepError::config(format!(
                    "feature `{}` is declared more than once (again as {})",
                    name, list
                )));
            }
        }

        for group in &self.cross {
            if group.len() < 2 {
                return Err(WideDeepError::config(format!(
                    "cross group {:?} needs at least two features",
                    group
                )));
            }
            for member in group {
                let known = self.continuous.contains(member) || self.categorical.contains(member);
                if !known {
                    return Err(WideDeepError::config(format!(
                        "cross member `{}` is not a declared continuous or categorical feature",
                        member
                    )));
                }
            }
        }
        Ok(())
    }

    /// Continuous feature names
    pub fn continuous(&self) -> &[String] {
        &self.continuous
    }

    /// Categorical feature names
    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    /// Cross-feature groups
    pub fn cross_groups(&self) -> &[Vec<String>] {
        &self.cross
    }

    /// Ignored feature names
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Names of the generated cross columns, `_`-joined, in group order
    pub fn cross_names(&self) -> Vec<String> {
        self.cross.iter().map(|group| group.join("_")).collect()
    }

    /// Width of the wide input: continuous + categorical + crosses
    pub fn wide_feature_size(&self) -> usize {
        self.continuous.len() + self.categorical.len() + self.cross.len()
    }

    /// Width of the raw deep input: continuous + categorical
    pub fn deep_feature_size(&self) -> usize {
        self.continuous.len() + self.categorical.len()
    }
}

/// Embedding vocabulary reported by a feature indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    /// Rows of the shared embedding table
    pub category_size: usize,
    /// Categorical slots per example
    pub category_field_size: usize,
}

impl CategoryVocabulary {
    /// Create vocabulary description
    pub fn new(category_size: usize, category_field_size: usize) -> Self {
        Self {
            category_size,
            category_field_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_spec_sizes() {
        let spec = FeatureSpec::new(["age", "hours"], ["sex", "race", "job"])
            .unwrap()
            .with_cross([["sex", "race"], ["race", "job"]])
            .unwrap();

        assert_eq!(spec.wide_feature_size(), 7);
        assert_eq!(spec.deep_feature_size(), 5);
        assert_eq!(spec.cross_names(), vec!["sex_race", "race_job"]);
    }

    #[test]
    fn test_feature_spec_rejects_duplicates() {
        let err = FeatureSpec::new(["age"], ["age"]).unwrap_err();
        assert!(err.is_configuration());

        let err = FeatureSpec::new(["age"], ["sex"])
            .unwrap()
            .with_ignored(["sex"])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_feature_spec_rejects_short_cross_group() {
        let err = FeatureSpec::new(["age"], ["sex"])
            .unwrap()
            .with_cross([["sex"]])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_table_columns() {
        let table = Table::new()
            .with_column(Column::numeric("age", vec![30.0, 41.5]))
            .unwrap()
            .with_column(Column::text("sex", vec!["M".into(), "F".into()]))
            .unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names(), vec!["age", "sex"]);
        assert_eq!(table.column("age").unwrap().render(0), "30");
        assert_eq!(table.column("age").unwrap().render(1), "41.5");
        assert!(table.column("missing").is_err());
        assert!(table.column("sex").unwrap().to_f32().is_err());
    }

    #[test]
    fn test_table_rejects_ragged_column() {
        let table = Table::new()
            .with_column(Column::numeric("a", vec![1.0, 2.0]))
            .unwrap();
        let err = table
            .with_column(Column::numeric("b", vec![1.0]))
            .unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_matrix_slicing() {
        let m = Matrix::from_columns(3, &[vec![1.0f32, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let rows = m.slice_rows(1..3);
        assert_eq!(rows.rows(), 2);
        assert_eq!(rows.row(0), &[2.0, 5.0]);

        let cols = m.slice_cols(1..2);
        assert_eq!(cols.cols(), 1);
        assert_eq!(cols.data(), &[4.0, 5.0, 6.0]);

        assert!(Matrix::new(2, 2, vec![1.0f32; 3]).is_err());
    }
}
