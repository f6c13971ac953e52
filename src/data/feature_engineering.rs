//! Cross-feature construction for the wide branch

use crate::data::{Column, FeatureSpec, Table};
use crate::error::{Result, WideDeepError};
use tracing::{debug, info};

/// Separator placed between member values of a cross
pub const CROSS_VALUE_SEPARATOR: &str = "-";

/// Separator placed between member names in a cross column name
pub const CROSS_NAME_SEPARATOR: &str = "_";

/// How a cross column ended up encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossEncoding {
    /// Every joined value parsed as an integer; codes are those integers
    Integer,
    /// Joined strings were label-encoded
    Label,
}

/// Maps string classes to their index in sorted order
#[derive(Debug, Clone, Default)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Create unfitted encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the sorted set of distinct classes, replacing any previous fit
    pub fn fit(&mut self, values: &[String]) -> &mut Self {
        let mut classes = values.to_vec();
        classes.sort();
        classes.dedup();
        self.classes = classes;
        self
    }

    /// Encode values seen during `fit`
    pub fn transform(&self, values: &[String]) -> Result<Vec<i64>> {
        values
            .iter()
            .map(|v| {
                self.classes
                    .binary_search(v)
                    .map(|idx| idx as i64)
                    .map_err(|_| WideDeepError::data(v.clone(), "label was not seen during fit"))
            })
            .collect()
    }

    /// Fit then transform
    pub fn fit_transform(&mut self, values: &[String]) -> Result<Vec<i64>> {
        self.fit(values).transform(values)
    }

    /// Classes learned by the last fit
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Encode one joined cross column.
///
/// Values that all parse as integers are used as codes directly. Anything else
/// is label-encoded with `encoder`, which is refit on this column.
pub fn encode_cross_column(
    encoder: &mut LabelEncoder,
    values: &[String],
) -> Result<(Vec<i64>, CrossEncoding)> {
    let parsed: std::result::Result<Vec<i64>, _> =
        values.iter().map(|v| v.trim().parse::<i64>()).collect();

    match parsed {
        Ok(codes) => Ok((codes, CrossEncoding::Integer)),
        Err(_) => Ok((encoder.fit_transform(values)?, CrossEncoding::Label)),
    }
}

/// Builds crossed categorical columns from feature groups
#[derive(Debug, Clone)]
pub struct CrossBuilder {
    groups: Vec<Vec<String>>,
}

impl CrossBuilder {
    /// Create builder for explicit groups
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Create builder for the cross groups of a feature spec
    pub fn from_spec(spec: &FeatureSpec) -> Self {
        Self::new(spec.cross_groups().to_vec())
    }

    /// Check if any cross is configured
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Output column names, in group order
    pub fn names(&self) -> Vec<String> {
        self.groups
            .iter()
            .map(|group| group.join(CROSS_NAME_SEPARATOR))
            .collect()
    }

    /// Build one encoded column per group.
    ///
    /// Returns an empty table when no groups are configured. A single encoder
    /// is refit per column, so codes from two `build` calls on different
    /// tables are not comparable.
    pub fn build(&self, table: &Table) -> Result<Table> {
        let mut crossed = Table::new();
        if self.groups.is_empty() {
            return Ok(crossed);
        }

        info!("Building {} cross features", self.groups.len());
        let mut encoder = LabelEncoder::new();

        for (name, group) in self.names().into_iter().zip(&self.groups) {
            let members = group
                .iter()
                .map(|member| table.column(member))
                .collect::<Result<Vec<_>>>()?;

            let joined: Vec<String> = (0..table.num_rows())
                .map(|row| {
                    members
                        .iter()
                        .map(|column| column.render(row))
                        .collect::<Vec<_>>()
                        .join(CROSS_VALUE_SEPARATOR)
                })
                .collect();

            let (codes, encoding) = encode_cross_column(&mut encoder, &joined)?;
            debug!("Cross feature {} encoded as {:?}", name, encoding);

            crossed.push_column(Column::numeric(
                name,
                codes.into_iter().map(|c| c as f64).collect(),
            ))?;
        }

        Ok(crossed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnValues;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn census_table() -> Table {
        Table::new()
            .with_column(Column::text("education", strings(&["HS", "BSc", "HS", "MSc"])))
            .unwrap()
            .with_column(Column::text("occupation", strings(&["Sales", "Tech", "Sales", "Tech"])))
            .unwrap()
            .with_column(Column::numeric("country", vec![1.0, 2.0, 1.0, 1.0]))
            .unwrap()
    }

    #[test]
    fn test_cross_columns_named_in_order() {
        let builder = CrossBuilder::new(vec![
            strings(&["education", "occupation"]),
            strings(&["country", "occupation"]),
            strings(&["country", "education", "occupation"]),
        ]);

        let crossed = builder.build(&census_table()).unwrap();

        assert_eq!(crossed.num_columns(), 3);
        assert_eq!(
            crossed.column_names(),
            vec!["education_occupation", "country_occupation", "country_education_occupation"]
        );
        assert_eq!(crossed.num_rows(), 4);
    }

    #[test]
    fn test_identical_pairs_encode_identically() {
        let builder = CrossBuilder::new(vec![strings(&["education", "occupation"])]);
        let crossed = builder.build(&census_table()).unwrap();

        match crossed.column("education_occupation").unwrap().values() {
            ColumnValues::Numeric(codes) => {
                // "HS-Sales" occurs in rows 0 and 2
                assert_eq!(codes[0], codes[2]);
                assert_ne!(codes[0], codes[1]);
                assert_ne!(codes[1], codes[3]);
                // sorted classes: BSc-Tech, HS-Sales, MSc-Tech
                assert_eq!(codes, &vec![1.0, 0.0, 1.0, 2.0]);
            }
            other => panic!("expected numeric codes, got {:?}", other),
        }
    }

    #[test]
    fn test_no_groups_yields_empty_table() {
        let builder = CrossBuilder::new(Vec::new());
        let crossed = builder.build(&census_table()).unwrap();
        assert!(crossed.is_empty());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_missing_member_column() {
        let builder = CrossBuilder::new(vec![strings(&["education", "salary"])]);
        let err = builder.build(&census_table()).unwrap_err();
        assert!(err.to_string().contains("salary"));
    }

    #[test]
    fn test_integer_path_is_identity() {
        let mut encoder = LabelEncoder::new();
        let values = strings(&["0", "3", "1", "3", "7"]);

        let (codes, encoding) = encode_cross_column(&mut encoder, &values).unwrap();

        assert_eq!(encoding, CrossEncoding::Integer);
        assert_eq!(codes, vec![0, 3, 1, 3, 7]);
    }

    #[test]
    fn test_fallback_to_label_encoding() {
        let mut encoder = LabelEncoder::new();
        let values = strings(&["b-x", "a-y", "b-x"]);

        let (codes, encoding) = encode_cross_column(&mut encoder, &values).unwrap();

        assert_eq!(encoding, CrossEncoding::Label);
        assert_eq!(codes, vec![1, 0, 1]);
        assert_eq!(encoder.classes(), &["a-y".to_string(), "b-x".to_string()]);
    }

    #[test]
    fn test_label_encoder_rejects_unseen() {
        let mut encoder = LabelEncoder::new();
        encoder.fit(&strings(&["a", "b"]));
        assert_eq!(encoder.transform(&strings(&["b", "a"])).unwrap(), vec![1, 0]);
        assert!(encoder.transform(&strings(&["c"])).is_err());
    }
}
