use crate::data::{CategoryIndex, CategoryVocabulary, FeatureSpec, Matrix, Table};
use crate::error::{Result, WideDeepError};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, info};

/// Maps raw categorical columns onto rows of a shared embedding table.
///
/// The trainer only consumes the vocabulary and the index matrix; any
/// indexing policy can be plugged in.
pub trait FeatureIndexer {
    /// Learn the vocabulary from both splits
    fn build_vocabulary(&mut self, train: &Table, test: &Table) -> Result<CategoryVocabulary>;

    /// Produce the `rows × category_field_size` index matrix for a table
    fn index(&self, table: &Table) -> Result<CategoryIndex>;
}

/// One embedding field per categorical feature, ids assigned in first-seen order
#[derive(Debug, Clone)]
pub struct FeatureDictionary {
    categorical: Vec<String>,
    ids: Vec<HashMap<String, i64>>,
    category_size: usize,
}

impl FeatureDictionary {
    /// Create dictionary for the categorical features of a `FeatureSpec`
    pub fn new(spec: &FeatureSpec) -> Self {
        Self {
            categorical: spec.categorical().to_vec(),
            ids: Vec::new(),
            category_size: 0,
        }
    }

    /// Vocabulary learned so far
    pub fn vocabulary(&self) -> CategoryVocabulary {
        CategoryVocabulary::new(self.category_size, self.categorical.len())
    }
}

impl FeatureIndexer for FeatureDictionary {
    fn build_vocabulary(&mut self, train: &Table, test: &Table) -> Result<CategoryVocabulary> {
        let mut next_id = 0i64;
        let mut ids = Vec::with_capacity(self.categorical.len());

        for name in &self.categorical {
            let mut field: HashMap<String, i64> = HashMap::new();
            for table in [train, test] {
                let column = table.column(name)?;
                for row in 0..column.len() {
                    field.entry(column.render(row)).or_insert_with(|| {
                        let id = next_id;
                        next_id += 1;
                        id
                    });
                }
            }
            debug!("Feature {} has {} distinct values", name, field.len());
            ids.push(field);
        }

        self.ids = ids;
        self.category_size = next_id as usize;

        let vocabulary = self.vocabulary();
        info!(
            "Feature dictionary: category_size={}, category_field_size={}",
            vocabulary.category_size, vocabulary.category_field_size
        );
        Ok(vocabulary)
    }

    fn index(&self, table: &Table) -> Result<CategoryIndex> {
        if self.ids.len() != self.categorical.len() {
            return Err(WideDeepError::config(
                "feature dictionary must be built before indexing",
            ));
        }

        let columns = self
            .categorical
            .iter()
            .zip(&self.ids)
            .map(|(name, field)| {
                let column = table.column(name)?;
                (0..column.len())
                    .map(|row| {
                        let value = column.render(row);
                        field.get(&value).copied().ok_or_else(|| {
                            WideDeepError::data(
                                name.clone(),
                                format!("value {:?} at row {} is not in the dictionary", value, row),
                            )
                        })
                    })
                    .collect::<Result<Vec<i64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Matrix::from_columns(table.num_rows(), &columns)
    }
}

/// Model-ready matrices for a set of rows
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInputs {
    /// Embedding indices, `rows × category_field_size`
    pub category_index: CategoryIndex,
    /// Continuous features, `rows × |continuous|`
    pub continuous: Matrix,
    /// Wide input, `rows × wide_feature_size`
    pub wide: Matrix,
    /// Raw deep input, `rows × deep_feature_size`
    pub deep: Matrix,
}

impl ModelInputs {
    /// Bundle prebuilt matrices.
    ///
    /// The deep matrix lays out continuous features first, so the continuous
    /// block is taken from its leading columns.
    pub fn new(
        spec: &FeatureSpec,
        wide: Matrix,
        deep: Matrix,
        category_index: CategoryIndex,
    ) -> Result<Self> {
        if wide.cols() != spec.wide_feature_size() {
            return Err(WideDeepError::shape(
                "inputs",
                "wide input columns",
                spec.wide_feature_size(),
                wide.cols(),
            ));
        }
        if deep.cols() != spec.deep_feature_size() {
            return Err(WideDeepError::shape(
                "inputs",
                "deep input columns",
                spec.deep_feature_size(),
                deep.cols(),
            ));
        }
        if deep.rows() != wide.rows() {
            return Err(WideDeepError::shape("inputs", "deep input rows", wide.rows(), deep.rows()));
        }
        if category_index.rows() != wide.rows() {
            return Err(WideDeepError::shape(
                "inputs",
                "category index rows",
                wide.rows(),
                category_index.rows(),
            ));
        }

        let continuous = deep.slice_cols(0..spec.continuous().len());
        Ok(Self {
            category_index,
            continuous,
            wide,
            deep,
        })
    }

    /// Assemble inputs from a raw table and its cross columns.
    ///
    /// Wide columns are continuous, then categorical, then crosses, all in
    /// `FeatureSpec` order. `cross` may be empty when there are no cross groups.
    pub fn from_table(
        spec: &FeatureSpec,
        table: &Table,
        cross: &Table,
        category_index: CategoryIndex,
    ) -> Result<Self> {
        let rows = table.num_rows();
        let numeric = |source: &Table, names: &[String]| -> Result<Vec<Vec<f32>>> {
            names.iter().map(|name| source.column(name)?.to_f32()).collect()
        };

        let mut deep_columns = numeric(table, spec.continuous())?;
        deep_columns.extend(numeric(table, spec.categorical())?);

        let mut wide_columns = deep_columns.clone();
        wide_columns.extend(numeric(cross, &spec.cross_names())?);

        let deep = Matrix::from_columns(rows, &deep_columns)?;
        let wide = Matrix::from_columns(rows, &wide_columns)?;
        Self::new(spec, wide, deep, category_index)
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.wide.rows()
    }

    /// Copy of a contiguous range of rows
    pub fn slice_rows(&self, range: Range<usize>) -> Self {
        Self {
            category_index: self.category_index.slice_rows(range.clone()),
            continuous: self.continuous.slice_rows(range.clone()),
            wide: self.wide.slice_rows(range.clone()),
            deep: self.deep.slice_rows(range),
        }
    }
}
