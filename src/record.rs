use crate::config::Number;

/// One point as fetched, with its attribute already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub vector: Vec<Number>,
    pub scalar_attribute: f64,
}

/// Records from a single bounded fetch, all sharing one dimensionality.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Record>,
    dimensions: usize,
}

impl Dataset {
    /// Callers are expected to have checked dimensionality already; see
    /// `store::fetch_dataset`.
    pub(crate) fn new(records: Vec<Record>) -> Self {
        let dimensions = records.first().map_or(0, |r| r.vector.len());
        Self { records, dimensions }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn vectors(&self) -> Vec<&[Number]> {
        self.records.iter().map(|r| r.vector.as_slice()).collect()
    }

    pub fn attributes(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.scalar_attribute).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
    pub scalar_attribute: f64,
}

impl ProjectedPoint {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
