use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default name of the field holding the expected output.
pub const DEFAULT_OUTPUT_FIELD: &str = "output";

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Text sent to the model
    pub input: String,
    /// Reference answer the prediction is scored against
    pub expected_output: String,
    /// Any other columns carried by the source dataset
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_fields: Map<String, Value>,
}

impl DatasetRecord {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            extra_fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra_fields.insert(name.into(), value);
        self
    }

    /// Looks up a named field, including `input` and `expected_output`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "input" => Some(self.input.clone()),
            "expected_output" => Some(self.expected_output.clone()),
            _ => self.extra_fields.get(name).map(value_to_text),
        }
    }
}

/// Ordered records; position `i` lines up with position `i` of a parsed batch reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StandardizedDataset {
    records: Vec<DatasetRecord>,
}

impl StandardizedDataset {
    pub fn new(records: Vec<DatasetRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DatasetRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetRecord> {
        self.records.iter()
    }

    /// First `n` records, used for sampling.
    pub fn head(&self, n: usize) -> &[DatasetRecord] {
        &self.records[..n.min(self.records.len())]
    }

    /// Builds a dataset from loose JSON rows, reading the expected output from
    /// `output_field` and the prompt text from `input`.
    ///
    /// Rows without an `input` or without the output field are skipped.
    pub fn from_rows(rows: impl IntoIterator<Item = Map<String, Value>>, output_field: &str) -> Self {
        let records = rows
            .into_iter()
            .filter_map(|mut row| {
                let input = row.remove("input").map(|v| value_to_text(&v))?;
                let expected = row.remove(output_field).map(|v| value_to_text(&v))?;
                Some(DatasetRecord {
                    input,
                    expected_output: expected,
                    extra_fields: row,
                })
            })
            .collect();
        Self { records }
    }
}

impl FromIterator<DatasetRecord> for StandardizedDataset {
    fn from_iter<T: IntoIterator<Item = DatasetRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a StandardizedDataset {
    type Item = &'a DatasetRecord;
    type IntoIter = std::slice::Iter<'a, DatasetRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Source of the dataset an evaluation runs against.
pub trait DatasetAdapter: Send + Sync {
    fn standardized_dataset(&self) -> &StandardizedDataset;

    /// Name of the column holding the expected output.
    fn output_field(&self) -> &str {
        DEFAULT_OUTPUT_FIELD
    }
}

/// Dataset already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    dataset: StandardizedDataset,
    output_field: String,
}

impl InMemoryDataset {
    pub fn new(dataset: StandardizedDataset) -> Self {
        Self {
            dataset,
            output_field: DEFAULT_OUTPUT_FIELD.to_string(),
        }
    }

    pub fn with_output_field(mut self, field: impl Into<String>) -> Self {
        self.output_field = field.into();
        self
    }
}

impl DatasetAdapter for InMemoryDataset {
    fn standardized_dataset(&self) -> &StandardizedDataset {
        &self.dataset
    }

    fn output_field(&self) -> &str {
        &self.output_field
    }
}

pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
