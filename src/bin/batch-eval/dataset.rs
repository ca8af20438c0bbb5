use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use batch_eval::dataset::StandardizedDataset;
use serde_json::Value;

/// Reads one JSON object per line; blank lines are ignored.
pub fn load_jsonl(path: &Path, output_field: &str) -> anyhow::Result<StandardizedDataset> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), line_no + 1))?;
        match value {
            Value::Object(row) => rows.push(row),
            other => bail!(
                "{}:{}: expected a JSON object, got {other}",
                path.display(),
                line_no + 1
            ),
        }
    }
    let row_count = rows.len();
    let dataset = StandardizedDataset::from_rows(rows, output_field);
    if dataset.len() < row_count {
        log::warn!(
            "dropped {} of {row_count} rows missing 'input' or '{output_field}'",
            row_count - dataset.len()
        );
    }
    log::info!("loaded {} records from {}", dataset.len(), path.display());
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_records_and_skips_incomplete_rows() {
        let file = file_with(
            "{\"input\": \"2+2\", \"answer\": \"4\"}\n\n{\"input\": \"no answer\"}\n{\"input\": \"3+3\", \"answer\": 6}\n",
        );
        let dataset = load_jsonl(file.path(), "answer").unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().expected_output, "6");
    }

    #[test]
    fn non_object_line_is_an_error() {
        let file = file_with("[1, 2]\n");
        let err = load_jsonl(file.path(), "output").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }
}
