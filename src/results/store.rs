use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use super::layout::RunLayout;
use super::{ResultError, ResultRecord};

/// Writes per-case JSON files and appends rows to the run CSV.
pub struct ResultStore {
    layout: RunLayout,
    header_written: bool,
}

impl ResultStore {
    /// Create the run directory. An existing non-empty CSV means a resumed
    /// run, so its header is not written again.
    pub fn open(layout: RunLayout) -> Result<Self, ResultError> {
        fs::create_dir_all(&layout.run_dir).map_err(|source| ResultError::CreateDir {
            path: layout.run_dir.display().to_string(),
            source,
        })?;

        let header_written = fs::metadata(&layout.csv_path)
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);

        tracing::debug!(
            run_dir = %layout.run_dir.display(),
            resumed = header_written,
            "Result store opened"
        );

        Ok(Self {
            layout,
            header_written,
        })
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn run_dir(&self) -> &Path {
        &self.layout.run_dir
    }

    pub fn csv_path(&self) -> &Path {
        &self.layout.csv_path
    }

    /// Write `{case_id}.json` with a 4-space indent. Overwrites a previous file.
    pub fn write_case_json(
        &self,
        case_id: &str,
        document: &Map<String, Value>,
    ) -> Result<PathBuf, ResultError> {
        let path = self.layout.case_json_path(case_id);
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        document.serialize(&mut ser)?;
        fs::write(&path, buf)?;
        Ok(path)
    }

    /// Append one row, writing the header first if the file was empty.
    pub fn append(&mut self, record: &ResultRecord) -> Result<(), ResultError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.layout.csv_path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!self.header_written)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        self.header_written = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Persona, PromptOptions};

    fn layout(root: &Path) -> RunLayout {
        RunLayout::new(
            root,
            "gpt-4o",
            "v1.0",
            &PromptOptions {
                persona: Persona::Single,
                with_thoughts: true,
                with_lab_results: false,
            },
            1,
        )
    }

    fn record(case: &str, tokens: u64) -> ResultRecord {
        ResultRecord {
            case: case.to_string(),
            t1: "Aortic dissection".to_string(),
            t2: "Myocardial infarction, inferior".to_string(),
            t3: "Pulmonary embolism".to_string(),
            tokens,
        }
    }

    #[test]
    fn open_creates_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(layout(dir.path())).unwrap();
        assert!(store.run_dir().is_dir());
        assert!(store
            .run_dir()
            .ends_with("result_gpt_4o/ER_3DDX_v1.0_WithThoughts/rep1"));
    }

    #[test]
    fn header_written_once_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::open(layout(dir.path())).unwrap();
        store.append(&record("1", 120)).unwrap();
        store.append(&record("2", 95)).unwrap();

        let content = fs::read_to_string(store.csv_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Case,t1,t2,t3,Tokens",
                "1,Aortic dissection,\"Myocardial infarction, inferior\",Pulmonary embolism,120",
                "2,Aortic dissection,\"Myocardial infarction, inferior\",Pulmonary embolism,95",
            ]
        );
    }

    #[test]
    fn reopened_store_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ResultStore::open(layout(dir.path())).unwrap();
            store.append(&record("1", 10)).unwrap();
        }
        let mut store = ResultStore::open(layout(dir.path())).unwrap();
        store.append(&record("2", 20)).unwrap();

        let content = fs::read_to_string(store.csv_path()).unwrap();
        assert_eq!(content.matches("Case,t1,t2,t3,Tokens").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn empty_existing_csv_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        fs::create_dir_all(&layout.run_dir).unwrap();
        fs::write(&layout.csv_path, "").unwrap();

        let mut store = ResultStore::open(layout).unwrap();
        store.append(&record("1", 10)).unwrap();

        let content = fs::read_to_string(store.csv_path()).unwrap();
        assert!(content.starts_with("Case,t1,t2,t3,Tokens\n"));
    }

    #[test]
    fn case_json_uses_four_space_indent_and_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(layout(dir.path())).unwrap();
        let mut document = Map::new();
        document.insert("thoughts".into(), Value::from("reasoning"));
        document.insert("top1".into(), Value::from("A"));

        let path = store.write_case_json("case/7", &document).unwrap();

        assert_eq!(path.file_name().unwrap(), "case_7.json");
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\n    \"thoughts\": \"reasoning\",\n    \"top1\": \"A\"\n}");
    }
}
