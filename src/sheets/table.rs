use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// A named worksheet with a fixed header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub headers: &'static [&'static str],
}

impl TableSpec {
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheets api error: {0}")]
    Api(String),
    #[error("sheets auth error: {0}")]
    Auth(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("no such table: {0}")]
    MissingTable(String),
}

/// Row-granularity tabular storage. The Google Sheets client implements this
/// for production; `MemoryBackend` backs the tests. Row indices are absolute
/// sheet rows: the header is row 1, data starts at row 2.
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError>;
    /// All data rows in order, header stripped.
    async fn read_rows(&self, spec: &TableSpec) -> Result<Vec<Vec<String>>, StoreError>;
    async fn append_row(&self, spec: &TableSpec, row: Vec<String>) -> Result<(), StoreError>;
    async fn update_row(
        &self,
        spec: &TableSpec,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError>;
}

/// A row model knows its worksheet and converts itself to/from a string row.
/// Field access by name lives here and nowhere else.
pub trait RowModel: Sized + Send + Sync {
    fn spec() -> &'static TableSpec;
    fn from_row(row: &[String]) -> Self;
    fn to_row(&self) -> Vec<String>;
}

/// A loaded row together with its absolute sheet row, needed for updates.
#[derive(Debug, Clone)]
pub struct Keyed<R> {
    pub row_index: usize,
    pub value: R,
}

/// Typed facade over a `TableBackend`.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn TableBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self { backend }
    }

    pub async fn ensure_all(&self, specs: &[&TableSpec]) -> Result<(), StoreError> {
        for spec in specs {
            self.backend.ensure_table(spec).await?;
        }
        Ok(())
    }

    pub async fn scan<R: RowModel>(&self) -> Result<Vec<Keyed<R>>, StoreError> {
        let rows = self.backend.read_rows(R::spec()).await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| Keyed {
                row_index: i + 2,
                value: R::from_row(row),
            })
            .collect())
    }

    pub async fn insert<R: RowModel>(&self, value: &R) -> Result<(), StoreError> {
        let row = normalize(R::spec(), value.to_row());
        self.backend.append_row(R::spec(), row).await
    }

    pub async fn update<R: RowModel>(&self, row_index: usize, value: &R) -> Result<(), StoreError> {
        let row = normalize(R::spec(), value.to_row());
        self.backend.update_row(R::spec(), row_index, row).await
    }

    pub async fn find_by<R, F>(&self, pred: F) -> Result<Option<Keyed<R>>, StoreError>
    where
        R: RowModel,
        F: Fn(&R) -> bool,
    {
        Ok(self.scan::<R>().await?.into_iter().find(|k| pred(&k.value)))
    }
}

/// Pad or truncate a row to the declared header width.
fn normalize(spec: &TableSpec, mut row: Vec<String>) -> Vec<String> {
    row.resize(spec.width(), String::new());
    row
}

/// In-memory backend with the same row-index semantics as the sheet.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<&'static str, Vec<Vec<String>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        self.tables.lock().unwrap().entry(spec.name).or_default();
        Ok(())
    }

    async fn read_rows(&self, spec: &TableSpec) -> Result<Vec<Vec<String>>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(spec.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_row(&self, spec: &TableSpec, row: Vec<String>) -> Result<(), StoreError> {
        self.tables
            .lock()
            .unwrap()
            .entry(spec.name)
            .or_default()
            .push(row);
        Ok(())
    }

    async fn update_row(
        &self,
        spec: &TableSpec,
        row_index: usize,
        row: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(spec.name)
            .ok_or_else(|| StoreError::MissingTable(spec.name.to_string()))?;
        let data_idx = row_index
            .checked_sub(2)
            .ok_or_else(|| StoreError::Api(format!("row index {} below data range", row_index)))?;
        if data_idx >= rows.len() {
            return Err(StoreError::Api(format!(
                "row index {} out of range for {}",
                row_index, spec.name
            )));
        }
        rows[data_idx] = row;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: TableSpec = TableSpec {
        name: "TestTable",
        headers: &["a", "b", "c"],
    };

    struct TestRow {
        a: String,
        b: String,
    }

    impl RowModel for TestRow {
        fn spec() -> &'static TableSpec {
            &SPEC
        }
        fn from_row(row: &[String]) -> Self {
            Self {
                a: crate::models::cell(row, 0).to_string(),
                b: crate::models::cell(row, 1).to_string(),
            }
        }
        fn to_row(&self) -> Vec<String> {
            vec![self.a.clone(), self.b.clone()]
        }
    }

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn insert_pads_to_header_width() {
        let s = store();
        s.insert(&TestRow {
            a: "1".into(),
            b: "2".into(),
        })
        .await
        .unwrap();
        let rows = s.scan::<TestRow>().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_index, 2);
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let s = store();
        s.insert(&TestRow {
            a: "1".into(),
            b: "x".into(),
        })
        .await
        .unwrap();
        s.update(
            2,
            &TestRow {
                a: "1".into(),
                b: "y".into(),
            },
        )
        .await
        .unwrap();
        let rows = s.scan::<TestRow>().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value.b, "y");
    }

    #[tokio::test]
    async fn update_out_of_range_errors() {
        let s = store();
        let err = s
            .update(
                5,
                &TestRow {
                    a: "1".into(),
                    b: "2".into(),
                },
            )
            .await;
        assert!(err.is_err());
    }
}
