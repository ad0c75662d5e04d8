//! Dataset resolution and tabular loading.
//!
//! The resolver maps identifiers (catalog names or filesystem paths) to CSV
//! sources and loads them into in-memory [`DataTable`]s. It never touches the
//! execution context; binding injection is the caller's job.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use datapilot_tools::result::{ColumnSummary, DatasetSummaryResult, NumericColumnSummary};

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset '{identifier}' not found; available: [{}]", available.join(", "))]
    NotFound {
        identifier: String,
        available: Vec<String>,
    },

    #[error("failed to load dataset '{}': {message}", path.display())]
    Load { path: PathBuf, message: String },
}

/// Column value after type inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str(""),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Text => "text",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

/// A loaded tabular dataset: header, typed cells, source path.
#[derive(Debug, Clone)]
pub struct DataTable {
    pub name: String,
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    types: Vec<ColumnType>,
}

impl DataTable {
    /// Load a CSV file, inferring one type per column over all values.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let load_err = |message: String| DatasetError::Load {
            path: path.to_path_buf(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| load_err(e.to_string()))?;

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| load_err(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(load_err("no header row".to_string()));
        }

        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| load_err(e.to_string()))?;
            let mut row: Vec<Option<String>> = record
                .iter()
                .map(|field| {
                    let trimmed = field.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect();
            row.resize(columns.len(), None);
            raw_rows.push(row);
        }

        let types: Vec<ColumnType> = (0..columns.len())
            .map(|idx| infer_column_type(raw_rows.iter().filter_map(|row| row[idx].as_deref())))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(value, ty)| coerce(value, *ty))
                    .collect()
            })
            .collect();

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());

        debug!(target: "datasets", dataset = %name, "loaded {} columns", columns.len());

        Ok(Self {
            name,
            path: path.to_path_buf(),
            columns,
            rows,
            types,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_type(&self, idx: usize) -> Option<ColumnType> {
        self.types.get(idx).copied()
    }

    pub fn missing_count(&self, idx: usize) -> u64 {
        self.rows
            .iter()
            .filter(|row| matches!(row.get(idx), Some(CellValue::Null)))
            .count() as u64
    }

    fn numeric_values(&self, idx: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| match row.get(idx) {
                Some(CellValue::Int(v)) => Some(*v as f64),
                Some(CellValue::Float(v)) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Shape, column types, missing counts, numeric stats and a preview,
    /// packaged as the describe_dataset tool result.
    pub fn summarize(&self) -> DatasetSummaryResult {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnSummary {
                name: name.clone(),
                dtype: self.types[idx].as_str().to_string(),
                missing: self.missing_count(idx),
            })
            .collect();

        let numeric = self
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.types[*idx].is_numeric())
            .filter_map(|(idx, name)| {
                let values = self.numeric_values(idx);
                describe(&values).map(|stats| NumericColumnSummary {
                    column: name.clone(),
                    count: values.len() as u64,
                    mean: stats.mean,
                    std_dev: stats.std_dev,
                    min: stats.min,
                    max: stats.max,
                })
            })
            .collect();

        let preview_rows = self
            .rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();

        DatasetSummaryResult {
            name: self.name.clone(),
            path: self.path.display().to_string(),
            rows: self.rows.len() as u64,
            columns,
            numeric,
            preview_header: self.columns.clone(),
            preview_rows,
        }
    }

    /// Column-oriented JSON used to materialize the table inside the
    /// execution context.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "columns": self.columns,
            "rows": self.rows,
        })
    }
}

struct Describe {
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

fn describe(values: &[f64]) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(Describe {
        mean,
        std_dev: variance.sqrt(),
        min,
        max,
    })
}

fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen_any = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;

    for value in values {
        seen_any = true;
        if all_int && value.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && value.parse::<f64>().is_err() {
            all_float = false;
        }
        if all_bool && !matches!(value.to_ascii_lowercase().as_str(), "true" | "false") {
            all_bool = false;
        }
        if !all_int && !all_float && !all_bool {
            return ColumnType::Text;
        }
    }

    if !seen_any {
        return ColumnType::Text;
    }
    if all_bool {
        ColumnType::Bool
    } else if all_int {
        ColumnType::Int
    } else if all_float {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

fn coerce(value: Option<String>, ty: ColumnType) -> CellValue {
    let Some(value) = value else {
        return CellValue::Null;
    };
    match ty {
        ColumnType::Int => value.parse().map_or(CellValue::Null, CellValue::Int),
        ColumnType::Float => value.parse().map_or(CellValue::Null, CellValue::Float),
        ColumnType::Bool => match value.to_ascii_lowercase().as_str() {
            "true" => CellValue::Bool(true),
            "false" => CellValue::Bool(false),
            _ => CellValue::Null,
        },
        ColumnType::Text => CellValue::Text(value),
    }
}

/// One dataset bound into a session: variable names plus the loaded table.
#[derive(Debug, Clone)]
pub struct DatasetBinding {
    /// Sanitized short name (the dataset's stem).
    pub name: String,
    /// Namespace variable holding the table (`df` or `df_<name>`).
    pub var_name: String,
    /// Companion variable holding the source path.
    pub path_var_name: String,
    pub table: DataTable,
}

/// Catalog-aware resolver over a datasets directory.
#[derive(Debug, Clone)]
pub struct DatasetResolver {
    datasets_dir: PathBuf,
}

impl DatasetResolver {
    pub fn new(datasets_dir: impl Into<PathBuf>) -> Self {
        Self {
            datasets_dir: datasets_dir.into(),
        }
    }

    /// Resolve one identifier to a concrete file path.
    ///
    /// Order: catalog name (stem of a CSV in the datasets directory), direct
    /// path, then path relative to the datasets directory.
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf, DatasetError> {
        let catalog_path = self.datasets_dir.join(format!("{identifier}.csv"));
        if catalog_path.is_file() {
            return Ok(catalog_path);
        }

        let direct = PathBuf::from(identifier);
        if direct.is_file() {
            return Ok(direct);
        }

        let relative = self.datasets_dir.join(identifier);
        if relative.is_file() {
            return Ok(relative);
        }

        Err(DatasetError::NotFound {
            identifier: identifier.to_string(),
            available: self.list_available(),
        })
    }

    /// Names of catalog datasets (CSV stems under the datasets directory).
    pub fn list_available(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.datasets_dir)
            .map(|entries| {
                entries
                    .filter_map(std::result::Result::ok)
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
                    .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Resolve and load every identifier, then derive deterministic binding
    /// names. A single dataset binds as `df`/`dataset_path`; several bind as
    /// suffixed variants.
    pub fn load_bindings(&self, identifiers: &[String]) -> Result<Vec<DatasetBinding>, DatasetError> {
        let mut tables = Vec::new();
        for identifier in identifiers {
            let path = self.resolve(identifier)?;
            tables.push(DataTable::load(&path)?);
        }
        Ok(derive_bindings(tables))
    }
}

/// Deterministic binding-name derivation, shared by every entry point.
pub fn derive_bindings(tables: Vec<DataTable>) -> Vec<DatasetBinding> {
    let single = tables.len() == 1;
    let mut taken = HashSet::new();
    tables
        .into_iter()
        .map(|table| {
            let name = unique_name(sanitize_identifier(&table.name), &mut taken);
            let (var_name, path_var_name) = if single {
                ("df".to_string(), "dataset_path".to_string())
            } else {
                (format!("df_{name}"), format!("dataset_path_{name}"))
            };
            DatasetBinding {
                name,
                var_name,
                path_var_name,
                table,
            }
        })
        .collect()
}

/// Lower-case a dataset stem into a valid Python identifier.
pub fn sanitize_identifier(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut last_was_sep = false;
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("dataset");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "d_");
    }
    out
}

fn unique_name(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const SALES: &str = "region,units,price,refunded\nnorth,3,9.5,false\nsouth,5,10.0,true\n,2,,false\n";

    #[test]
    fn loads_and_infers_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "sales.csv", SALES);
        let table = DataTable::load(&path).unwrap();

        assert_eq!(table.columns, vec!["region", "units", "price", "refunded"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_type(0), Some(ColumnType::Text));
        assert_eq!(table.column_type(1), Some(ColumnType::Int));
        assert_eq!(table.column_type(2), Some(ColumnType::Float));
        assert_eq!(table.column_type(3), Some(ColumnType::Bool));
        assert_eq!(table.missing_count(0), 1);
        assert_eq!(table.missing_count(2), 1);
    }

    #[test]
    fn summarize_reports_numeric_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "sales.csv", SALES);
        let summary = DataTable::load(&path).unwrap().summarize();

        assert_eq!(summary.rows, 3);
        assert_eq!(summary.columns.len(), 4);
        let units = summary
            .numeric
            .iter()
            .find(|s| s.column == "units")
            .unwrap();
        assert_eq!(units.count, 3);
        assert!((units.mean - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(units.min, 2.0);
        assert_eq!(units.max, 5.0);
        assert_eq!(summary.preview_rows.len(), 3);
    }

    #[test]
    fn resolves_by_catalog_name_path_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "sales.csv", SALES);
        let resolver = DatasetResolver::new(dir.path());

        assert_eq!(resolver.resolve("sales").unwrap(), dir.path().join("sales.csv"));
        assert_eq!(
            resolver.resolve(path.to_str().unwrap()).unwrap(),
            path
        );
        assert_eq!(resolver.resolve("sales.csv").unwrap(), dir.path().join("sales.csv"));
    }

    #[test]
    fn unknown_identifier_lists_catalog() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "sales.csv", SALES);
        let resolver = DatasetResolver::new(dir.path());

        let err = resolver.resolve("nope").unwrap_err();
        match err {
            DatasetError::NotFound { available, .. } => {
                assert_eq!(available, vec!["sales".to_string()]);
            }
            DatasetError::Load { .. } => panic!("wrong error kind"),
        }
    }

    #[test]
    fn single_dataset_binds_as_df() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "sales.csv", SALES);
        let resolver = DatasetResolver::new(dir.path());

        let bindings = resolver.load_bindings(&["sales".to_string()]).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].var_name, "df");
        assert_eq!(bindings[0].path_var_name, "dataset_path");
    }

    #[test]
    fn multiple_datasets_bind_with_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "train.csv", SALES);
        write_csv(dir.path(), "test.csv", SALES);
        let resolver = DatasetResolver::new(dir.path());

        let bindings = resolver
            .load_bindings(&["train".to_string(), "test".to_string()])
            .unwrap();
        let vars: Vec<&str> = bindings.iter().map(|b| b.var_name.as_str()).collect();
        assert_eq!(vars, vec!["df_train", "df_test"]);
        let paths: Vec<&str> = bindings.iter().map(|b| b.path_var_name.as_str()).collect();
        assert_eq!(paths, vec!["dataset_path_train", "dataset_path_test"]);
    }

    #[test]
    fn sanitization_is_deterministic() {
        assert_eq!(sanitize_identifier("Office Train"), "office_train");
        assert_eq!(sanitize_identifier("XAU-15m.data"), "xau_15m_data");
        assert_eq!(sanitize_identifier("2024sales"), "d_2024sales");
        assert_eq!(sanitize_identifier("___"), "dataset");
    }

    #[test]
    fn colliding_stems_get_numeric_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        write_csv(&a, "data.csv", SALES);
        write_csv(&b, "data.csv", SALES);

        let tables = vec![
            DataTable::load(&a.join("data.csv")).unwrap(),
            DataTable::load(&b.join("data.csv")).unwrap(),
        ];
        let bindings = derive_bindings(tables);
        assert_eq!(bindings[0].var_name, "df_data");
        assert_eq!(bindings[1].var_name, "df_data_2");
    }

    #[test]
    fn unreadable_file_is_a_load_error() {
        let err = DataTable::load(Path::new("/definitely/missing.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::Load { .. }));
    }
}
