//! Data toolkit
//!
//! Loads CSV files into an in-memory SQLite database, runs SQL against them
//! and charts query results with YouPlot (`uplot`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::tools::{optional_str, required_str, ToolDefinition, Toolkit};

const CHART_TYPES: &[&str] = &[
    "barplot", "bar", "histogram", "hist", "lineplot", "line", "lineplots", "lines", "scatter",
    "s", "density", "d", "boxplot", "box", "count", "c", "colors",
];

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// SQLite type chosen for a CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Varchar,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Varchar => "VARCHAR",
        }
    }

    /// Narrowest type every non-empty value fits
    fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = Self::BigInt;
        let mut seen = false;
        for v in values.map(str::trim).filter(|v| !v.is_empty()) {
            seen = true;
            if kind == Self::BigInt && v.parse::<i64>().is_err() {
                kind = Self::Double;
            }
            if kind == Self::Double && v.parse::<f64>().is_err() {
                return Self::Varchar;
            }
        }
        if seen {
            kind
        } else {
            Self::Varchar
        }
    }

    fn bind(self, raw: &str) -> rusqlite::types::Value {
        use rusqlite::types::Value as Sql;
        let v = raw.trim();
        if v.is_empty() {
            return Sql::Null;
        }
        match self {
            Self::BigInt => v.parse().map(Sql::Integer).unwrap_or(Sql::Null),
            Self::Double => v.parse().map(Sql::Real).unwrap_or(Sql::Null),
            Self::Varchar => Sql::Text(raw.to_string()),
        }
    }
}

/// Split CSV text into records, honoring quoted fields with embedded
/// delimiters, doubled quotes and newlines
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    records
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render a cell the way the query table shows it
fn display_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "None".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.1}", f),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Split extra `uplot` arguments on whitespace, keeping quoted groups together
fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                has_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if has_token {
                    out.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(current);
    }
    out
}

struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl QueryResult {
    fn to_table(&self) -> String {
        let width = |s: &str| s.chars().count();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| width(c)).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(width(cell));
            }
        }

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<w$}", c, w = *w))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        let header = line(&self.columns);
        let separator = "-".repeat(width(&header));
        let body: Vec<String> = self.rows.iter().map(|r| line(r)).collect();
        format!("{}\n{}\n{}", header, separator, body.join("\n"))
    }

    fn to_csv(&self) -> String {
        std::iter::once(&self.columns)
            .chain(&self.rows)
            .map(|r| r.iter().map(|c| csv_escape(c)).collect::<Vec<_>>().join(",") + "\n")
            .collect()
    }
}

struct DataState {
    conn: Connection,
    /// table name -> (source path, schema text)
    tables: HashMap<String, (PathBuf, String)>,
}

pub struct DataToolkit {
    state: Mutex<DataState>,
    uplot: String,
}

impl DataToolkit {
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            state: Mutex::new(DataState {
                conn,
                tables: HashMap::new(),
            }),
            uplot: "uplot".to_string(),
        })
    }

    /// Use a different YouPlot executable
    pub fn with_uplot(mut self, program: &str) -> Self {
        self.uplot = program.to_string();
        self
    }

    pub fn load(&self, path: &str, table_name: &str, file_type: Option<&str>) -> String {
        match self.try_load(path, table_name, file_type) {
            Ok(schema) => {
                let msg = format!(
                    "Successfully loaded {} as table '{}'\nSchema:\n{}",
                    path, table_name, schema
                );
                info!("{}", msg);
                msg
            }
            Err(e) => format!("Error loading file: {}", e),
        }
    }

    fn try_load(&self, path: &str, table_name: &str, file_type: Option<&str>) -> Result<String> {
        let file_type = file_type
            .map(str::to_string)
            .unwrap_or_else(|| {
                Path::new(path)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .to_lowercase();
        match file_type.as_str() {
            "csv" => {}
            "parquet" => anyhow::bail!("Parquet files are not supported; convert the file to CSV first"),
            other => anyhow::bail!("Unsupported file type: {}. Must be 'csv'", other),
        }
        if !is_identifier(table_name) {
            anyhow::bail!("Invalid table name: {}", table_name);
        }

        let text = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path))?;
        let mut records = parse_csv(&text).into_iter();
        let header = records.next().context("CSV file is empty")?;
        let rows: Vec<Vec<String>> = records.collect();

        let types: Vec<ColumnType> = (0..header.len())
            .map(|i| ColumnType::infer(rows.iter().map(|r| r.get(i).map(String::as_str).unwrap_or(""))))
            .collect();

        let columns_sql: Vec<String> = header
            .iter()
            .zip(&types)
            .map(|(name, t)| format!("{} {}", quote_ident(name.trim()), t.sql_name()))
            .collect();
        let placeholders = vec!["?"; header.len()].join(", ");

        let mut state = self.state.lock();
        let tx = state.conn.transaction()?;
        tx.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(table_name), columns_sql.join(", ")),
            [],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} VALUES ({})",
                quote_ident(table_name),
                placeholders
            ))?;
            for row in &rows {
                let values = types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| t.bind(row.get(i).map(String::as_str).unwrap_or("")));
                insert.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;

        let schema = header
            .iter()
            .zip(&types)
            .map(|(name, t)| format!("{}: {}", name.trim(), t.sql_name()))
            .collect::<Vec<_>>()
            .join("\n");
        state
            .tables
            .insert(table_name.to_string(), (PathBuf::from(path), schema.clone()));
        debug!("Loaded {} rows into {}", rows.len(), table_name);
        Ok(schema)
    }

    fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let state = self.state.lock();
        let mut stmt = state.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let count = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let cells = (0..count)
                .map(|i| row.get_ref(i).map(display_value))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(cells);
        }
        Ok(QueryResult { columns, rows })
    }

    pub fn query(&self, sql: &str) -> String {
        match self.run_query(sql) {
            Ok(result) if result.rows.is_empty() => "Query returned no results".to_string(),
            Ok(result) => result.to_table(),
            Err(e) => format!("Error executing query: {}", e),
        }
    }

    pub async fn visualize(&self, sql: &str, chart_type: &str, args: &str) -> String {
        if !CHART_TYPES.contains(&chart_type) {
            return format!("Error creating visualization: Unsupported chart type: {}", chart_type);
        }
        let result = match self.run_query(sql) {
            Ok(result) => result,
            Err(e) => return format!("Error creating visualization: {}", e),
        };

        let tmp = std::env::temp_dir().join(format!(
            "goose_data_{}_{}.csv",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = tokio::fs::write(&tmp, result.to_csv()).await {
            return format!("Error creating visualization: {}", e);
        }

        let output = tokio::process::Command::new(&self.uplot)
            .arg(chart_type)
            .args(["-d", ",", "-H"])
            .args(split_args(args))
            .arg(&tmp)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&tmp).await;

        match output {
            Ok(out) if out.status.success() => {
                let text = format!(
                    "{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                );
                info!("\n{}", text);
                text
            }
            Ok(out) => format!(
                "Error running visualization: {}",
                String::from_utf8_lossy(&out.stderr)
            ),
            Err(e) => format!("Error creating visualization: {}", e),
        }
    }

    /// Loaded tables with their source files
    pub fn tables(&self) -> Vec<(String, PathBuf)> {
        let mut tables: Vec<_> = self
            .state
            .lock()
            .tables
            .iter()
            .map(|(name, (path, _))| (name.clone(), path.clone()))
            .collect();
        tables.sort();
        tables
    }
}

#[async_trait]
impl Toolkit for DataToolkit {
    fn name(&self) -> &'static str {
        "data"
    }

    fn system(&self) -> Option<String> {
        Some(
            "Work with data using SQLite. You can:\n\
             1. Load data from CSV files\n\
             2. Run SQL queries against the loaded data\n\
             3. Create visualizations of the query results\n\n\
             The visualizations are powered by YouPlot; if you get errors that it is not installed,\n\
             let the user know to install it from https://github.com/red-data-tools/YouPlot"
                .to_string(),
        )
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "load",
                "Load a dataset from a CSV file into a table.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path to the data file."},
                        "table_name": {"type": "string", "description": "Name to give the table."},
                        "file_type": {"type": "string", "description": "File type ('csv'). Inferred from the extension when omitted."}
                    },
                    "required": ["path", "table_name"]
                }),
            ),
            ToolDefinition::new(
                "query",
                "Execute a SQL query against the loaded datasets.",
                json!({
                    "type": "object",
                    "properties": {"sql": {"type": "string", "description": "SQL query to execute."}},
                    "required": ["sql"]
                }),
            ),
            ToolDefinition::new(
                "visualize",
                "Create a terminal chart of a query result using YouPlot (uplot).",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {"type": "string", "description": "SQL query producing the data to chart."},
                        "chart_type": {"type": "string", "description": "barplot, histogram, lineplot, lineplots, scatter, density, boxplot, count or colors."},
                        "args": {"type": "string", "description": "Additional arguments passed to uplot."}
                    },
                    "required": ["sql", "chart_type"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: &Value) -> Result<String> {
        let out = match tool {
            "load" => self.load(
                required_str(args, "path")?,
                required_str(args, "table_name")?,
                optional_str(args, "file_type"),
            ),
            "query" => self.query(required_str(args, "sql")?),
            "visualize" => {
                self.visualize(
                    required_str(args, "sql")?,
                    required_str(args, "chart_type")?,
                    optional_str(args, "args").unwrap_or(""),
                )
                .await
            }
            other => anyhow::bail!("Unknown tool: {}", other),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CSV: &str = "name,age,score\nada,36,9.5\n\"lovelace, countess\",,7\nbob,41,8\n";

    fn loaded() -> (TempDir, DataToolkit) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("people.csv");
        std::fs::write(&path, CSV).unwrap();
        let data = DataToolkit::new().unwrap();
        let msg = data.load(path.to_str().unwrap(), "people", None);
        assert!(msg.starts_with("Successfully loaded"), "{}", msg);
        (temp, data)
    }

    #[test]
    fn test_parse_csv_quotes() {
        let records = parse_csv("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",z");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["x, y", "say \"hi\""]);
        assert_eq!(records[2], vec!["multi\nline", "z"]);
    }

    #[test]
    fn test_type_inference() {
        assert_eq!(ColumnType::infer(["1", "2", ""].into_iter()), ColumnType::BigInt);
        assert_eq!(ColumnType::infer(["1", "2.5"].into_iter()), ColumnType::Double);
        assert_eq!(ColumnType::infer(["1", "x"].into_iter()), ColumnType::Varchar);
        assert_eq!(ColumnType::infer(["", ""].into_iter()), ColumnType::Varchar);
    }

    #[test]
    fn test_load_reports_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("people.csv");
        std::fs::write(&path, CSV).unwrap();
        let data = DataToolkit::new().unwrap();
        let msg = data.load(path.to_str().unwrap(), "people", None);
        assert_eq!(
            msg,
            format!(
                "Successfully loaded {} as table 'people'\nSchema:\nname: VARCHAR\nage: BIGINT\nscore: DOUBLE",
                path.display()
            )
        );
        assert_eq!(data.tables().len(), 1);
    }

    #[test]
    fn test_query_table_format() {
        let (_temp, data) = loaded();
        let out = data.query("SELECT name, age FROM people WHERE age > 40");
        assert_eq!(out, "name | age\n----------\nbob  | 41 ");

        let nulls = data.query("SELECT age, score FROM people WHERE name LIKE 'love%'");
        assert_eq!(nulls, "age  | score\n------------\nNone | 7.0  ");
    }

    #[test]
    fn test_query_errors_and_empty() {
        let (_temp, data) = loaded();
        assert_eq!(data.query("SELECT * FROM people WHERE age > 100"), "Query returned no results");
        assert!(data.query("SELECT * FROM missing").starts_with("Error executing query:"));
    }

    #[test]
    fn test_rejected_file_types() {
        let data = DataToolkit::new().unwrap();
        assert!(data.load("x.parquet", "t", None).starts_with("Error loading file: Parquet"));
        assert_eq!(
            data.load("x.json", "t", None),
            "Error loading file: Unsupported file type: json. Must be 'csv'"
        );
        assert!(data.load("x.csv", "bad name", None).contains("Invalid table name"));
    }

    #[test]
    fn test_duplicate_table_is_an_error() {
        let (temp, data) = loaded();
        let path = temp.path().join("people.csv");
        assert!(data.load(path.to_str().unwrap(), "people", None).starts_with("Error loading file:"));
    }

    #[test]
    fn test_split_args() {
        assert_eq!(split_args("-t 'My Chart' --xlim 0,10"), vec!["-t", "My Chart", "--xlim", "0,10"]);
        assert!(split_args("   ").is_empty());
    }

    #[tokio::test]
    async fn test_visualize_missing_binary() {
        let (_temp, data) = loaded();
        let data = data.with_uplot("definitely-not-uplot-binary");
        let out = data.visualize("SELECT name, age FROM people", "barplot", "").await;
        assert!(out.starts_with("Error creating visualization:"), "{}", out);
        assert!(data
            .visualize("SELECT 1", "pie", "")
            .await
            .contains("Unsupported chart type"));
    }
}
