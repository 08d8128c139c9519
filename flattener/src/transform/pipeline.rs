//! Batch pipeline: specification + XML directory → one CSV per table.
//!
//! A run has two passes over the input files. The pre-pass only runs when
//! some table has dynamic attribute columns; it discovers the attribute
//! names so the main pass can write a fixed header. The main pass parses
//! each document, flattens it for every table and appends the rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use xmlflat::transform::pipeline::{run_file, RunOptions};
//!
//! let summary = run_file("spec.yaml", &RunOptions::from_env())?;
//! println!("{} documents", summary.stats.documents);
//! ```

use chrono::{DateTime, Local, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::context::DocumentContext;
use super::dynamic::expand_dynamic_columns;
use super::layer::LayerContainer;
use super::merge::merge_layers;
use crate::config::{self, OutputTable, Specification};
use crate::document::Document;
use crate::error::{ConfigResult, ResolveResult, RunError, RunResult};
use crate::models::{Column, Row};
use crate::output::CsvSink;
use crate::parser::parse_bytes;
use crate::report::{
    log_error, log_info, log_info_indent, log_success, log_success_indent, log_warning,
    BatchStats, StatsSnapshot,
};
use crate::timeutil::{self, format_batch_time};
use crate::xpath::DEFAULT_MAX_EVAL_NODES;

// =============================================================================
// Options
// =============================================================================

/// Options for a batch run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Resolve columns, containers and dynamic columns on the rayon pool
    pub parallel: bool,

    /// XML directory, relative to the specification's input path
    pub xml_dir: PathBuf,

    /// Where unparsable documents are copied, relative to the specification
    /// file's directory
    pub dump_dir: PathBuf,

    /// Log progress every this many documents (0 disables)
    pub report_every: usize,

    /// Node-visit budget for one evaluation
    pub max_eval_nodes: usize,

    /// Fixed batch time; the current time when unset
    pub batch_time: Option<NaiveDateTime>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            xml_dir: PathBuf::from("."),
            dump_dir: PathBuf::from("broken-xml"),
            report_every: 1000,
            max_eval_nodes: DEFAULT_MAX_EVAL_NODES,
            batch_time: None,
        }
    }
}

impl RunOptions {
    /// Defaults overridden by `XMLFLAT_*` environment variables.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file. Values that
    /// do not parse are ignored with a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(v) = env_flag("XMLFLAT_PARALLEL") {
            options.parallel = v;
        }
        if let Ok(v) = std::env::var("XMLFLAT_XML_DIR") {
            options.xml_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("XMLFLAT_DUMP_DIR") {
            options.dump_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse("XMLFLAT_REPORT_EVERY") {
            options.report_every = v;
        }
        if let Some(v) = env_parse("XMLFLAT_MAX_EVAL_NODES") {
            options.max_eval_nodes = v;
        }
        options
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log_warning(format!("Ignoring {}='{}': not a valid value", key, raw));
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            log_warning(format!("Ignoring {}='{}': expected true or false", key, raw));
            None
        }
    }
}

// =============================================================================
// Per-table flattening
// =============================================================================

/// The main-pass containers of one table.
pub struct TableFlattener<'s> {
    table: &'s OutputTable,
    containers: Vec<LayerContainer>,
    columns: Vec<Arc<Column>>,
}

impl<'s> TableFlattener<'s> {
    /// Build containers with resolved columns expanded. Must run after the
    /// pre-pass, since the column set is fixed from here on.
    pub fn new(table: &'s OutputTable) -> ConfigResult<Self> {
        table.check_duplicates(true)?;
        let containers = LayerContainer::containers_for(&table.tree, true)?;
        Ok(Self {
            table,
            containers,
            columns: table.columns(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn table(&self) -> &OutputTable {
        self.table
    }

    /// Output column order.
    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn containers(&self) -> &[LayerContainer] {
        &self.containers
    }

    /// Flatten one document into rows.
    pub fn flatten(&mut self, ctx: &DocumentContext<'_>, parallel: bool) -> ResolveResult<Vec<Row>> {
        let tree = &self.table.tree;
        if parallel {
            self.containers
                .par_iter_mut()
                .try_for_each(|c| c.process(tree, ctx, true))?;
        } else {
            for container in &mut self.containers {
                container.process(tree, ctx, false)?;
            }
        }
        Ok(merge_layers(&self.containers))
    }
}

// =============================================================================
// Results
// =============================================================================

/// One table of a finished run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    pub output_file: PathBuf,
    pub columns: Vec<String>,
    pub rows: u64,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub specification: String,
    pub batch_time: String,
    /// XML files found under the input directory
    pub files: usize,
    /// Resolved columns discovered by the pre-pass
    pub resolved_columns: usize,
    pub elapsed_millis: u64,
    pub stats: StatsSnapshot,
    pub tables: Vec<TableSummary>,
}

/// Rows of one table for a single document.
#[derive(Debug, Clone)]
pub struct FlattenOutput {
    pub table: String,
    pub columns: Vec<Arc<Column>>,
    pub rows: Vec<Row>,
}

// =============================================================================
// Entry points
// =============================================================================

/// Load the specification at `path` and run it.
pub fn run_file(path: impl AsRef<Path>, options: &RunOptions) -> RunResult<RunSummary> {
    let spec = config::load(path)?;
    run(&spec, options, BatchStats::new())
}

/// Run a loaded specification over its input directory.
pub fn run(spec: &Specification, options: &RunOptions, stats: Arc<BatchStats>) -> RunResult<RunSummary> {
    let started = Instant::now();
    let batch_time = options.batch_time.unwrap_or_else(timeutil::now);

    log_info(format!("📄 Specification: {}", spec.name));
    log_info_indent(format!("Batch time: {}", format_batch_time(&batch_time)), 1);

    let xml_dir = spec.input_path.join(&options.xml_dir);
    if !xml_dir.is_dir() {
        return Err(RunError::InputMissing(xml_dir));
    }
    let dump_dir = spec_dir(spec).join(&options.dump_dir);
    let files = list_xml_files(&xml_dir, Some(&dump_dir))?;
    log_info(format!("📂 Found {} XML files under {}", files.len(), xml_dir.display()));

    // 1. Discover dynamic attribute columns
    let resolved_columns = if spec.has_dynamic_columns() {
        prepass(spec, &files, &batch_time, options)?
    } else {
        0
    };

    // 2. Fix the column order and open the writers
    let mut flatteners = spec
        .tables
        .iter()
        .map(TableFlattener::new)
        .collect::<ConfigResult<Vec<_>>>()?;
    let mut sinks = Vec::with_capacity(flatteners.len());
    for flattener in &flatteners {
        log_info(format!(
            "🗂️  Table '{}': {} columns → {}",
            flattener.name(),
            flattener.columns().len(),
            flattener.table().output_file.display()
        ));
        sinks.push(CsvSink::create(
            &flattener.table().output_file,
            flattener.columns().to_vec(),
        )?);
    }

    // 3. Main pass
    log_info("⚙️  Flattening documents...");
    let mut rows_total = 0u64;
    for (index, path) in files.iter().enumerate() {
        let bytes = fs::read(path)?;
        stats.add_document(bytes.len() as u64);

        let parse_started = Instant::now();
        let parsed = parse_bytes(&bytes);
        stats.add_parse_time(parse_started.elapsed());
        let document = match parsed {
            Ok(doc) => doc,
            Err(e) => {
                let dumped = dump_broken(&dump_dir, index, &bytes)?;
                log_warning(format!(
                    "Skipping {}: {} (copied to {})",
                    path.display(),
                    e,
                    dumped.display()
                ));
                stats.add_broken();
                continue;
            }
        };

        let ctx = document_context(&document, &batch_time, path, options);
        match flatten_all(&mut flatteners, &ctx, options.parallel) {
            Ok(per_table) => {
                for ((rows, sink), flattener) in per_table.iter().zip(&mut sinks).zip(&flatteners) {
                    sink.write_rows(rows)?;
                    stats.add_rows(flattener.name(), rows.len() as u64);
                    rows_total += rows.len() as u64;
                }
            }
            Err(e) if e.is_resource_exhausted() => {
                log_error(format!("Aborting run at {}", path.display()));
                return Err(e.into());
            }
            Err(e) => {
                log_error(format!("Failed to flatten {}: {}", path.display(), e));
                stats.add_failed();
            }
        }

        let done = index + 1;
        if options.report_every > 0 && done % options.report_every == 0 {
            log_info_indent(
                format!("{}/{} documents, {} rows", done, files.len(), rows_total),
                1,
            );
        }
    }

    // 4. Flush and summarize
    let mut tables = Vec::with_capacity(sinks.len());
    for (sink, flattener) in sinks.iter_mut().zip(&flatteners) {
        sink.flush()?;
        log_success_indent(
            format!(
                "{}: {} rows → {}",
                flattener.name(),
                sink.rows_written(),
                flattener.table().output_file.display()
            ),
            1,
        );
        tables.push(TableSummary {
            name: flattener.name().to_string(),
            output_file: flattener.table().output_file.clone(),
            columns: flattener.columns().iter().map(|c| c.name().to_string()).collect(),
            rows: sink.rows_written(),
        });
    }

    let snapshot = stats.snapshot();
    if snapshot.broken > 0 || snapshot.failed > 0 {
        log_warning(format!(
            "{} broken and {} failed documents",
            snapshot.broken, snapshot.failed
        ));
    }
    log_success(format!(
        "✨ Done: {} documents ({} bytes) in {:.1}s, XML parsing {:.1}s",
        snapshot.documents,
        snapshot.bytes,
        started.elapsed().as_secs_f64(),
        Duration::from_millis(snapshot.parse_millis).as_secs_f64()
    ));

    Ok(RunSummary {
        specification: spec.name.clone(),
        batch_time: format_batch_time(&batch_time),
        files: files.len(),
        resolved_columns,
        elapsed_millis: started.elapsed().as_millis() as u64,
        stats: snapshot,
        tables,
    })
}

/// Flatten a single XML file for one table.
///
/// Dynamic columns are discovered from this document only. Without a
/// table name the first table is used.
pub fn flatten_document(
    spec: &Specification,
    table: Option<&str>,
    xml: &Path,
    options: &RunOptions,
) -> RunResult<FlattenOutput> {
    let table = match table {
        Some(name) => spec
            .table(name)
            .ok_or_else(|| RunError::UnknownTable(name.to_string()))?,
        None => spec
            .tables
            .first()
            .ok_or_else(|| RunError::UnknownTable(String::new()))?,
    };
    let batch_time = options.batch_time.unwrap_or_else(timeutil::now);
    let bytes = fs::read(xml)?;
    let document = parse_bytes(&bytes)?;
    let ctx = document_context(&document, &batch_time, xml, options);

    if table.has_dynamic_columns() {
        expand_dynamic_columns(&table.tree, &ctx, options.parallel)?;
    }
    let mut flattener = TableFlattener::new(table)?;
    let rows = flattener.flatten(&ctx, options.parallel)?;
    Ok(FlattenOutput {
        table: table.name.clone(),
        columns: flattener.columns().to_vec(),
        rows,
    })
}

// =============================================================================
// Helpers
// =============================================================================

/// Flatten one document for every table; the first failure wins.
fn flatten_all(
    flatteners: &mut [TableFlattener<'_>],
    ctx: &DocumentContext<'_>,
    parallel: bool,
) -> ResolveResult<Vec<Vec<Row>>> {
    flatteners
        .iter_mut()
        .map(|f| f.flatten(ctx, parallel))
        .collect()
}

/// Scan every document once to discover dynamic attribute columns.
fn prepass(
    spec: &Specification,
    files: &[PathBuf],
    batch_time: &NaiveDateTime,
    options: &RunOptions,
) -> RunResult<usize> {
    log_info("🔍 Discovering dynamic attribute columns...");
    let mut added = 0;
    for path in files {
        let bytes = fs::read(path)?;
        // Broken documents are reported and dumped by the main pass
        let Ok(document) = parse_bytes(&bytes) else {
            continue;
        };
        let ctx = document_context(&document, batch_time, path, options);
        for table in spec.tables.iter().filter(|t| t.has_dynamic_columns()) {
            match expand_dynamic_columns(&table.tree, &ctx, options.parallel) {
                Ok(n) => added += n,
                Err(e) if e.is_resource_exhausted() => return Err(e.into()),
                Err(e) => log_error(format!("Pre-pass failed for {}: {}", path.display(), e)),
            }
        }
    }
    log_success(format!("Resolved {} dynamic columns", added));
    Ok(added)
}

fn document_context<'a>(
    document: &'a Document,
    batch_time: &NaiveDateTime,
    path: &Path,
    options: &RunOptions,
) -> DocumentContext<'a> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    DocumentContext::new(document, batch_time)
        .with_variable("input_file_name", file_name)
        .with_variable("source_xml_date", file_date(path).unwrap_or_default())
        .with_max_eval_nodes(options.max_eval_nodes)
}

/// Directory of the specification file, or the input path for specifications
/// built in memory.
fn spec_dir(spec: &Specification) -> &Path {
    spec.origin
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(spec.input_path.as_path())
}

/// Modification time of `path` in batch time format.
fn file_date(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = modified.into();
    Some(format_batch_time(&local.naive_local()))
}

/// Every `.xml` file under `dir`, recursively, in path order.
///
/// The `exclude` directory is not entered, so earlier broken-document dumps
/// never come back as input when they live under `dir`.
pub fn list_xml_files(dir: &Path, exclude: Option<&Path>) -> RunResult<Vec<PathBuf>> {
    let excluded = exclude.and_then(|p| fs::canonicalize(p).ok());
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                if excluded.is_some() && fs::canonicalize(&path).ok() == excluded {
                    continue;
                }
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Copy an unparsable document to `<dir>/<index>-broken.xml`.
fn dump_broken(dir: &Path, index: usize, bytes: &[u8]) -> RunResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}-broken.xml", index));
    fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SPEC: &str = r#"
name: Items
inputPath: xml
outputTables:
  - name: tags
    outputFile: ../out/tags.csv
    definition:
      - { columnName: source, sourceType: eval, sourceDef: batch }
      - columnName: items
        explode: true
        sourceDef: root/item
        repeatingList:
          - { columnName: kind, sourceType: eval, sourceDef: item }
          - columnName: tags
            explode: true
            sourceDef: tag
            repeatingList:
              - { columnName: item_id, sourceType: xpath, sourceDef: "../@id" }
              - { columnName: tag, sourceType: xpath, sourceDef: "." }
"#;

    const DOC: &str = r#"<root>
  <item id="1"><tag>a</tag><tag>b</tag></item>
  <item id="2"><tag>c</tag><tag>d</tag></item>
  <item id="3"><tag>e</tag><tag>f</tag></item>
</root>"#;

    fn options() -> RunOptions {
        RunOptions {
            batch_time: Some(
                NaiveDate::from_ymd_opt(2022, 2, 2)
                    .unwrap()
                    .and_hms_opt(2, 2, 2)
                    .unwrap(),
            ),
            ..RunOptions::default()
        }
    }

    fn workspace(spec: &str, docs: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("xml/nested")).unwrap();
        fs::write(dir.path().join("spec.yaml"), spec).unwrap();
        for (name, content) in docs {
            fs::write(dir.path().join("xml").join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_end_to_end_items_and_tags() {
        let dir = workspace(SPEC, &[("one.xml", DOC)]);
        let summary = run_file(dir.path().join("spec.yaml"), &options()).unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.tables[0].rows, 6);
        assert_eq!(summary.tables[0].columns, vec!["source", "kind", "item_id", "tag"]);

        let csv = fs::read_to_string(dir.path().join("out/tags.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "source,kind,item_id,tag");
        assert_eq!(lines[1], "batch,item,1,a");
        assert_eq!(lines[2], "batch,item,1,b");
        assert_eq!(lines[6], "batch,item,3,f");
    }

    #[test]
    fn test_broken_documents_are_dumped_and_skipped() {
        let dir = workspace(
            SPEC,
            &[("a.xml", DOC), ("b.xml", "<root><item>"), ("nested/c.xml", DOC)],
        );
        let spec = config::load(dir.path().join("spec.yaml")).unwrap();
        let stats = BatchStats::new();
        let summary = run(&spec, &options(), stats.clone()).unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(stats.documents(), 3);
        assert_eq!(stats.broken(), 1);
        assert_eq!(summary.tables[0].rows, 12);
        assert!(dir.path().join("broken-xml/1-broken.xml").exists());
    }

    #[test]
    fn test_dynamic_columns_join_the_header() {
        let spec = r#"
name: Dynamic
inputPath: xml
outputTables:
  - name: attrs
    outputFile: attrs.csv
    definition:
      - { columnName: file, sourceType: xpath, sourceDef: "$input_file_name" }
      - columnName: items
        explode: true
        sourceDef: root/item
        repeatingList:
          - { columnName: a, sourceType: dynAttribute, sourceDef: "", attributeFilter: "x.*" }
"#;
        let dir = workspace(
            spec,
            &[
                ("1.xml", r#"<root><item x1="p"/></root>"#),
                ("2.xml", r#"<root><item x2="q"/><item x1="r" y="s"/></root>"#),
            ],
        );
        let summary = run_file(dir.path().join("spec.yaml"), &options()).unwrap();
        assert_eq!(summary.resolved_columns, 2);
        assert_eq!(summary.tables[0].columns, vec!["file", "a_x1", "a_x2"]);

        let csv = fs::read_to_string(dir.path().join("xml/attrs.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["file,a_x1,a_x2", "1.xml,p,", "2.xml,,q", "2.xml,r,"]);
    }

    #[test]
    fn test_dumps_are_not_read_back_as_input() {
        // Without inputPath the documents sit next to the spec, and so do the dumps
        let spec = r#"
name: Flat
outputTables:
  - name: items
    outputFile: out/items.csv
    definition:
      - { columnName: source, sourceType: eval, sourceDef: batch }
      - columnName: items
        explode: true
        sourceDef: root/item
        repeatingList:
          - { columnName: id, sourceType: xpath, sourceDef: "@id" }
"#;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("spec.yaml"), spec).unwrap();
        fs::write(dir.path().join("a.xml"), r#"<root><item id="1"/></root>"#).unwrap();
        fs::write(dir.path().join("b.xml"), "<root><item>").unwrap();

        let first = run_file(dir.path().join("spec.yaml"), &options()).unwrap();
        assert_eq!(first.files, 2);
        assert_eq!(first.stats.broken, 1);
        assert!(dir.path().join("broken-xml/1-broken.xml").exists());

        let second = run_file(dir.path().join("spec.yaml"), &options()).unwrap();
        assert_eq!(second.files, 2);
        assert_eq!(second.stats.broken, 1);
        assert_eq!(second.tables[0].rows, 1);
    }

    #[test]
    fn test_missing_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("spec.yaml"), SPEC).unwrap();
        let err = run_file(dir.path().join("spec.yaml"), &options()).unwrap_err();
        assert!(matches!(err, RunError::InputMissing(_)));
    }

    #[test]
    fn test_flatten_single_document() {
        let dir = workspace(SPEC, &[("one.xml", DOC)]);
        let spec = config::load(dir.path().join("spec.yaml")).unwrap();
        let out = flatten_document(&spec, None, &dir.path().join("xml/one.xml"), &options()).unwrap();
        assert_eq!(out.table, "tags");
        assert_eq!(out.rows.len(), 6);

        let err = flatten_document(&spec, Some("nope"), &dir.path().join("xml/one.xml"), &options())
            .unwrap_err();
        assert!(matches!(err, RunError::UnknownTable(_)));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let spec = r#"
name: Wide
inputPath: xml
outputTables:
  - name: wide
    outputFile: wide.csv
    definition:
      - { columnName: source, sourceType: eval, sourceDef: batch }
      - columnName: items
        explode: true
        sourceDef: root/item
        repeatingList:
          - { columnName: item_id, sourceType: xpath, sourceDef: "@id" }
          - { columnName: dyn, sourceType: dynAttribute, sourceDef: "", attributeFilter: "x.*" }
          - columnName: tags
            explode: true
            sourceDef: tag
            repeatingList:
              - { columnName: tag, sourceType: xpath, sourceDef: "." }
              - { columnName: pos, sourceType: xpath, sourceDef: "count(preceding-sibling::tag)" }
      - columnName: notes
        explode: true
        sourceDef: root/note
        repeatingList:
          - { columnName: note, sourceType: xpath, sourceDef: "." }
"#;
        let mut doc = String::from("<root>");
        for i in 0..5 {
            doc.push_str(&format!(r#"<item id="{}" x{}="v{}">"#, i, i, i));
            for t in 0..4 {
                doc.push_str(&format!("<tag>t{}-{}</tag>", i, t));
            }
            doc.push_str("</item>");
        }
        doc.push_str("<note>first</note><note>second</note></root>");
        let dir = workspace(spec, &[("wide.xml", doc.as_str())]);
        let xml = dir.path().join("xml/wide.xml");

        // Resolved columns live on the loaded specification, so load it per mode
        let flatten = |parallel: bool| {
            let spec = config::load(dir.path().join("spec.yaml")).unwrap();
            let out = flatten_document(&spec, None, &xml, &RunOptions { parallel, ..options() }).unwrap();
            let header: Vec<String> = out.columns.iter().map(|c| c.name().to_string()).collect();
            let rows: Vec<Vec<String>> = out
                .rows
                .iter()
                .map(|r| r.project(&out.columns).map(str::to_string).collect())
                .collect();
            (header, rows)
        };

        let (seq_header, seq_rows) = flatten(false);
        let (par_header, par_rows) = flatten(true);
        assert_eq!(seq_header, par_header);
        assert!(seq_header.contains(&"dyn_x4".to_string()));
        // 1 root row x 5 items x 20 tags x 2 notes
        assert_eq!(seq_rows.len(), 200);
        assert_eq!(seq_rows, par_rows);
    }

    #[test]
    fn test_list_is_recursive_and_sorted() {
        let dir = workspace(SPEC, &[("b.xml", DOC), ("a.XML", DOC), ("nested/c.xml", DOC), ("x.txt", "")]);
        let files = list_xml_files(&dir.path().join("xml"), None).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path().join("xml")).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml", "nested/c.xml"]);
    }
}
