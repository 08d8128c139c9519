//! xmlflat CLI - Flatten XML documents into CSV tables
//!
//! # Main Commands
//!
//! ```bash
//! xmlflat run spec.yaml                  # Flatten every XML file it names
//! xmlflat check spec.yaml                # Validate a spec and show its layers
//! xmlflat flatten spec.yaml doc.xml      # Flatten one document to stdout
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! xmlflat eval doc.xml "count(//item)"   # Evaluate an expression
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use xmlflat::{
    flatten_document, load_specification, parse_file, run, timeutil, BatchStats, CsvSink,
    EvalContext, LayerContainer, RunOptions, Selector, Value, XNode,
};

#[derive(Parser)]
#[command(name = "xmlflat")]
#[command(about = "Flatten nested XML documents into CSV tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten every XML file under the specification's input path
    Run {
        /// Specification file (YAML or JSON)
        spec: PathBuf,

        /// Resolve columns and layers in parallel
        #[arg(short, long)]
        parallel: bool,

        /// Fixed batch time (default: now)
        #[arg(long)]
        batch_time: Option<String>,

        /// XML directory, relative to the input path
        #[arg(long)]
        xml_dir: Option<PathBuf>,

        /// Write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Validate a specification and print its layers
    Check {
        /// Specification file (YAML or JSON)
        spec: PathBuf,
    },

    /// Flatten a single XML document
    Flatten {
        /// Specification file (YAML or JSON)
        spec: PathBuf,

        /// XML document
        xml: PathBuf,

        /// Output table (default: the first one)
        #[arg(short, long)]
        table: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fixed batch time (default: now)
        #[arg(long)]
        batch_time: Option<String>,
    },

    /// Evaluate an expression against a document
    Eval {
        /// XML document
        xml: PathBuf,

        /// XPath expression
        expression: String,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            spec,
            parallel,
            batch_time,
            xml_dir,
            summary,
        } => cmd_run(&spec, parallel, batch_time.as_deref(), xml_dir, summary.as_deref()),

        Commands::Check { spec } => cmd_check(&spec),

        Commands::Flatten {
            spec,
            xml,
            table,
            output,
            batch_time,
        } => cmd_flatten(
            &spec,
            &xml,
            table.as_deref(),
            output.as_deref(),
            batch_time.as_deref(),
        ),

        Commands::Eval { xml, expression } => cmd_eval(&xml, &expression),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn options(batch_time: Option<&str>) -> Result<RunOptions, Box<dyn std::error::Error>> {
    let mut options = RunOptions::from_env();
    if let Some(t) = batch_time {
        options.batch_time = Some(timeutil::parse_timestamp(t)?);
    }
    Ok(options)
}

fn cmd_run(
    spec_path: &Path,
    parallel: bool,
    batch_time: Option<&str>,
    xml_dir: Option<PathBuf>,
    summary_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = options(batch_time)?;
    options.parallel |= parallel;
    if let Some(dir) = xml_dir {
        options.xml_dir = dir;
    }

    let spec = load_specification(spec_path)?;
    let summary = run(&spec, &options, BatchStats::new())?;

    if let Some(path) = summary_path {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, &json)?;
        eprintln!("   💾 Summary saved to: {}", path.display());
    }
    Ok(())
}

fn cmd_check(spec_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Checking: {}", spec_path.display());
    let spec = load_specification(spec_path)?;

    eprintln!("   Name: {}", spec.name);
    eprintln!("   Input path: {}", spec.input_path.display());
    for table in &spec.tables {
        eprintln!("\n🗂️  Table '{}' → {}", table.name, table.output_file.display());
        for layer in LayerContainer::containers_for(&table.tree, false)? {
            let names: Vec<&str> = layer.columns().iter().map(|c| c.name()).collect();
            eprintln!(
                "   {}[{}] {}: {}",
                "  ".repeat(layer.level()),
                layer.level(),
                layer.name(),
                names.join(", ")
            );
        }
        eprintln!("   Columns: {}", table.column_names(false).join(", "));
        if table.has_dynamic_columns() {
            eprintln!("   (dynamic attribute columns expand during a run)");
        }
    }

    eprintln!("\n✅ Specification is valid");
    Ok(())
}

fn cmd_flatten(
    spec_path: &Path,
    xml: &Path,
    table: Option<&str>,
    output: Option<&Path>,
    batch_time: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = options(batch_time)?;
    let spec = load_specification(spec_path)?;
    let result = flatten_document(&spec, table, xml, &options)?;
    eprintln!(
        "📄 {}: {} rows for table '{}'",
        xml.display(),
        result.rows.len(),
        result.table
    );

    match output {
        Some(path) => {
            let mut sink = CsvSink::create(path, result.columns)?;
            sink.write_rows(&result.rows)?;
            sink.flush()?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
        None => {
            let mut sink = CsvSink::from_writer(io::stdout().lock(), result.columns)?;
            sink.write_rows(&result.rows)?;
            sink.flush()?;
        }
    }
    Ok(())
}

fn cmd_eval(xml: &Path, expression: &str) -> Result<(), Box<dyn std::error::Error>> {
    let doc = parse_file(xml)?;
    let selector = Selector::compile(expression)?;
    let ctx = EvalContext::new(&doc, xmlflat::xpath::DEFAULT_MAX_EVAL_NODES);

    match selector.evaluate(&ctx, XNode::Node(doc.root()))? {
        Value::Nodes(nodes) => {
            eprintln!("{} nodes", nodes.len());
            for node in nodes {
                println!("{}\t{}", ctx.node_name(node), ctx.node_string(node).trim());
            }
        }
        other => println!("{}", ctx.string(&other)),
    }
    eprintln!("   Visited {} nodes", ctx.visited());
    Ok(())
}
