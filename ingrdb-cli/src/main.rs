use clap::{Parser, Subcommand, ValueEnum};
use ingrdb::materializer::{FileRecordsReader, FileViewDefReader, ViewBuilder, ViewDefReader};
use ingrdb::schema::{read_definition, CollectionDef, DEFAULT_VIEW_ID};
use ingrdb::{Cancellation, MaterializeResult, ViewDef};
use std::path::PathBuf;
use std::process;

/// ingrdb CLI: materialize and inspect a file-tree document database
#[derive(Parser)]
#[command(name = "ingrdb", version, about)]
struct Cli {
    /// Output format for reports
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Materialize views in the database
    Materialize {
        /// Path to the database directory (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Root directory for exported artifacts (default: the database path)
        #[arg(long)]
        output_root: Option<PathBuf>,

        /// Comma-separated list of views to materialize
        #[arg(long)]
        views: Option<String>,

        /// Force the INGR records delimiter on or off, overriding schema
        /// settings and view definitions
        #[arg(long)]
        records_delimiter: Option<bool>,
    },

    /// List database objects
    List {
        #[command(subcommand)]
        what: ListCommand,
    },

    /// Check collection definitions for consistency
    Validate {
        /// Path to the database directory (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum ListCommand {
    /// List collections in the database
    Collections {
        /// Path to the database directory (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Materialize {
            path,
            output_root,
            views,
            records_delimiter,
        } => materialize(path, output_root, views, records_delimiter),
        Command::List { what } => match what {
            ListCommand::Collections { path } => list_collections(path),
        },
        Command::Validate { path } => validate(path, &cli.format),
    }
}

fn materialize(
    path: PathBuf,
    output_root: Option<PathBuf>,
    views: Option<String>,
    records_delimiter: Option<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = path
        .canonicalize()
        .map_err(|e| format!("failed to resolve database path {}: {e}", path.display()))?;
    let output_root = output_root.unwrap_or_else(|| db_path.clone());

    let mut def = read_definition(&db_path)?;
    def.runtime_overrides.records_delimiter = records_delimiter;

    let view_filter: Option<Vec<String>> = views.as_deref().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    });

    let builder = ViewBuilder::with_default_collaborators(Box::new(FileRecordsReader::new()));
    let cancel = Cancellation::new();

    let mut collections: Vec<&CollectionDef> = def.collections.values().collect();
    collections.sort_by(|a, b| a.id.cmp(&b.id));

    let mut total = MaterializeResult::default();
    for col in collections {
        match &view_filter {
            None => match builder.build_views(&cancel, &db_path, &output_root, col, &def) {
                Ok(result) => total.merge(result),
                Err(e @ ingrdb::IngrDbError::Cancelled) => return Err(e.into()),
                // A failing collection never aborts the run; its error is
                // surfaced with the totals at the end.
                Err(e) => total.errors.push(e),
            },
            Some(names) => {
                for view in selected_views(col, names)? {
                    match builder.build_view(&cancel, &db_path, &output_root, col, &def, &view) {
                        Ok(result) => total.merge(result),
                        Err(e @ ingrdb::IngrDbError::Cancelled) => return Err(e.into()),
                        Err(e) => total.errors.push(e),
                    }
                }
            }
        }
    }

    println!(
        "materialized views: {} created, {} updated, {} deleted, {} unchanged",
        total.files_created, total.files_updated, total.files_deleted, total.files_unchanged
    );
    if total.has_errors() {
        for err in &total.errors {
            eprintln!("ERROR: {err}");
        }
        process::exit(1);
    }
    Ok(())
}

/// Resolves the subset of a collection's views matching the `--views`
/// filter: declared views by id, plus the inline default view under its
/// fixed id.
fn selected_views(
    col: &CollectionDef,
    names: &[String],
) -> Result<Vec<ViewDef>, Box<dyn std::error::Error>> {
    let mut declared = FileViewDefReader::new().read_view_defs(&col.dir_path)?;
    if let Some(default_view) = &col.default_view {
        let mut view = default_view.clone();
        view.id = DEFAULT_VIEW_ID.to_string();
        view.is_default = true;
        declared.insert(DEFAULT_VIEW_ID.to_string(), view);
    }

    let mut selected: Vec<ViewDef> = declared
        .into_values()
        .filter(|v| names.iter().any(|n| n == &v.id))
        .collect();
    selected.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(selected)
}

fn list_collections(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let def = read_definition(&path)?;
    let mut ids: Vec<&String> = def.collections.keys().collect();
    ids.sort();
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

fn validate(path: PathBuf, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let def = read_definition(&path)?;
    let mut ids: Vec<&String> = def.collections.keys().collect();
    ids.sort();

    let mut report = serde_json::Map::new();
    let mut failures = 0usize;
    for id in ids {
        let entry = match def.collections[id].validate() {
            Ok(()) => serde_json::json!({ "ok": true }),
            Err(e) => {
                failures += 1;
                serde_json::json!({ "ok": false, "error": e.to_string() })
            }
        };
        report.insert(id.clone(), entry);
    }
    print_output(&serde_json::Value::Object(report), format);

    if failures > 0 {
        eprintln!("ERROR: {failures} invalid collection definition(s)");
        process::exit(1);
    }
    Ok(())
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).unwrap());
        }
    }
}
