//! Sheetload CLI - normalize spreadsheets into system records
//!
//! # Main Commands
//!
//! ```bash
//! sheetload serve                           # Start HTTP server (port 3000)
//! sheetload import compras.xlsx -c purchase # Normalize and commit to the records directory
//! sheetload mapping list                    # Manage saved mappings
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! sheetload inspect input.csv      # Header row, column types and mapping guesses
//! sheetload normalize input.csv    # Parsed rows as JSON
//! sheetload expand resultados.xlsx # Account × month sheet to one row per month
//! sheetload contexts               # Built-in import contexts
//! ```
//!
//! JSON goes to stdout; progress goes to stderr.

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use sheetload::transform::matrix::{period_headers, suggest_matrix_config};
use sheetload::{
    fields, ColumnType, FileMappingStore, ImportSession, JsonLinesSink, Layout, Locale,
    MappingStore, MatrixConfig, ParsedRow, Settings,
};

#[derive(Parser)]
#[command(name = "sheetload")]
#[command(about = "Normalize spreadsheets into system records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that reads a file
#[derive(Args)]
struct SessionArgs {
    /// Input file (CSV, TSV, XLSX, XLS, ODS)
    input: PathBuf,

    /// Import context (see `sheetload contexts`)
    #[arg(short, long, default_value = fields::DEFAULT_CONTEXT)]
    context: String,

    /// Locale for month names and yes/no words (es, en)
    #[arg(short, long)]
    locale: Option<Locale>,

    /// Header row, 1-based (detected if not specified)
    #[arg(long)]
    header_row: Option<usize>,

    /// Year for bare month names and matrix periods
    #[arg(short, long)]
    year: Option<i32>,

    /// Field assignment, `key=Header` (repeatable; `key=` clears)
    #[arg(short, long = "map", value_name = "KEY=HEADER")]
    mappings: Vec<String>,

    /// Column type override, `Header=type` (repeatable)
    #[arg(short = 't', long = "type", value_name = "HEADER=TYPE")]
    types: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the analysis found: header row, column types, mapping, layout
    Inspect {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Normalize a file and output parsed rows as JSON
    Normalize {
        #[command(flatten)]
        session: SessionArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only output valid rows
        #[arg(long)]
        valid_only: bool,
    },

    /// Expand an account × month sheet into one row per account and month
    Expand {
        #[command(flatten)]
        session: SessionArgs,

        /// Account code column (detected if not specified)
        #[arg(long)]
        code_column: Option<String>,

        /// Account name column
        #[arg(long)]
        name_column: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Normalize a file and commit the valid rows to the records directory
    Import {
        #[command(flatten)]
        session: SessionArgs,

        /// Leave rows already present in the destination out of the commit
        #[arg(long)]
        skip_duplicates: bool,
    },

    /// List the built-in import contexts
    Contexts,

    /// Manage saved mappings
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: SHEETLOAD_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// List all saved mappings
    List,

    /// Show the saved mapping of a context
    Show {
        /// Import context
        context: String,
    },

    /// Forget the saved mapping of a context
    Clear {
        /// Import context
        context: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match Settings::from_env() {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Inspect { session } => cmd_inspect(&settings, &session),
        Commands::Normalize {
            session,
            output,
            valid_only,
        } => cmd_normalize(&settings, &session, output.as_deref(), valid_only),
        Commands::Expand {
            session,
            code_column,
            name_column,
            output,
        } => cmd_expand(&settings, &session, code_column, name_column, output.as_deref()),
        Commands::Import {
            session,
            skip_duplicates,
        } => cmd_import(&settings, &session, skip_duplicates),
        Commands::Contexts => cmd_contexts(),
        Commands::Mapping { action } => cmd_mapping(&settings, action),
        Commands::Serve { port } => {
            let mut settings = settings;
            if let Some(port) = port {
                settings.port = port;
            }
            sheetload::server::start_server(settings).await
        }
    }
}

/// Build a session for `args` and load its file.
fn open_session(
    settings: &Settings,
    args: &SessionArgs,
    store: &dyn MappingStore,
) -> Result<ImportSession, Box<dyn std::error::Error>> {
    let registry = fields::registry(&args.context).ok_or_else(|| {
        format!(
            "Unknown context '{}'. Available: {}",
            args.context,
            fields::contexts().join(", ")
        )
    })?;

    let mut options = settings.import_options();
    if let Some(locale) = args.locale {
        options.locale = locale;
    }
    options.reference_year = args.year;
    options.header_row = match args.header_row {
        Some(0) => return Err("Header rows are numbered from 1".into()),
        Some(row) => Some(row - 1),
        None => None,
    };

    let bytes = fs::read(&args.input)?;
    let file_name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input");

    let mut session = ImportSession::new(registry, options);
    session.load_bytes(&bytes, file_name, store)?;

    for entry in &args.types {
        let (header, ty) = split_pair(entry)?;
        let ty: ColumnType = ty.parse()?;
        session.set_column_type(header, ty)?;
    }
    for entry in &args.mappings {
        let (key, header) = split_pair(entry)?;
        let header = (!header.is_empty()).then_some(header);
        session.set_mapping(key, header)?;
    }

    Ok(session)
}

fn split_pair(entry: &str) -> Result<(&str, &str), Box<dyn std::error::Error>> {
    entry
        .split_once('=')
        .map(|(a, b)| (a.trim(), b.trim()))
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{}'", entry).into())
}

fn cmd_inspect(settings: &Settings, args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileMappingStore::with_dir(settings.mapping_dir());
    let session = open_session(settings, args, &store)?;

    let missing: Vec<&str> = session
        .registry()
        .required_fields()
        .filter(|f| session.mapping().get(&f.key).is_none())
        .map(|f| f.key.as_str())
        .collect();
    if !missing.is_empty() {
        eprintln!("⚠️  Required fields not mapped: {}", missing.join(", "));
    }

    let report = json!({
        "context": session.registry().context,
        "source": session.source_info(),
        "headerRow": session.header_row() + 1,
        "headers": session.headers(),
        "columns": session.columns(),
        "mapping": session.mapping(),
        "matrixDetected": session.matrix_detected(),
        "layout": session.layout(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_normalize(
    settings: &Settings,
    args: &SessionArgs,
    output: Option<&Path>,
    valid_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileMappingStore::with_dir(settings.mapping_dir());
    let mut session = open_session(settings, args, &store)?;
    session.use_flat()?;
    emit_rows(&mut session, output, valid_only)
}

fn cmd_expand(
    settings: &Settings,
    args: &SessionArgs,
    code_column: Option<String>,
    name_column: Option<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileMappingStore::with_dir(settings.mapping_dir());
    let mut session = open_session(settings, args, &store)?;
    let locale = session.options().locale;
    let year = session.reference_year();

    let mut config = match (session.layout(), &code_column) {
        (Layout::Matrix(config), None) => config.clone(),
        _ => suggest_matrix_config(session.headers(), locale, year).unwrap_or(MatrixConfig {
            account_code_header: String::new(),
            account_name_header: None,
            year,
            periods: period_headers(session.headers(), locale),
        }),
    };
    if let Some(code) = code_column {
        config.account_code_header = code;
    }
    if name_column.is_some() {
        config.account_name_header = name_column;
    }
    if config.account_code_header.is_empty() {
        return Err("No account column found; pass --code-column".into());
    }

    session.use_matrix(config)?;
    emit_rows(&mut session, output, false)
}

fn emit_rows(
    session: &mut ImportSession,
    output: Option<&Path>,
    valid_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    session.normalize()?;
    let rows: Vec<&ParsedRow> = session
        .parsed_rows()
        .iter()
        .filter(|r| !valid_only || r.is_valid)
        .collect();

    print_summary(session);
    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)
}

fn print_summary(session: &ImportSession) {
    eprintln!("\n📊 Rows: {}", session.parsed_rows().len());
    eprintln!("   ✅ Valid:      {}", session.valid_count());
    eprintln!("   ❌ Invalid:    {}", session.error_count());
    eprintln!("   ♻️  Duplicates: {}", session.duplicate_count());

    for row in session.parsed_rows().iter().filter(|r| !r.is_valid).take(5) {
        eprintln!("\n   Row {}:", row.raw_row_index + 1);
        for err in row.validation_errors.iter().take(3) {
            eprintln!("     - {}", err);
        }
    }
}

fn cmd_import(settings: &Settings, args: &SessionArgs, skip_duplicates: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = FileMappingStore::with_dir(settings.mapping_dir());
    let mut sink = JsonLinesSink::new(settings.records_dir());

    let mut session = open_session(settings, args, &store)?;
    session.refresh_existing_ids(&sink)?;
    session.normalize()?;
    if skip_duplicates {
        let removed = session.deselect_duplicates();
        if removed > 0 {
            eprintln!("   Skipping {} duplicates", removed);
        }
    }
    print_summary(&session);

    let summary = session.commit(&mut sink, &mut store)?;
    eprintln!(
        "\n✨ Inserted {} rows into {}",
        summary.inserted,
        sink.table_path(&summary.table).display()
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_contexts() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&fields::all())?);
    Ok(())
}

fn cmd_mapping(settings: &Settings, action: MappingAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = FileMappingStore::with_dir(settings.mapping_dir());

    match action {
        MappingAction::List => {
            let saved = store.list();
            if saved.is_empty() {
                eprintln!("📋 No mappings saved yet.");
                eprintln!("   They are saved on every successful 'sheetload import'.");
                return Ok(());
            }

            eprintln!("📋 Saved mappings ({}):\n", saved.len());
            for pref in saved {
                println!("  📄 {}", pref.context);
                let fields: Vec<String> = pref.mapping.iter().map(|(k, h)| format!("{} ← {}", k, h)).collect();
                println!("     Fields: {}", fields.join(", "));
                println!("     Uses: {}", pref.use_count);
                println!("     Updated: {}", pref.updated_at);
                println!();
            }
        }

        MappingAction::Show { context } => match store.get(&context) {
            Some(pref) => println!("{}", serde_json::to_string_pretty(&pref)?),
            None => return Err(format!("No saved mapping for context: {}", context).into()),
        },

        MappingAction::Clear { context } => {
            store.remove(&context)?;
            eprintln!("🗑️  Mapping cleared: {}", context);
        }
    }

    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
