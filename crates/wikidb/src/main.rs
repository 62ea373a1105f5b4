use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wikidb_core::StoreError;
use wikidb_core::check::check_database;
use wikidb_core::config::{GlobalConfig, WikiConnection, load_config};
use wikidb_core::delete::{DeleteOptions, delete_page};
use wikidb_core::indexer::{
    AbortOnMissingParent, MissingParent, ParentDecision, ParentResolver, insert_page,
};
use wikidb_core::layout::normalize_path;
use wikidb_core::model::Page;
use wikidb_core::query::{
    ColumnSelection, DatabaseColumn, PageColumn, Row, WikiColumn, list_databases, list_pages,
    list_tree, list_wikis, page_info, render_rows,
};
use wikidb_core::runtime::{InitOptions, ResolutionContext, init_database, resolve_config_path};

const LOG_ENV: &str = "WIKIDB_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "wikidb",
    version,
    about = "Local, file-based store for pages fetched from wikis"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short = 'D', long, global = true, value_name = "NAME")]
    database: Option<String>,
    #[arg(short = 'W', long, global = true, value_name = "NAME")]
    wiki: Option<String>,
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Print resolved config diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    database: Option<String>,
    wiki: Option<String>,
    json: bool,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            database: cli.database.clone(),
            wiki: cli.wiki.clone(),
            json: cli.json,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the pages directory and an empty index for a database")]
    Init(InitArgs),
    #[command(about = "Index a fetched page from a local content file")]
    Insert(InsertArgs),
    #[command(about = "List databases, wikis and pages (tree by default)")]
    List(ListArgs),
    #[command(about = "Show one page's record without its content")]
    Info(InfoArgs),
    #[command(about = "Remove a page and everything below it")]
    Delete(DeleteArgs),
    #[command(about = "Audit a database for broken references and stray records")]
    Check,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing database index")]
    force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MissingParentMode {
    Abort,
    Prompt,
}

#[derive(Debug, Args)]
struct InsertArgs {
    identifier: String,
    #[arg(long, value_name = "PATH", help = "File holding the page body")]
    content_file: PathBuf,
    #[arg(long, help = "Source URL (defaults to the wiki's URL template)")]
    url: Option<String>,
    #[arg(long, value_enum, default_value_t = MissingParentMode::Abort)]
    on_missing_parent: MissingParentMode,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, conflicts_with_all = ["wikis", "pages"], help = "List configured databases")]
    databases: bool,
    #[arg(long, conflicts_with = "pages", help = "List wikis indexed in the database")]
    wikis: bool,
    #[arg(long, help = "List pages of the wiki")]
    pages: bool,
    #[arg(long, help = "Show every column")]
    info: bool,
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    database_columns: Vec<String>,
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    wiki_columns: Vec<String>,
    #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
    page_columns: Vec<String>,
}

#[derive(Debug, Args)]
struct InfoArgs {
    identifier: String,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    identifier: String,
    #[arg(long, help = "Report what would be removed without removing it")]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    let result = match cli.command {
        Commands::Init(args) => run_init(&runtime, args),
        Commands::Insert(args) => run_insert(&runtime, args),
        Commands::List(args) => run_list(&runtime, args),
        Commands::Info(args) => run_info(&runtime, args),
        Commands::Delete(args) => run_delete(&runtime, args),
        Commands::Check => run_check(&runtime),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

fn report_error(error: &anyhow::Error) {
    eprintln!("fatal: {error:#}");
    if let Some(store_error) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StoreError>())
    {
        eprintln!("hint: {}", store_error.hint());
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let database = config.database(runtime.database.as_deref())?;
    let report = init_database(&database, &InitOptions { force: args.force })?;

    if runtime.json {
        return print_json(&InitSummary {
            database: &report.database,
            index_path: normalize_path(&report.index_path),
            created_dirs: report.created_dirs.iter().map(|dir| normalize_path(dir)).collect(),
            wrote_index: report.wrote_index,
        });
    }
    println!("database: {}", report.database);
    println!("index_path: {}", normalize_path(&report.index_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_index: {}", format_flag(report.wrote_index));
    if !report.wrote_index {
        println!("index already exists; rerun with --force to reset it");
    }
    Ok(())
}

#[derive(Serialize)]
struct InitSummary<'a> {
    database: &'a str,
    index_path: String,
    created_dirs: Vec<String>,
    wrote_index: bool,
}

fn run_insert(runtime: &RuntimeOptions, args: InsertArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let selection = config.select(runtime.database.as_deref(), runtime.wiki.as_deref())?;
    let content = read_content_file(&args.content_file)?;
    let url = args
        .url
        .unwrap_or_else(|| selection.wiki.page_url(&args.identifier));
    let page = Page::fetched(&args.identifier, &selection.wiki.name, url, content)?;

    let report = match args.on_missing_parent {
        MissingParentMode::Abort => {
            insert_page(&page, &selection.database, &mut AbortOnMissingParent)?
        }
        MissingParentMode::Prompt => {
            let mut resolver = PromptForParent {
                wiki: &selection.wiki,
            };
            insert_page(&page, &selection.database, &mut resolver)?
        }
    };

    if runtime.json {
        return print_json(&report);
    }
    println!("indexed: {}", report.identifier);
    println!("wiki: {}", report.wiki);
    println!("content_path: {}", normalize_path(&report.content_path));
    println!("record_path: {}", normalize_path(&report.record_path));
    println!("added_to_index: {}", format_flag(report.added_to_index));
    println!("linked_to_parent: {}", format_flag(report.linked_to_parent));
    println!("page_counter: {}", report.page_counter);
    if !report.resolved_parents.is_empty() {
        println!("resolved_parents:");
        for parent in &report.resolved_parents {
            println!("  - {parent}");
        }
    }
    Ok(())
}

/// Asks on the terminal for a content file to index the missing parent from.
struct PromptForParent<'a> {
    wiki: &'a WikiConnection,
}

impl ParentResolver for PromptForParent<'_> {
    fn resolve(&mut self, missing: &MissingParent) -> wikidb_core::StoreResult<ParentDecision> {
        eprint!(
            "parent \"{}\" of \"{}\" is not indexed in wiki \"{}\".\ncontent file for \"{}\" (empty to abort): ",
            missing.parent, missing.identifier, missing.wiki, missing.parent
        );
        let stdin_path = Path::new("<stdin>");
        io::stderr()
            .flush()
            .map_err(|source| StoreError::Io {
                path: stdin_path.to_path_buf(),
                source,
            })?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|source| StoreError::Io {
                path: stdin_path.to_path_buf(),
                source,
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(ParentDecision::Abort);
        }
        let path = PathBuf::from(answer);
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let parent = Page::fetched(
            &missing.parent,
            &missing.wiki,
            self.wiki.page_url(&missing.parent),
            content,
        )?;
        Ok(ParentDecision::Insert(parent))
    }
}

fn run_list(runtime: &RuntimeOptions, args: ListArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let columns = ColumnSelection::resolve(
        &parse_columns::<DatabaseColumn>(&args.database_columns)?,
        &parse_columns::<WikiColumn>(&args.wiki_columns)?,
        &parse_columns::<PageColumn>(&args.page_columns)?,
        args.info,
    );

    let rows = if args.databases {
        let connections = selected_connections(&config, runtime)?;
        list_databases(&connections, &columns.databases)?
    } else if args.wikis {
        let database = config.database(runtime.database.as_deref())?;
        list_wikis(&database, &config.wikis, &columns.wikis)?
    } else if args.pages {
        let database = config.database(runtime.database.as_deref())?;
        let wiki = wiki_name(&config, runtime)?;
        list_pages(&database, &wiki, &columns.pages)?
    } else {
        let connections = selected_connections(&config, runtime)?;
        list_tree(&connections, &config.wikis, &columns)?
    };

    print_rows(runtime, &rows)
}

fn run_info(runtime: &RuntimeOptions, args: InfoArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let database = config.database(runtime.database.as_deref())?;
    let wiki = wiki_name(&config, runtime)?;
    let info = page_info(&database, &wiki, &args.identifier)?;

    if runtime.json {
        return print_json(&info);
    }
    println!("{}", info.render());
    Ok(())
}

fn run_delete(runtime: &RuntimeOptions, args: DeleteArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let database = config.database(runtime.database.as_deref())?;
    let wiki = wiki_name(&config, runtime)?;
    let report = delete_page(
        &database,
        &wiki,
        &args.identifier,
        &DeleteOptions {
            dry_run: args.dry_run,
        },
    )?;

    if runtime.json {
        return print_json(&report);
    }
    println!(
        "{} {} page(s) under \"{}\"",
        if report.dry_run { "would remove" } else { "removed" },
        report.removed_pages.len(),
        report.identifier
    );
    for identifier in &report.removed_pages {
        println!("  - {identifier}");
    }
    match (&report.unlinked_from_parent, report.removed_from_index) {
        (Some(parent), _) => println!("unlinked_from_parent: {parent}"),
        (None, true) => println!("removed_from_index: yes"),
        (None, false) => {}
    }
    println!("page_counter: {}", report.page_counter);
    Ok(())
}

fn run_check(runtime: &RuntimeOptions) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let database = config.database(runtime.database.as_deref())?;
    let report = check_database(&database)?;

    if runtime.json {
        print_json(&report)?;
    } else {
        println!("database: {}", report.database);
        println!("page_counter: {}", report.page_counter);
        println!("wikis: {}", report.wikis);
        println!("records_checked: {}", report.records_checked);
        println!("findings: {}", report.findings.len());
        for finding in &report.findings {
            println!("  - {}", serde_json::to_string(finding)?);
        }
    }

    if !report.is_clean() {
        bail!(
            "database \"{}\" has {} consistency finding(s)",
            report.database,
            report.findings.len()
        );
    }
    Ok(())
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<GlobalConfig> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let resolved = resolve_config_path(&context, runtime.config.as_deref())?;
    if runtime.diagnostics {
        eprintln!("[diagnostics]\n{}", resolved.diagnostics());
    }
    let config = load_config(&resolved.path)?;
    debug!(
        path = %normalize_path(&resolved.path),
        source = resolved.source.as_str(),
        databases = config.databases.len(),
        wikis = config.wikis.len(),
        "loaded config"
    );
    Ok(config)
}

fn selected_connections(
    config: &GlobalConfig,
    runtime: &RuntimeOptions,
) -> Result<Vec<wikidb_core::DatabaseConnection>> {
    match runtime.database.as_deref() {
        Some(name) => Ok(vec![config.database(Some(name))?]),
        None => Ok(config.database_connections()),
    }
}

/// A `-W` name is used as given so wikis no longer configured stay reachable.
fn wiki_name(config: &GlobalConfig, runtime: &RuntimeOptions) -> Result<String> {
    match runtime.wiki.as_deref() {
        Some(name) => Ok(name.to_string()),
        None => Ok(config.wiki(None)?.name.clone()),
    }
}

fn parse_columns<C>(raw: &[String]) -> Result<Vec<C>>
where
    C: std::str::FromStr<Err = anyhow::Error>,
{
    raw.iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.parse::<C>())
        .collect()
}

fn read_content_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read content file {}", normalize_path(path)))
}

fn print_rows(runtime: &RuntimeOptions, rows: &[Row]) -> Result<()> {
    if runtime.json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("(nothing to list)");
    } else {
        print!("{}", render_rows(rows));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
