use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use riglib_browser::{filter_names, referenced_set, Library, MemoryHost, RigDraft};
use riglib_db::{
    AiSettings, FilterCategory, FilterSelection, LibraryPaths, PathReplacement, SortKey,
    StatusFilter,
};
use riglib_scanner::{Category, ScanSession};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let paths = match cli.library_dir {
        Some(dir) => LibraryPaths::in_dir(dir),
        None => LibraryPaths::default_location().context("failed to locate the rigs library")?,
    };
    let mut library = Library::open(paths, MemoryHost::new())
        .context("failed to open the rigs library")?;

    match cli.command {
        Commands::List(args) => list(&mut library, args),
        Commands::Search(args) => search(&library, args),
        Commands::Scan(args) => scan(&mut library, args),
        Commands::Add(args) => add(&mut library, args),
        Commands::Remove { name } => {
            library
                .remove_rig(&name)
                .with_context(|| format!("failed to remove '{name}'"))?;
            println!("Removed {name}");
            Ok(())
        }
        Commands::Blacklist(command) => blacklist(&mut library, command),
        Commands::Replace(command) => replace(&mut library, command),
        Commands::Ai(args) => ai(&mut library, args),
    }
}

#[derive(Parser)]
#[command(name = "riglib", author, version, about = "Catalog and search character rigs")]
struct Cli {
    /// Library directory holding the database, blacklist, settings and images.
    #[arg(long, global = true, value_name = "DIR")]
    library_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every rig in grid order.
    List(ListArgs),
    /// Filter rigs by name and metadata.
    Search(SearchArgs),
    /// Scan a folder for rig files and classify them against the library.
    Scan(ScanArgs),
    /// Add a single rig file.
    Add(AddArgs),
    /// Remove a rig from the library.
    Remove { name: String },
    /// Manage paths excluded from scans and the grid.
    #[command(subcommand)]
    Blacklist(BlacklistCommand),
    /// Manage path replacement rules.
    #[command(subcommand)]
    Replace(ReplaceCommand),
    /// Show or change the category suggestion provider.
    Ai(AiArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Sort by name, collection or author. The choice is remembered.
    #[arg(long, value_parser = parse_sort_key)]
    sort: Option<SortKey>,
    #[arg(long, requires = "sort")]
    descending: bool,
    /// Print the display records as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Search text, e.g. `tag:human apo`.
    query: Vec<String>,
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,
    #[arg(long = "collection", value_name = "NAME")]
    collections: Vec<String>,
    #[arg(long = "author", value_name = "NAME")]
    authors: Vec<String>,
    /// Only rigs whose file exists.
    #[arg(long)]
    available: bool,
    /// Only rigs referenced in the scene.
    #[arg(long)]
    referenced: bool,
}

#[derive(Args)]
struct ScanArgs {
    dir: PathBuf,
    /// Add every new file, named after its file stem.
    #[arg(long)]
    add_new: bool,
    /// Print discoveries as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AddArgs {
    path: String,
    /// Rig name, defaults to the file stem.
    #[arg(long)]
    name: Option<String>,
    /// Comma-separated tags.
    #[arg(long, default_value = "")]
    tags: String,
    #[arg(long, default_value = "")]
    collection: String,
    #[arg(long, default_value = "")]
    author: String,
    #[arg(long, default_value = "")]
    link: String,
}

#[derive(Args)]
struct AiArgs {
    /// gemini, openai or anthropic.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum BlacklistCommand {
    Add { paths: Vec<String> },
    Remove { paths: Vec<String> },
    List,
}

#[derive(Subcommand)]
enum ReplaceCommand {
    /// Append a rule replacing the first occurrence of FIND.
    Add { find: String, replace: String },
    Clear,
    List,
}

fn parse_sort_key(value: &str) -> Result<SortKey, String> {
    value.parse()
}

fn list(library: &mut Library<MemoryHost>, args: ListArgs) -> Result<()> {
    if args.json {
        let display = library.store().display();
        println!("{}", serde_json::to_string_pretty(&*display)?);
        return Ok(());
    }
    if let Some(key) = args.sort {
        library.set_sort(key, !args.descending)?;
    }
    for (name, card) in library.grid().iter() {
        println!("{:<8} {name:<32} {}", card.state.label(), card.record.path);
    }
    Ok(())
}

fn search(library: &Library<MemoryHost>, args: SearchArgs) -> Result<()> {
    let mut selection = FilterSelection::default();
    for tag in &args.tags {
        selection.select(FilterCategory::Tags, tag);
    }
    for collection in &args.collections {
        selection.select(FilterCategory::Collections, collection);
    }
    for author in &args.authors {
        selection.select(FilterCategory::Author, author);
    }
    if args.available {
        selection.select(FilterCategory::Status, StatusFilter::OnlyAvailable.label());
    }
    if args.referenced {
        selection.select(FilterCategory::Status, StatusFilter::OnlyReferenced.label());
    }
    let display = library.store().display();
    let referenced = referenced_set(library.host());
    let names = filter_names(&display, &args.query.join(" "), &selection, &referenced);
    for name in names {
        if !library.blacklist().contains(&display[&name].path) {
            println!("{name}");
        }
    }
    Ok(())
}

fn scan(library: &mut Library<MemoryHost>, args: ScanArgs) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("{} is not a directory", args.dir.display());
    }
    let handle = library
        .start_scan(&args.dir)
        .with_context(|| format!("failed to scan {}", args.dir.display()))?;
    let mut session = ScanSession::new();
    let (discoveries, summary) = handle.wait();
    for discovery in discoveries {
        session.push(discovery);
    }
    tracing::info!(
        new = summary.new,
        existing = summary.existing,
        blacklisted = summary.blacklisted,
        "scan of {} finished",
        args.dir.display()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(session.discoveries())?);
    } else {
        for discovery in session.discoveries() {
            match &discovery.category {
                Category::Exists { name } => println!("exists       {} ({name})", discovery.path),
                other => println!("{:<12} {}", other.label(), discovery.path),
            }
        }
        println!(
            "{} new, {} existing, {} blacklisted",
            summary.new, summary.existing, summary.blacklisted
        );
    }

    if args.add_new {
        let mut added = 0;
        for path in session.new_paths() {
            match library.add_rig(RigDraft::from_path(&path)) {
                Ok(_) => added += 1,
                Err(err) => tracing::warn!("skipping {path}: {err}"),
            }
        }
        let changed = session.recategorize(&library.scan_lookup());
        println!("Added {added} rigs ({} discoveries now known)", changed.len());
    }
    Ok(())
}

fn add(library: &mut Library<MemoryHost>, args: AddArgs) -> Result<()> {
    if let Some(owner) = library.check_new_path(&args.path) {
        bail!("{} is already in the library as '{owner}'", args.path);
    }
    let mut draft = RigDraft::from_path(&args.path);
    if let Some(name) = args.name {
        draft.name = name;
    }
    draft.tags = args.tags;
    draft.collection = args.collection;
    draft.author = args.author;
    draft.link = args.link;
    let name = library.add_rig(draft).context("failed to add rig")?;
    println!("Added {name}");
    Ok(())
}

fn blacklist(library: &mut Library<MemoryHost>, command: BlacklistCommand) -> Result<()> {
    match command {
        BlacklistCommand::Add { paths } => {
            let added = library.blacklist_paths(&paths)?;
            println!("Blacklisted {added} paths");
        }
        BlacklistCommand::Remove { paths } => {
            let removed = library.unblacklist_paths(&paths)?;
            println!("Removed {removed} paths from the blacklist");
        }
        BlacklistCommand::List => {
            for path in library.blacklist().iter() {
                println!("{path}");
            }
        }
    }
    Ok(())
}

fn replace(library: &mut Library<MemoryHost>, command: ReplaceCommand) -> Result<()> {
    match command {
        ReplaceCommand::Add { find, replace } => {
            let mut rules = library.settings().path_replacements.clone();
            rules.push(PathReplacement::new(find, replace));
            library.set_path_replacements(rules)?;
        }
        ReplaceCommand::Clear => library.set_path_replacements(Vec::new())?,
        ReplaceCommand::List => {
            for rule in &library.settings().path_replacements {
                println!("{} -> {}", rule.find, rule.replace);
            }
        }
    }
    Ok(())
}

fn ai(library: &mut Library<MemoryHost>, args: AiArgs) -> Result<()> {
    if args.provider.is_some() || args.model.is_some() || args.api_key.is_some() {
        let current = library.ai_settings().clone();
        let settings = AiSettings {
            provider: args.provider.unwrap_or(current.provider),
            model: args.model.or(current.model),
            api_key: args.api_key.or(current.api_key),
        };
        library
            .set_ai_settings(settings)
            .context("failed to update AI settings")?;
    }
    let settings = library.ai_settings();
    println!("provider {}", settings.provider);
    println!("model    {}", settings.model.as_deref().unwrap_or("(default)"));
    println!(
        "api key  {}",
        if settings.api_key.is_some() { "set" } else { "not set" }
    );
    Ok(())
}
