use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use rnaseq_registry::error::RegistryError;
use rnaseq_registry::output::JsonOutput;
use rnaseq_registry::registry::{DatasetFilter, DatasetLoadOptions, Registry};
use rnaseq_registry::store::Store;

#[derive(Parser)]
#[command(name = "rnaseq-reg")]
#[command(about = "Registry of RNA-Seq experiments for downstream processing pipelines")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a registry database")]
    Create(CreateArgs),
    #[command(about = "Manage components")]
    Component(ComponentArgs),
    #[command(about = "Manage organisms")]
    Organism(OrganismArgs),
    #[command(about = "Manage datasets")]
    Dataset(DatasetArgs),
}

#[derive(Args)]
struct CreateArgs {
    /// Path to the registry database file
    database: Utf8PathBuf,

    /// Replace the database if it already exists
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ComponentArgs {
    database: Utf8PathBuf,

    /// Name of a component to add
    #[arg(long)]
    add: Option<String>,

    /// Name of a component to show
    #[arg(long)]
    get: Option<String>,

    /// Name of a component to remove
    #[arg(long)]
    remove: Option<String>,

    /// Print the list of components
    #[arg(long)]
    list: bool,
}

#[derive(Args)]
struct OrganismArgs {
    database: Utf8PathBuf,

    /// Name of a component (required with --add, optional filter with --list)
    #[arg(long)]
    component: Option<String>,

    /// Abbreviation of an organism to add
    #[arg(long)]
    add: Option<String>,

    /// Abbreviation of an organism to show
    #[arg(long)]
    get: Option<String>,

    /// Abbreviation of an organism to remove
    #[arg(long)]
    remove: Option<String>,

    /// Print the list of organisms
    #[arg(long)]
    list: bool,

    /// Restrict --list to organisms owning at least one dataset
    #[arg(long)]
    with_datasets: bool,

    /// Load organisms from a tab file (component\torganism_abbrev)
    #[arg(long)]
    load: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct DatasetArgs {
    database: Utf8PathBuf,

    /// Load datasets from a JSON document
    #[arg(long)]
    load: Option<Utf8PathBuf>,

    /// Release marker for --load, --retire and --remap-from, and release
    /// filter for --list and --dump
    #[arg(long)]
    release: Option<i64>,

    /// Retire conflicting datasets and auto-create organisms during --load
    #[arg(long)]
    replace: bool,

    /// Load the accepted subset even if some records were skipped
    #[arg(long)]
    ignore: bool,

    /// Organism abbreviation (selector for --get/--retire/--remove, filter
    /// for --list/--dump)
    #[arg(long)]
    organism: Option<String>,

    /// Dataset name (selector for --get/--retire/--remove, filter for
    /// --list/--dump)
    #[arg(long)]
    name: Option<String>,

    /// Component name filter for --list/--dump
    #[arg(long)]
    component: Option<String>,

    /// Show one latest dataset (needs --organism and --name)
    #[arg(long)]
    get: bool,

    /// Retire one latest dataset (needs --organism and --name)
    #[arg(long)]
    retire: bool,

    /// Hard-delete one latest dataset (needs --organism and --name)
    #[arg(long)]
    remove: bool,

    /// Print the matching datasets
    #[arg(long)]
    list: bool,

    /// Include retired datasets in --list/--dump
    #[arg(long)]
    all: bool,

    /// Dump the matching datasets to one JSON file
    #[arg(long)]
    dump: Option<Utf8PathBuf>,

    /// Dump the matching datasets to a release/component directory tree
    #[arg(long)]
    dump_tree: Option<Utf8PathBuf>,

    /// Source organism for a remap
    #[arg(long)]
    remap_from: Option<String>,

    /// Destination organism for a remap
    #[arg(long)]
    remap_to: Option<String>,

    /// Retire the source datasets after a remap
    #[arg(long)]
    retire_source: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RegistryError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RegistryError) -> u8 {
    match error {
        RegistryError::ComponentNotFound(_)
        | RegistryError::OrganismNotFound(_)
        | RegistryError::DatasetNotFound { .. }
        | RegistryError::DatabaseNotFound(_) => 2,
        RegistryError::DuplicateComponent(_)
        | RegistryError::DuplicateOrganism(_)
        | RegistryError::DuplicateDataset { .. }
        | RegistryError::OrganismComponentMissing { .. } => 3,
        RegistryError::InvalidFormat { .. } | RegistryError::SchemaError { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Create(args) => run_create(args),
        Commands::Component(args) => run_component(args),
        Commands::Organism(args) => run_organism(args),
        Commands::Dataset(args) => run_dataset(args),
    }
}

fn run_create(args: CreateArgs) -> miette::Result<()> {
    let store = Store::new(args.database);
    let created = store.initialize(args.force).into_diagnostic()?;
    JsonOutput::print_json(&serde_json::json!({
        "database": store.path().as_str(),
        "created": created,
    }))
    .into_diagnostic()?;
    Ok(())
}

fn run_component(args: ComponentArgs) -> miette::Result<()> {
    let mut registry = Registry::open(Store::new(args.database)).into_diagnostic()?;

    if let Some(name) = args.add {
        let row = registry.add_component(&name).into_diagnostic()?;
        JsonOutput::print_json(&row).into_diagnostic()?;
    } else if let Some(name) = args.get {
        let row = registry.get_component(&name).into_diagnostic()?;
        JsonOutput::print_json(&row).into_diagnostic()?;
    } else if let Some(name) = args.remove {
        registry.remove_component(&name).into_diagnostic()?;
    } else if args.list {
        JsonOutput::print_components(&registry.list_components()).into_diagnostic()?;
    } else {
        miette::bail!("component needs one of --add, --get, --remove or --list");
    }
    Ok(())
}

fn run_organism(args: OrganismArgs) -> miette::Result<()> {
    let mut registry = Registry::open(Store::new(args.database)).into_diagnostic()?;

    if let Some(abbrev) = args.add {
        let Some(component) = args.component else {
            miette::bail!("--add needs a --component for the organism");
        };
        let entry = registry.add_organism(&abbrev, &component).into_diagnostic()?;
        JsonOutput::print_json(&entry).into_diagnostic()?;
    } else if let Some(abbrev) = args.get {
        let entry = registry.get_organism(&abbrev).into_diagnostic()?;
        JsonOutput::print_json(&entry).into_diagnostic()?;
    } else if let Some(abbrev) = args.remove {
        registry.remove_organism(&abbrev).into_diagnostic()?;
    } else if args.list {
        let entries = registry.list_organisms(args.component.as_deref(), args.with_datasets);
        JsonOutput::print_organisms(&entries).into_diagnostic()?;
    } else if let Some(path) = args.load {
        let report = registry.load_organisms(&path).into_diagnostic()?;
        JsonOutput::print_organism_load(&report).into_diagnostic()?;
    } else {
        miette::bail!("organism needs one of --add, --get, --remove, --list or --load");
    }
    Ok(())
}

fn run_dataset(args: DatasetArgs) -> miette::Result<()> {
    let mut registry = Registry::open(Store::new(args.database.clone())).into_diagnostic()?;

    let filter = DatasetFilter {
        component: args.component.clone(),
        organism: args.organism.clone(),
        name: args.name.clone(),
        release: args.release,
        latest: if args.all { None } else { Some(true) },
    };

    if let Some(path) = &args.load {
        let options = DatasetLoadOptions {
            release: args.release.unwrap_or(0),
            replace: args.replace,
            ignore: args.ignore,
        };
        let report = registry.load_datasets(path, &options).into_diagnostic()?;
        JsonOutput::print_dataset_load(&report).into_diagnostic()?;
    } else if args.get {
        let (organism, name) = selector(&args)?;
        let entry = registry.get_dataset(organism, name).into_diagnostic()?;
        JsonOutput::print_json(&entry).into_diagnostic()?;
    } else if args.retire {
        let (organism, name) = selector(&args)?;
        registry
            .retire_dataset(organism, name, args.release)
            .into_diagnostic()?;
    } else if args.remove {
        let (organism, name) = selector(&args)?;
        registry.remove_dataset(organism, name).into_diagnostic()?;
    } else if let (Some(from), Some(to)) = (&args.remap_from, &args.remap_to) {
        let report = registry
            .remap_datasets(from, to, args.release.unwrap_or(0), args.retire_source)
            .into_diagnostic()?;
        JsonOutput::print_remap(&report).into_diagnostic()?;
    } else if let Some(path) = args.dump {
        let entries = registry.list_datasets(&filter);
        registry.dump(&path, &entries).into_diagnostic()?;
    } else if let Some(root) = args.dump_tree {
        let entries = registry.list_datasets(&filter);
        let written = registry.dump_to_tree(&root, &entries).into_diagnostic()?;
        let written: Vec<String> = written.into_iter().map(|path| path.into_string()).collect();
        JsonOutput::print_json(&written).into_diagnostic()?;
    } else if args.list {
        JsonOutput::print_datasets(&registry.list_datasets(&filter)).into_diagnostic()?;
    } else {
        miette::bail!(
            "dataset needs one of --load, --get, --retire, --remove, --list, --dump, \
             --dump-tree or --remap-from/--remap-to"
        );
    }
    Ok(())
}

fn selector(args: &DatasetArgs) -> miette::Result<(&str, &str)> {
    match (args.organism.as_deref(), args.name.as_deref()) {
        (Some(organism), Some(name)) => Ok((organism, name)),
        _ => miette::bail!("this dataset action needs both --organism and --name"),
    }
}
