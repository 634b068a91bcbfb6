//! cohortprep CLI - transform clinical cohort spreadsheets
//!
//! # Main Commands
//!
//! ```bash
//! cohortprep transform data.csv --config config.json   # Run the full pipeline
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! cohortprep parse data.csv          # Just parse CSV to JSON
//! cohortprep check-config config.json # Validate a configuration document
//! cohortprep example-config          # Show an example configuration
//! ```

use clap::{Parser, Subcommand};
use cohortprep::{
    example_config, parse_file_auto, transform_file, JsonExport, MetadataLookup, PipelineConfig,
    ReportSink,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cohortprep")]
#[command(about = "Config-driven cleansing, imputation and derivation for cohort spreadsheets", long_about = None)]
struct Cli {
    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output the loaded dataset as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full transformation pipeline: aggregate → standardize → impute → derive
    Transform {
        /// Input CSV file
        input: PathBuf,

        /// Configuration document
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for the transformed rows (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the label metadata (column code → label maps)
        #[arg(long)]
        labels: Option<PathBuf>,
    },

    /// Validate a configuration document without touching any data
    CheckConfig {
        /// Configuration document
        input: PathBuf,
    },

    /// Show an example configuration covering every rule kind
    ExampleConfig,
}

fn main() {
    let cli = Cli::parse();
    cohortprep::logging::LOGGER.set_quiet(cli.quiet);

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Transform { input, config, output, labels } => {
            cmd_transform(&input, &config, output.as_deref(), labels.as_deref())
        }

        Commands::CheckConfig { input } => cmd_check_config(&input),

        Commands::ExampleConfig => cmd_example_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Parsing: {}", input.display());

    let result = parse_file_auto(input)?;
    eprintln!("  Encoding: {}", result.encoding);
    eprintln!(
        "  Delimiter: '{}'",
        match result.delimiter {
            '\t' => "\\t".to_string(),
            c => c.to_string(),
        }
    );
    eprintln!("  Columns: {}", result.dataset.columns.join(", "));
    eprintln!("Parsed {} rows", result.dataset.len());

    let json = serde_json::to_string_pretty(&result.dataset.rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_transform(
    input: &Path,
    config_path: &Path,
    output: Option<&Path>,
    labels_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Processing: {}", input.display());

    let config = PipelineConfig::from_file(config_path)?;
    let outcome = transform_file(input, &config)?;

    eprintln!(
        "Transformed {} subjects, {} columns",
        outcome.dataset.len(),
        outcome.dataset.columns.len()
    );

    let metadata = MetadataLookup::from_run(&outcome.descriptions, &outcome.labels);

    match output {
        Some(path) => {
            JsonExport::new(path).consume(&outcome.dataset, &metadata)?;
            eprintln!("Output written to: {}", path.display());
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&outcome.dataset.rows)?);
        }
    }

    if let Some(path) = labels_path {
        let json = serde_json::to_string_pretty(&outcome.labels)?;
        fs::write(path, json)?;
        eprintln!("Labels written to: {}", path.display());
    }

    Ok(())
}

fn cmd_check_config(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Checking: {}", input.display());

    let config = PipelineConfig::from_file(input)?;
    let derived = config.data.data_derivation.columns.len();
    eprintln!("  Identifier column: {}", config.data.data_cleansing.id_column);
    eprintln!("  Aggregation rules: {}", config.data.data_cleansing.aggregate.len());
    eprintln!("  Fitting rules: {}", config.data.data_fitting.len());
    eprintln!("  Derivation rules: {}", derived);
    eprintln!("Configuration is valid");

    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    let config = example_config();
    println!("{}", config.to_json()?);
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
