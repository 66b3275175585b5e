//! Command line interface for validating projects and processing scenario data.
//!
//! # Usage
//!
//! ```bash
//! nomenclature validate-project path/to/project
//! nomenclature check-region-aggregation data.csv -w path/to/project \
//!   --processed-data processed.csv --differences differences.csv
//! nomenclature validate-data data.csv -w path/to/project --output processed.csv
//! nomenclature validate-yaml path/to/project/definitions
//! nomenclature list-missing-variables data.csv -w path/to/project --target-file new.yaml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nomenclature::{
    list_missing_variables, read_csv, validate_yaml, write_csv, Project, Tolerance, VariableCodeList,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Validation and region processing of IAMC-format scenario data
#[derive(Parser, Debug)]
#[command(name = "nomenclature")]
#[command(about = "Validate and process IAMC-format scenario data against codelist definitions")]
struct Args {
    /// Log level, overridden by `RUST_LOG` if set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the definitions, mappings and validation files of a project are valid
    ValidateProject {
        /// Project folder
        path: PathBuf,
    },
    /// Apply region processing and report where aggregated and reported data differ
    CheckRegionAggregation {
        /// IAMC-format CSV file
        input: PathBuf,

        /// Project folder with definitions and mappings
        #[arg(short, long)]
        workflow_directory: PathBuf,

        /// Write the processed data to this file
        #[arg(long)]
        processed_data: Option<PathBuf>,

        /// Write the difference report to this file
        #[arg(long)]
        differences: Option<PathBuf>,

        /// Relative tolerance, defaults to the project configuration
        #[arg(long)]
        rtol: Option<f64>,
    },
    /// Validate and process a file with all processors of a project
    ValidateData {
        /// IAMC-format CSV file
        input: PathBuf,

        /// Project folder with definitions, mappings and validation files
        #[arg(short, long)]
        workflow_directory: PathBuf,

        /// Write the processed data to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that all YAML files below a path parse and contain no illegal characters
    ValidateYaml {
        path: PathBuf,
    },
    /// List the variables of a file that are not in the variable codelist of a project
    ListMissingVariables {
        /// IAMC-format CSV file
        data: PathBuf,

        /// Project folder with the variable codelist
        #[arg(short, long, default_value = ".")]
        workflow_directory: PathBuf,

        /// Write the missing variables to this file in the variable definitions folder
        #[arg(long)]
        target_file: Option<String>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_project(path: &Path) -> Result<Project> {
    Project::load(path).with_context(|| format!("Invalid project {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::ValidateProject { path } => {
            let project = load_project(&path)?;
            project.validate()?;
            info!(
                path = %path.display(),
                processors = project.processors().len(),
                "Project is valid"
            );
        }
        Command::CheckRegionAggregation {
            input,
            workflow_directory,
            processed_data,
            differences,
            rtol,
        } => {
            let mut project = load_project(&workflow_directory)?;
            if let Some(rtol) = rtol {
                let atol = project.config.region_processing.atol;
                project = project.with_tolerance(Tolerance::new(rtol, atol));
            }
            let processor = project.region_processor.as_ref().with_context(|| {
                format!(
                    "No region mappings found in {}",
                    project.config.mappings_dir(&workflow_directory).display()
                )
            })?;

            let df = read_csv(&input)?;
            let (processed, report) = processor.check_region_aggregation(&df)?;
            if let Some(path) = processed_data {
                write_csv(&processed, &path)?;
                info!(path = %path.display(), "Wrote processed data");
            }
            if let Some(path) = differences {
                report.write_csv(&path)?;
                info!(path = %path.display(), rows = report.len(), "Wrote difference report");
            } else if !report.is_empty() {
                warn!(rows = report.len(), "Differences found, use --differences to export them");
            }
        }
        Command::ValidateData {
            input,
            workflow_directory,
            output,
        } => {
            let project = load_project(&workflow_directory)?;
            let df = read_csv(&input)?;
            let processed = project
                .process(&df)
                .with_context(|| format!("Validation of {} failed", input.display()))?;
            info!(datapoints = processed.len(), "Data is valid");
            if let Some(path) = output {
                write_csv(&processed, &path)?;
            }
        }
        Command::ValidateYaml { path } => {
            let files = validate_yaml(&path)?;
            info!(path = %path.display(), files, "All YAML files are valid");
        }
        Command::ListMissingVariables {
            data,
            workflow_directory,
            target_file,
        } => {
            let df = read_csv(&data)?;
            let missing =
                list_missing_variables(&workflow_directory, &df, target_file.as_deref())?;
            if target_file.is_none() && !missing.is_empty() {
                print!("{}", VariableCodeList::to_yaml(&missing)?);
            }
        }
    }
    Ok(())
}
