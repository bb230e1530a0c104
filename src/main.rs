//! Command-line front end.
//!
//! ```bash
//! tailor-catalog campioni.xlsx foto/ catalogo/
//! tailor-catalog --dump-config > catalog.json
//! tailor-catalog --config catalog.json --sheet 'Campioni*' --range A3: campioni.xls foto/ catalogo/
//! ```
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use env_logger::Target;
use log::info;
use std::path::PathBuf;
use tailor_catalog::inputs::analyze_image_folder;
use tailor_catalog::inputs::describe_table;
use tailor_catalog::LogListener;
use tailor_catalog::Pipeline;
use tailor_catalog::PipelineConfig;
use tailor_catalog::RunInputs;

/// Build the sample catalog from a spreadsheet and a folder of photos
#[derive(Parser, Debug)]
#[command(name = "tailor-catalog")]
#[command(version, about, long_about = None)]
struct Args {
    /// Spreadsheet with one sample per row (.xlsx, .xlsm, .xls, .ods)
    #[arg(required_unless_present = "dump_config")]
    table: Option<PathBuf>,

    /// Folder holding the sample photos
    #[arg(required_unless_present = "dump_config")]
    images: Option<PathBuf>,

    /// Output directory, created if missing
    #[arg(required_unless_present = "dump_config")]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Glob selecting the sheet to read
    #[arg(long)]
    sheet: Option<String>,

    /// Data range whose first row is the header, e.g. A3:
    #[arg(long)]
    range: Option<String>,

    /// Fail when two fields match the same column
    #[arg(long)]
    strict_columns: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).target(Target::Stderr).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path).with_context(|| format!("Cannot load {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.sheet.is_some() {
        config.table.sheet = args.sheet.clone();
    }
    if args.range.is_some() {
        config.table.range = args.range.clone();
    }
    config.schema.strict_columns |= args.strict_columns;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let (Some(table), Some(images), Some(output)) = (args.table, args.images, args.output) else {
        bail!("TABLE, IMAGES and OUTPUT are required");
    };
    let summary = describe_table(&table, &config.table)?;
    info!("{}: {} rows, {} columns", table.display(), summary.rows, summary.column_names.len());
    let folder = analyze_image_folder(&images)?;
    let types: Vec<String> = folder.image_types.iter().map(|(extension, count)| format!("{extension}: {count}")).collect();
    info!("{}: {} images ({})", images.display(), folder.total_images, types.join(", "));

    let mut pipeline = Pipeline::new(config, LogListener);
    let result = pipeline.run(&RunInputs::new(table, images, &output));
    for failure in &result.failures {
        info!("Skipped row {} ({}): {}", failure.row + 1, failure.key, failure.reason);
    }
    if !result.success {
        bail!(result.error_detail.unwrap_or_else(|| "Catalog build failed".to_owned()));
    }
    info!(
        "Done: {} of {} input rows written to {} ({} missing images)",
        result.processed_rows,
        result.total_rows,
        output.display(),
        result.missing_images
    );
    Ok(())
}
