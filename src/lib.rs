//! # Tailor catalog builder
//!
//! Turns a spreadsheet of textile samples and a folder of camera photos into
//! the artifacts of the sample catalog:
//!
//! - `anteprime_excel.xlsx`: one row per sample with its thumbnail in column A
//! - `crops/<name>_dettaglio.jpg`: a detail crop of every photo
//! - `import_campioni_<k>di<n>.csv`: the site import, at most 60 rows per file
//!
//! The table may be `.xlsx`, `.xlsm`, `.xls` or `.ods`. Its headers only need to
//! resemble the required field names; see [`schema::reconcile`].
//!
//! ```no_run
//! use tailor_catalog::{LogListener, Pipeline, PipelineConfig, RunInputs};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default(), LogListener);
//! let result = pipeline.run(&RunInputs::new("campioni.xlsx", "foto", "catalogo"));
//! println!("{} records written", result.processed_rows);
//! ```
pub mod cleaner;
pub mod config;
pub mod emitter;
pub mod error;
pub mod filename;
mod helpers;
pub mod imaging;
pub mod inputs;
pub mod pipeline;
pub mod schema;
mod spreadsheet;
pub mod table;

pub use config::PipelineConfig;
pub use error::CatalogError;
pub use pipeline::LogListener;
pub use pipeline::NullListener;
pub use pipeline::Pipeline;
pub use pipeline::PipelineEvent;
pub use pipeline::PipelineState;
pub use pipeline::ProgressListener;
pub use pipeline::RunInputs;
pub use pipeline::RunResult;
pub use spreadsheet::SpreadsheetError;
pub use spreadsheet::SUPPORTED_EXTENSIONS;
pub use table::Table;
pub use table::Value;
