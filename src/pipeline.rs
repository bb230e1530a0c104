//! Runs one catalog build: validate, reconcile, clean, process images, emit.
use crate::cleaner::clean;
use crate::cleaner::key_of;
use crate::cleaner::RemovalStats;
use crate::config::PipelineConfig;
use crate::emitter::emit;
use crate::error::CatalogError;
use crate::imaging::ImageIndex;
use crate::imaging::ImageProcessor;
use crate::imaging::RecordOutcome;
use crate::inputs::analyze_image_folder;
use crate::inputs::check_output_dir;
use crate::inputs::check_table_file;
use crate::schema::reconcile_with;
use crate::schema::KEY_FIELD;
use crate::schema::REQUIRED_FIELDS;
use crate::table::Table;
use log::debug;
use log::info;
use log::warn;
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Validating,
    Reconciling,
    Cleaning,
    Processing { current: usize, total: usize },
    Emitting,
    Done,
    Failed(String),
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Validating => f.write_str("validating inputs"),
            PipelineState::Reconciling => f.write_str("matching columns"),
            PipelineState::Cleaning => f.write_str("cleaning records"),
            PipelineState::Processing { current, total } => write!(f, "processing images ({current}/{total})"),
            PipelineState::Emitting => f.write_str("writing outputs"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Progress { current: usize, total: usize },
    Status(String),
}

/// Receives progress after every processed record and status messages at
/// phase changes and on recoverable record errors.
pub trait ProgressListener {
    fn on_progress(&self, current: usize, total: usize);

    fn on_status(&self, message: &str);
}

/// Forwards events over a channel; a dropped receiver is ignored.
impl ProgressListener for Sender<PipelineEvent> {
    fn on_progress(&self, current: usize, total: usize) {
        let _ = self.send(PipelineEvent::Progress { current, total });
    }

    fn on_status(&self, message: &str) {
        let _ = self.send(PipelineEvent::Status(message.to_owned()));
    }
}

/// Writes events to the log.
pub struct LogListener;

impl ProgressListener for LogListener {
    fn on_progress(&self, current: usize, total: usize) {
        debug!("Processed {current}/{total}");
    }

    fn on_status(&self, message: &str) {
        info!("{message}");
    }
}

pub struct NullListener;

impl ProgressListener for NullListener {
    fn on_progress(&self, _current: usize, _total: usize) {}

    fn on_status(&self, _message: &str) {}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunInputs {
    pub table: PathBuf,
    pub images: PathBuf,
    pub output: PathBuf,
}

impl RunInputs {
    pub fn new(table: impl Into<PathBuf>, images: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        RunInputs { table: table.into(), images: images.into(), output: output.into() }
    }
}

/// A record left out of the outputs, with the reason.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecordFailure {
    pub row: usize,
    pub key: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// All three artifacts were written.
    pub success: bool,
    pub excel_success: bool,
    pub crops_success: bool,
    pub csv_success: bool,
    /// Records that reached the outputs.
    pub processed_rows: usize,
    pub missing_images: usize,
    pub load_errors: usize,
    /// Data rows read from the table, before cleaning.
    pub total_rows: usize,
    pub error_detail: Option<String>,
    pub removal: RemovalStats,
    pub failures: Vec<RecordFailure>,
    pub workbook: Option<PathBuf>,
    pub csv_files: Vec<PathBuf>,
}

impl RunResult {
    fn failed(reason: String) -> Self {
        RunResult { error_detail: Some(reason), ..RunResult::default() }
    }
}

pub struct Pipeline<L: ProgressListener> {
    config: PipelineConfig,
    listener: L,
    state: PipelineState,
}

impl<L: ProgressListener> Pipeline<L> {
    /// A pipeline in the `Idle` state, reporting to `listener`.
    pub fn new(config: PipelineConfig, listener: L) -> Self {
        Pipeline { config, listener, state: PipelineState::Idle }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn enter(&mut self, state: PipelineState) {
        if !matches!(state, PipelineState::Processing { .. }) {
            self.listener.on_status(&format!("Catalog build: {state}"));
        }
        self.state = state;
    }

    fn fail(&mut self, cause: CatalogError) -> RunResult {
        let reason = cause.to_string();
        self.enter(PipelineState::Failed(reason.clone()));
        RunResult::failed(reason)
    }

    /// Builds the catalog from one table and one image folder
    ///
    /// Runs validation, reading, reconciliation, cleaning, image processing and
    /// emission in that order, moving through the matching [`PipelineState`]s.
    /// Progress is reported after every cleaned record.
    ///
    /// # Arguments
    /// * `inputs` - Table file, image folder and output directory
    ///
    /// # Returns
    /// The run summary. Validation and schema errors end the run in `Failed`
    /// before anything is written, as does a directory that cannot be created.
    /// Per-record image problems never do: they are counted and listed in
    /// `failures`.
    pub fn run(&mut self, inputs: &RunInputs) -> RunResult {
        self.enter(PipelineState::Validating);
        let index = match self.validate(inputs) {
            Ok(index) => index,
            Err(cause) => return self.fail(cause),
        };
        let table = match Table::read(&inputs.table, &self.config.table) {
            Ok(table) => table,
            Err(cause) => return self.fail(cause),
        };

        self.enter(PipelineState::Reconciling);
        let mapping = match reconcile_with(table.columns(), &REQUIRED_FIELDS, &self.config.schema) {
            Ok(mapping) => mapping,
            Err(cause) => return self.fail(cause.into()),
        };

        self.enter(PipelineState::Cleaning);
        let (cleaned, removal) = match clean(&table, &mapping) {
            Ok(cleaned) => cleaned,
            Err(cause) => return self.fail(cause.into()),
        };
        info!(
            "{} of {} rows kept ({} without {}, {} duplicates)",
            removal.rows_after, removal.rows_before, removal.missing_key_removed, KEY_FIELD, removal.duplicate_removed
        );

        let output = self.config.output.clone();
        let thumbnails_dir = inputs.output.join(&output.thumbnails_dir);
        let crops_dir = inputs.output.join(&output.crops_dir);
        for dir in [&inputs.output, &thumbnails_dir, &crops_dir] {
            if let Err(cause) = std::fs::create_dir_all(dir) {
                return self.fail(CatalogError::WithContextError(format!("Cannot create '{}': {}", dir.display(), cause)));
            }
        }
        let processor = ImageProcessor::new(index, &thumbnails_dir, &crops_dir, &self.config.thumbnail, &self.config.crop);

        // Unmapped key was ruled out by `clean`.
        let key_index = mapping.index_of(KEY_FIELD).unwrap_or_default();
        let total = cleaned.len();
        let mut resolved = Vec::new();
        let mut result = RunResult { total_rows: removal.rows_before, removal, crops_success: true, ..RunResult::default() };
        self.enter(PipelineState::Processing { current: 0, total });
        for (row, record) in cleaned.rows().iter().enumerate() {
            let outcome = processor.resolve(row, &key_of(record.get(key_index)));
            match &outcome {
                RecordOutcome::Resolved(image) => resolved.push(image.clone()),
                RecordOutcome::Missing { .. } => result.missing_images += 1,
                RecordOutcome::LoadError { .. } => result.load_errors += 1,
                RecordOutcome::WriteError { .. } => result.crops_success = false,
            }
            if let Some(reason) = outcome.reason() {
                warn!("Row {} ({}): {}", row + 1, outcome.key(), reason);
                self.listener.on_status(&format!("{}: {}", outcome.key(), reason));
                result.failures.push(RecordFailure { row, key: outcome.key().to_owned(), reason });
            }
            self.state = PipelineState::Processing { current: row + 1, total };
            self.listener.on_progress(row + 1, total);
        }
        result.processed_rows = resolved.len();

        self.enter(PipelineState::Emitting);
        let emitted = emit(&cleaned, &resolved, &mapping, &inputs.output, &output);
        result.excel_success = emitted.excel_success;
        result.csv_success = emitted.csv_success;
        result.workbook = emitted.excel_success.then_some(emitted.workbook_path);
        result.csv_files = emitted.csv_files;
        result.success = result.excel_success && result.crops_success && result.csv_success;
        result.error_detail = emitted.errors.into_iter().next().or_else(|| {
            (!result.crops_success).then(|| "Some detail crops could not be written".to_owned())
        });

        self.enter(PipelineState::Done);
        self.listener.on_status(&format!(
            "{} of {} input rows written, {} images missing",
            result.processed_rows, result.total_rows, result.missing_images
        ));
        result
    }

    fn validate(&self, inputs: &RunInputs) -> Result<ImageIndex, CatalogError> {
        check_table_file(&inputs.table)?;
        analyze_image_folder(&inputs.images)?;
        check_output_dir(&inputs.output)?;
        ImageIndex::scan(&inputs.images)
    }
}
