use std::path::Path;

use serde::Serialize;

use crate::config::{RunConfig, ensure_input_dir};
use crate::derivatives::DerivativesLayout;
use crate::discover::find_t1w_images;
use crate::domain::{AnalysisLevel, Entities, ImageRecord, ParticipantLabel};
use crate::error::VolumeCounterError;
use crate::volume::{VolumeReader, count_volumes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
}

/// Receives pipeline log events; the pipeline never logs globally.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub analysis_level: AnalysisLevel,
    pub dataset_description: String,
    pub runs: Vec<ParticipantRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants_table_found: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRun {
    pub participant: Option<String>,
    pub records: usize,
    pub written: Vec<String>,
}

#[derive(Clone)]
pub struct App<R: VolumeReader> {
    reader: R,
}

impl<R: VolumeReader> App<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Runs one invocation: precondition check, shared setup, then the
    /// requested analysis level.
    pub fn run(
        &self,
        config: &RunConfig,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, VolumeCounterError> {
        ensure_input_dir(&config.bids_dir)?;

        let layout = DerivativesLayout::new(&config.output_dir)?;
        let description = layout.write_dataset_description(env!("CARGO_PKG_VERSION"))?;

        let mut summary = RunSummary {
            analysis_level: config.analysis_level,
            dataset_description: description.to_string(),
            runs: Vec::new(),
            participants_table_found: None,
        };

        match config.analysis_level {
            AnalysisLevel::Participant => {
                summary.runs =
                    self.run_participant(&config.bids_dir, &layout, &config.participant_labels, sink)?;
            }
            AnalysisLevel::Group => {
                summary.participants_table_found = Some(self.run_group(&layout, sink));
            }
        }

        sink.event(ProgressEvent {
            level: EventLevel::Info,
            message: "Processing complete!".to_string(),
        });
        Ok(summary)
    }

    /// Processes each label independently, or every subject when `labels`
    /// is empty. Each run that yields records rewrites the group summary.
    pub fn run_participant(
        &self,
        bids_dir: &Path,
        layout: &DerivativesLayout,
        labels: &[ParticipantLabel],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ParticipantRun>, VolumeCounterError> {
        if labels.is_empty() {
            sink.event(ProgressEvent {
                level: EventLevel::Info,
                message: "Processing all participants".to_string(),
            });
            return Ok(vec![self.run_single(bids_dir, layout, None, sink)?]);
        }

        let mut runs = Vec::with_capacity(labels.len());
        for label in labels {
            sink.event(ProgressEvent {
                level: EventLevel::Info,
                message: format!("Processing participant: {}", label.subject_token()),
            });
            runs.push(self.run_single(bids_dir, layout, Some(label), sink)?);
        }
        Ok(runs)
    }

    /// Only checks that a participant-level summary exists.
    pub fn run_group(&self, layout: &DerivativesLayout, sink: &dyn ProgressSink) -> bool {
        sink.event(ProgressEvent {
            level: EventLevel::Info,
            message: "Group level analysis - ensuring summary files exist".to_string(),
        });
        let found = layout.has_participants_table();
        if !found {
            sink.event(ProgressEvent {
                level: EventLevel::Warn,
                message: "No participant-level results found. Run participant level first."
                    .to_string(),
            });
        }
        found
    }

    /// Discovers, filters and counts T1w images into records, skipping
    /// files whose volume count is unknown.
    pub fn process_dataset(
        &self,
        bids_dir: &Path,
        label: Option<&ParticipantLabel>,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<ImageRecord>, VolumeCounterError> {
        let mut files = find_t1w_images(bids_dir, sink)?;
        sink.event(ProgressEvent {
            level: EventLevel::Info,
            message: format!("Found {} T1w images", files.len()),
        });

        if let Some(label) = label {
            let token = label.subject_token();
            files.retain(|path| belongs_to_subject(bids_dir, path, &token));
            sink.event(ProgressEvent {
                level: EventLevel::Info,
                message: format!(
                    "Processing {} T1w images for participant {token}",
                    files.len()
                ),
            });
        }

        let mut records = Vec::new();
        for path in &files {
            sink.event(ProgressEvent {
                level: EventLevel::Debug,
                message: format!("Processing {}", path.display()),
            });

            let Some(n_volumes) = count_volumes(&self.reader, path, sink) else {
                continue;
            };
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entities = Entities::from_filename(&filename);
            sink.event(ProgressEvent {
                level: EventLevel::Info,
                message: format!("{filename}: {n_volumes} volumes"),
            });
            records.push(ImageRecord::from_entities(&entities, filename, n_volumes));
        }

        Ok(records)
    }

    fn run_single(
        &self,
        bids_dir: &Path,
        layout: &DerivativesLayout,
        label: Option<&ParticipantLabel>,
        sink: &dyn ProgressSink,
    ) -> Result<ParticipantRun, VolumeCounterError> {
        let records = self.process_dataset(bids_dir, label, sink)?;
        let written = if records.is_empty() {
            sink.event(ProgressEvent {
                level: EventLevel::Info,
                message: "No volume counts to summarize".to_string(),
            });
            Vec::new()
        } else {
            layout
                .write_results(&records)?
                .into_iter()
                .map(|path| path.to_string())
                .collect()
        };

        Ok(ParticipantRun {
            participant: label.map(ParticipantLabel::subject_token),
            records: records.len(),
            written,
        })
    }
}

/// True when a component of `path` below `bids_dir` equals `token`.
fn belongs_to_subject(bids_dir: &Path, path: &Path, token: &str) -> bool {
    let relative = path.strip_prefix(bids_dir).unwrap_or(path);
    relative
        .components()
        .any(|component| component.as_os_str() == token)
}
