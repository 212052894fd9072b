use std::path::PathBuf;

use crate::domain::{AnalysisLevel, ParticipantLabel};
use crate::error::VolumeCounterError;

/// Fully resolved invocation of the app.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub bids_dir: PathBuf,
    pub output_dir: PathBuf,
    pub analysis_level: AnalysisLevel,
    pub participant_labels: Vec<ParticipantLabel>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Checks the input directory before anything else, then normalizes
    /// participant labels (`sub-01` and `01` are the same participant);
    /// duplicates are dropped, first occurrence wins.
    pub fn resolve(
        bids_dir: PathBuf,
        output_dir: PathBuf,
        analysis_level: AnalysisLevel,
        participant_labels: &[String],
    ) -> Result<RunConfig, VolumeCounterError> {
        ensure_input_dir(&bids_dir)?;

        let mut labels: Vec<ParticipantLabel> = Vec::with_capacity(participant_labels.len());
        for raw in participant_labels {
            let label: ParticipantLabel = raw.parse()?;
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        Ok(RunConfig {
            bids_dir,
            output_dir,
            analysis_level,
            participant_labels: labels,
        })
    }
}

pub fn ensure_input_dir(bids_dir: &std::path::Path) -> Result<(), VolumeCounterError> {
    if !bids_dir.is_dir() {
        return Err(VolumeCounterError::MissingInputDir(bids_dir.to_path_buf()));
    }
    Ok(())
}
