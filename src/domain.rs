use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::VolumeCounterError;

pub const SUBJECT_PREFIX: &str = "sub-";
pub const UNKNOWN_SUBJECT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisLevel {
    Participant,
    Group,
}

impl fmt::Display for AnalysisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisLevel::Participant => write!(f, "participant"),
            AnalysisLevel::Group => write!(f, "group"),
        }
    }
}

/// Participant label without the `sub-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantLabel(String);

impl ParticipantLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory and filename token for this participant, e.g. `sub-01`.
    pub fn subject_token(&self) -> String {
        format!("{SUBJECT_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ParticipantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParticipantLabel {
    type Err = VolumeCounterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let label = trimmed.strip_prefix(SUBJECT_PREFIX).unwrap_or(trimmed);
        if label.is_empty() {
            return Err(VolumeCounterError::InvalidParticipantLabel(
                value.to_string(),
            ));
        }
        Ok(Self(label.to_string()))
    }
}

/// Key/value pairs encoded in a BIDS filename, such as `sub-01` or `ses-02`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities(BTreeMap<String, String>);

impl Entities {
    /// Splits `sub-01_ses-02_run-1_T1w.nii.gz` into `{sub: 01, ses: 02, run: 1}`.
    ///
    /// The trailing suffix segment is dropped and segments without a `-`
    /// are ignored. Repeated keys keep the last value.
    pub fn from_filename(filename: &str) -> Self {
        let stem = strip_extension(filename);
        let mut segments = stem.split('_').collect::<Vec<_>>();
        segments.pop();

        let mut entities = BTreeMap::new();
        for segment in segments {
            if let Some((key, value)) = segment.split_once('-') {
                entities.insert(key.to_string(), value.to_string());
            }
        }
        Self(entities)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Removes `.nii.gz`, `.nii`, or otherwise the last extension.
pub fn strip_extension(filename: &str) -> &str {
    if let Some(stem) = filename.strip_suffix(".nii.gz") {
        return stem;
    }
    if let Some(stem) = filename.strip_suffix(".nii") {
        return stem;
    }
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    pub filename: String,
    pub n_volumes: u64,
}

impl ImageRecord {
    pub fn from_entities(entities: &Entities, filename: String, n_volumes: u64) -> Self {
        let subject = entities
            .get("sub")
            .filter(|value| !value.is_empty())
            .unwrap_or(UNKNOWN_SUBJECT)
            .to_string();
        Self {
            subject,
            session: entities.get("ses").map(str::to_string),
            run: entities.get("run").map(str::to_string),
            filename,
            n_volumes,
        }
    }

    pub fn participant_id(&self) -> String {
        format!("{SUBJECT_PREFIX}{}", self.subject)
    }
}
