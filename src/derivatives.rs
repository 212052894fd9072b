use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tempfile::Builder;

use crate::domain::{ImageRecord, SUBJECT_PREFIX};
use crate::error::VolumeCounterError;

pub const APP_DIR: &str = "t1-volume-counter";
pub const DATASET_DESCRIPTION: &str = "dataset_description.json";
pub const PARTICIPANTS_TABLE: &str = "participants.tsv";
pub const MISSING_VALUE: &str = "n/a";

const APP_NAME: &str = "T1 Volume Counter";
const DATASET_NAME: &str = "T1 Volume Counter - BIDS App";
const BIDS_VERSION: &str = "1.6.0";
const CODE_URL: &str = "https://github.com/ReproNim/babs-demo-ohbm2025";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetDescription {
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub dataset_type: String,
    pub generated_by: Vec<GeneratedBy>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeneratedBy {
    pub name: String,
    pub version: String,
    #[serde(rename = "CodeURL")]
    pub code_url: String,
}

impl DatasetDescription {
    pub fn for_version(version: &str) -> Self {
        Self {
            name: DATASET_NAME.to_string(),
            bids_version: BIDS_VERSION.to_string(),
            dataset_type: "derivative".to_string(),
            generated_by: vec![GeneratedBy {
                name: APP_NAME.to_string(),
                version: version.to_string(),
                code_url: CODE_URL.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectSidecar {
    pub description: String,
    pub sources: Vec<String>,
    #[serde(rename = "n_volumes")]
    pub n_volumes: ColumnDescription,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnDescription {
    pub description: String,
    pub units: String,
}

impl SubjectSidecar {
    pub fn for_records(records: &[&ImageRecord]) -> Self {
        Self {
            description: "Number of volumes in T1-weighted images".to_string(),
            sources: records.iter().map(|record| record.filename.clone()).collect(),
            n_volumes: ColumnDescription {
                description: "Number of 3D volumes in the NIfTI file".to_string(),
                units: "volumes".to_string(),
            },
        }
    }
}

/// Records of one subject, in the order they were produced.
#[derive(Debug, Clone)]
pub struct SubjectGroup<'a> {
    pub subject: String,
    pub records: Vec<&'a ImageRecord>,
}

impl SubjectGroup<'_> {
    pub fn participant_id(&self) -> String {
        format!("{SUBJECT_PREFIX}{}", self.subject)
    }

    pub fn total_volumes(&self) -> u64 {
        self.records.iter().map(|record| record.n_volumes).sum()
    }
}

/// Groups records by subject, keeping subjects in first-seen order.
pub fn group_by_subject(records: &[ImageRecord]) -> Vec<SubjectGroup<'_>> {
    let mut groups: Vec<SubjectGroup<'_>> = Vec::new();
    for record in records {
        match groups
            .iter_mut()
            .find(|group| group.subject == record.subject)
        {
            Some(group) => group.records.push(record),
            None => groups.push(SubjectGroup {
                subject: record.subject.clone(),
                records: vec![record],
            }),
        }
    }
    groups
}

/// Per-subject table; the `session` column appears only when some record
/// carries a session.
pub fn render_subject_table(records: &[&ImageRecord]) -> String {
    let with_session = records.iter().any(|record| record.session.is_some());
    let mut out = String::new();
    if with_session {
        out.push_str("filename\tsession\tn_volumes\n");
        for record in records {
            let session = record.session.as_deref().unwrap_or(MISSING_VALUE);
            out.push_str(&format!(
                "{}\t{}\t{}\n",
                record.filename, session, record.n_volumes
            ));
        }
    } else {
        out.push_str("filename\tn_volumes\n");
        for record in records {
            out.push_str(&format!("{}\t{}\n", record.filename, record.n_volumes));
        }
    }
    out
}

pub fn render_participants_table(groups: &[SubjectGroup<'_>]) -> String {
    let mut out = String::from("participant_id\tn_t1w_scans\ttotal_volumes\n");
    for group in groups {
        out.push_str(&format!(
            "{}\t{}\t{}\n",
            group.participant_id(),
            group.records.len(),
            group.total_volumes()
        ));
    }
    out
}

/// Layout of the derivatives tree under `<output_dir>/t1-volume-counter`.
#[derive(Debug, Clone)]
pub struct DerivativesLayout {
    app_root: Utf8PathBuf,
}

impl DerivativesLayout {
    pub fn new(output_dir: &Path) -> Result<Self, VolumeCounterError> {
        let output_dir = Utf8PathBuf::from_path_buf(output_dir.to_path_buf())
            .map_err(|path| {
                VolumeCounterError::Filesystem(format!(
                    "output path is not valid UTF-8: {}",
                    path.display()
                ))
            })?;
        Ok(Self::new_with_root(output_dir.join(APP_DIR)))
    }

    pub fn new_with_root(app_root: Utf8PathBuf) -> Self {
        Self { app_root }
    }

    pub fn app_root(&self) -> &Utf8Path {
        &self.app_root
    }

    pub fn dataset_description_path(&self) -> Utf8PathBuf {
        self.app_root.join(DATASET_DESCRIPTION)
    }

    pub fn participants_path(&self) -> Utf8PathBuf {
        self.app_root.join(PARTICIPANTS_TABLE)
    }

    pub fn subject_dir(&self, subject: &str) -> Utf8PathBuf {
        self.app_root.join(format!("{SUBJECT_PREFIX}{subject}"))
    }

    pub fn subject_table_path(&self, subject: &str) -> Utf8PathBuf {
        self.subject_dir(subject)
            .join(format!("{SUBJECT_PREFIX}{subject}_T1w-volumes.tsv"))
    }

    pub fn subject_sidecar_path(&self, subject: &str) -> Utf8PathBuf {
        self.subject_dir(subject)
            .join(format!("{SUBJECT_PREFIX}{subject}_T1w-volumes.json"))
    }

    pub fn ensure_app_root(&self) -> Result<(), VolumeCounterError> {
        fs::create_dir_all(self.app_root.as_std_path())
            .map_err(|err| VolumeCounterError::Filesystem(format!("create {}: {err}", self.app_root)))
    }

    pub fn has_participants_table(&self) -> bool {
        self.participants_path().as_std_path().is_file()
    }

    pub fn write_dataset_description(
        &self,
        version: &str,
    ) -> Result<Utf8PathBuf, VolumeCounterError> {
        self.ensure_app_root()?;
        let path = self.dataset_description_path();
        let content = to_pretty_json(&DatasetDescription::for_version(version))?;
        write_file_atomic(&path, &content)?;
        Ok(path)
    }

    /// Writes per-subject tables and sidecars, then replaces the group
    /// summary with rows for the subjects in `records`.
    ///
    /// Returns the written paths in write order.
    pub fn write_results(
        &self,
        records: &[ImageRecord],
    ) -> Result<Vec<Utf8PathBuf>, VolumeCounterError> {
        self.ensure_app_root()?;
        let groups = group_by_subject(records);
        let mut written = Vec::new();

        for group in &groups {
            let dir = self.subject_dir(&group.subject);
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| VolumeCounterError::Filesystem(format!("create {dir}: {err}")))?;

            let table_path = self.subject_table_path(&group.subject);
            write_file_atomic(&table_path, render_subject_table(&group.records).as_bytes())?;
            written.push(table_path);

            let sidecar_path = self.subject_sidecar_path(&group.subject);
            let sidecar = to_pretty_json(&SubjectSidecar::for_records(&group.records))?;
            write_file_atomic(&sidecar_path, &sidecar)?;
            written.push(sidecar_path);
        }

        let participants_path = self.participants_path();
        write_file_atomic(
            &participants_path,
            render_participants_table(&groups).as_bytes(),
        )?;
        written.push(participants_path);

        Ok(written)
    }
}

/// Serializes with four-space indentation and a trailing newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, VolumeCounterError> {
    let mut buffer = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|err| VolumeCounterError::Serialize(err.to_string()))?;
    buffer.push(b'\n');
    Ok(buffer)
}

fn write_file_atomic(dest: &Utf8Path, content: &[u8]) -> Result<(), VolumeCounterError> {
    let parent = dest
        .parent()
        .ok_or_else(|| VolumeCounterError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| VolumeCounterError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".t1vc")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| VolumeCounterError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| VolumeCounterError::Filesystem(format!("write {dest}: {err}")))?;
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| VolumeCounterError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| VolumeCounterError::Filesystem(err.to_string()))?;
    Ok(())
}
