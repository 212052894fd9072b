mod common;

use std::fs;
use std::path::{Path, PathBuf};

use assert_matches::assert_matches;

use common::{NullSink, RecordingSink, write_maybe_gz, write_nifti};
use t1_volume_counter::app::{App, EventLevel};
use t1_volume_counter::config::{ConfigLoader, RunConfig};
use t1_volume_counter::domain::{AnalysisLevel, ParticipantLabel};
use t1_volume_counter::error::VolumeCounterError;
use t1_volume_counter::volume::{NiftiHeaderReader, VolumeReader};

struct FixedShape(Vec<u64>);

impl VolumeReader for FixedShape {
    fn shape(&self, _path: &Path) -> Result<Vec<u64>, VolumeCounterError> {
        Ok(self.0.clone())
    }
}

fn bids_fixture(root: &Path) {
    write_nifti(&root.join("sub-01/anat/sub-01_T1w.nii.gz"), &[4, 4, 4]);
    write_nifti(
        &root.join("sub-02/ses-A/anat/sub-02_ses-A_T1w.nii.gz"),
        &[2, 2, 2, 120],
    );
}

fn config(bids_dir: &Path, output_dir: &Path, level: AnalysisLevel, labels: &[&str]) -> RunConfig {
    let labels = labels.iter().map(|label| label.to_string()).collect::<Vec<_>>();
    ConfigLoader::resolve(bids_dir.to_path_buf(), output_dir.to_path_buf(), level, &labels).unwrap()
}

fn participants_table(output_dir: &Path) -> String {
    fs::read_to_string(output_dir.join("t1-volume-counter/participants.tsv")).unwrap()
}

#[test]
fn end_to_end_participant_level() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);

    let app = App::new(NiftiHeaderReader::new());
    let summary = app
        .run(&config(&bids, &out, AnalysisLevel::Participant, &[]), &NullSink)
        .unwrap();

    assert_eq!(summary.runs.len(), 1);
    assert_eq!(summary.runs[0].records, 2);
    assert_eq!(
        participants_table(&out),
        "participant_id\tn_t1w_scans\ttotal_volumes\nsub-01\t1\t1\nsub-02\t1\t120\n"
    );

    let app_root = out.join("t1-volume-counter");
    assert!(app_root.join("dataset_description.json").is_file());
    let sub01 = fs::read_to_string(app_root.join("sub-01/sub-01_T1w-volumes.tsv")).unwrap();
    assert_eq!(sub01, "filename\tn_volumes\nsub-01_T1w.nii.gz\t1\n");
    let sub02 = fs::read_to_string(app_root.join("sub-02/sub-02_T1w-volumes.tsv")).unwrap();
    assert_eq!(
        sub02,
        "filename\tsession\tn_volumes\nsub-02_ses-A_T1w.nii.gz\tA\t120\n"
    );
}

#[test]
fn prefixed_and_bare_labels_select_same_records() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    bids_fixture(&bids);
    write_nifti(&bids.join("sub-010/anat/sub-010_T1w.nii"), &[2, 2, 2]);

    let app = App::new(NiftiHeaderReader::new());
    let bare: ParticipantLabel = "01".parse().unwrap();
    let prefixed: ParticipantLabel = "sub-01".parse().unwrap();

    let from_bare = app.process_dataset(&bids, Some(&bare), &NullSink).unwrap();
    let from_prefixed = app.process_dataset(&bids, Some(&prefixed), &NullSink).unwrap();
    assert_eq!(from_bare, from_prefixed);
    assert_eq!(from_bare.len(), 1);
    assert_eq!(from_bare[0].filename, "sub-01_T1w.nii.gz");
}

#[test]
fn records_carry_optional_entities() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    write_nifti(
        &bids.join("sub-01/ses-02/anat/sub-01_ses-02_run-1_T1w.nii.gz"),
        &[2, 2, 2],
    );
    write_nifti(&bids.join("sub-03/anat/sub-03_T1w.nii"), &[2, 2, 2]);

    let app = App::new(FixedShape(vec![2, 2, 2, 7]));
    let records = app.process_dataset(&bids, None, &NullSink).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].subject, "01");
    assert_eq!(records[0].session.as_deref(), Some("02"));
    assert_eq!(records[0].run.as_deref(), Some("1"));
    assert_eq!(records[0].n_volumes, 7);
    assert_eq!(records[1].session, None);
    assert_eq!(records[1].run, None);
}

#[test]
fn unreadable_image_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);
    write_maybe_gz(&bids.join("sub-01/anat/sub-01_run-2_T1w.nii.gz"), b"garbage");

    let sink = RecordingSink::default();
    let app = App::new(NiftiHeaderReader::new());
    let summary = app
        .run(&config(&bids, &out, AnalysisLevel::Participant, &["01"]), &sink)
        .unwrap();

    assert_eq!(summary.runs[0].records, 1);
    assert!(
        sink.events()
            .iter()
            .any(|event| event.level == EventLevel::Error
                && event.message.contains("sub-01_run-2_T1w.nii.gz"))
    );
    assert_eq!(
        participants_table(&out),
        "participant_id\tn_t1w_scans\ttotal_volumes\nsub-01\t1\t1\n"
    );
}

#[test]
fn each_label_rewrites_group_summary() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);

    let app = App::new(NiftiHeaderReader::new());
    let summary = app
        .run(
            &config(&bids, &out, AnalysisLevel::Participant, &["01", "sub-02"]),
            &NullSink,
        )
        .unwrap();

    assert_eq!(summary.runs.len(), 2);
    assert_eq!(summary.runs[0].participant.as_deref(), Some("sub-01"));
    assert_eq!(summary.runs[1].participant.as_deref(), Some("sub-02"));
    assert_eq!(
        participants_table(&out),
        "participant_id\tn_t1w_scans\ttotal_volumes\nsub-02\t1\t120\n"
    );
    assert!(out.join("t1-volume-counter/sub-01/sub-01_T1w-volumes.tsv").is_file());
}

#[test]
fn no_matching_images_writes_no_tables() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);

    let app = App::new(NiftiHeaderReader::new());
    let summary = app
        .run(&config(&bids, &out, AnalysisLevel::Participant, &["99"]), &NullSink)
        .unwrap();

    assert_eq!(summary.runs[0].records, 0);
    assert!(summary.runs[0].written.is_empty());
    let app_root = out.join("t1-volume-counter");
    assert!(!app_root.join("participants.tsv").exists());
    assert!(!app_root.join("sub-99").exists());
}

#[test]
fn missing_input_dir_creates_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("missing");
    let out = temp.path().join("out");
    let config = RunConfig {
        bids_dir: bids.clone(),
        output_dir: out.clone(),
        analysis_level: AnalysisLevel::Participant,
        participant_labels: Vec::new(),
    };

    let sink = RecordingSink::default();
    let app = App::new(NiftiHeaderReader::new());
    let err = app.run(&config, &sink).unwrap_err();

    assert_matches!(err, VolumeCounterError::MissingInputDir(path) if path == PathBuf::from(&bids));
    assert!(!out.exists());
    assert!(sink.events().is_empty());
}

#[test]
fn group_level_warns_without_participant_results() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);

    let sink = RecordingSink::default();
    let app = App::new(NiftiHeaderReader::new());
    let summary = app
        .run(&config(&bids, &out, AnalysisLevel::Group, &[]), &sink)
        .unwrap();

    assert_eq!(summary.participants_table_found, Some(false));
    assert!(summary.runs.is_empty());
    assert!(
        sink.events()
            .iter()
            .any(|event| event.level == EventLevel::Warn)
    );
    assert!(!out.join("t1-volume-counter/participants.tsv").exists());
}

#[test]
fn group_level_after_participant_level() {
    let temp = tempfile::tempdir().unwrap();
    let bids = temp.path().join("bids");
    let out = temp.path().join("out");
    bids_fixture(&bids);

    let app = App::new(NiftiHeaderReader::new());
    app.run(&config(&bids, &out, AnalysisLevel::Participant, &[]), &NullSink)
        .unwrap();

    let sink = RecordingSink::default();
    let summary = app
        .run(&config(&bids, &out, AnalysisLevel::Group, &[]), &sink)
        .unwrap();
    assert_eq!(summary.participants_table_found, Some(true));
    assert!(
        sink.events()
            .iter()
            .all(|event| event.level != EventLevel::Warn)
    );
    assert!(sink.messages().iter().any(|message| message == "Processing complete!"));
}
