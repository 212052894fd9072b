//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use flate2::Compression;
use flate2::write::GzEncoder;

use t1_volume_counter::app::{ProgressEvent, ProgressSink};

/// Minimal single-file NIfTI-1 header (348 bytes + 4 extension bytes) for a
/// uint8 image of the given shape.
pub fn nifti_header(shape: &[u16]) -> Vec<u8> {
    let mut bytes = vec![0u8; 352];
    bytes[0..4].copy_from_slice(&348i32.to_le_bytes());

    let mut dim = [1i16; 8];
    dim[0] = shape.len() as i16;
    for (axis, size) in shape.iter().enumerate() {
        dim[axis + 1] = *size as i16;
    }
    for (idx, value) in dim.iter().enumerate() {
        let offset = 40 + idx * 2;
        bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    // datatype = DT_UINT8, bitpix = 8
    bytes[70..72].copy_from_slice(&2i16.to_le_bytes());
    bytes[72..74].copy_from_slice(&8i16.to_le_bytes());
    for idx in 0..8 {
        let offset = 76 + idx * 4;
        bytes[offset..offset + 4].copy_from_slice(&1f32.to_le_bytes());
    }
    bytes[108..112].copy_from_slice(&352f32.to_le_bytes());
    bytes[112..116].copy_from_slice(&1f32.to_le_bytes());
    bytes[344..348].copy_from_slice(b"n+1\0");
    bytes
}

/// Writes a NIfTI image with zeroed voxels; `.gz` paths are gzip-compressed.
pub fn write_nifti(path: &Path, shape: &[u16]) {
    let voxels = shape.iter().map(|&size| size as usize).product::<usize>();
    let mut bytes = nifti_header(shape);
    bytes.extend(std::iter::repeat_n(0u8, voxels));
    write_maybe_gz(path, &bytes);
}

pub fn write_maybe_gz(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let is_gz = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(".gz"))
        .unwrap_or(false);
    if is_gz {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        fs::write(path, encoder.finish().unwrap()).unwrap();
    } else {
        fs::write(path, bytes).unwrap();
    }
}

/// Drops every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Records every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
