//! Volume counting from NIfTI-1 headers.
//!
//! Only the 348-byte header is parsed; voxel data is never loaded. Gzip
//! compression is detected from the stream's magic bytes rather than the
//! file extension.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use nifti::NiftiHeader;

use crate::app::{EventLevel, ProgressEvent, ProgressSink};
use crate::error::VolumeCounterError;

/// Reports the shape of an image without loading its data.
pub trait VolumeReader {
    fn shape(&self, path: &Path) -> Result<Vec<u64>, VolumeCounterError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiHeaderReader;

impl NiftiHeaderReader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeReader for NiftiHeaderReader {
    fn shape(&self, path: &Path) -> Result<Vec<u64>, VolumeCounterError> {
        let file = File::open(path).map_err(|err| image_error(path, err))?;
        let mut reader = BufReader::new(file);
        let gzipped = is_gzip(reader.fill_buf().map_err(|err| image_error(path, err))?);

        let header = if gzipped {
            NiftiHeader::from_reader(GzDecoder::new(reader))
        } else {
            NiftiHeader::from_reader(reader)
        }
        .map_err(|err| image_error(path, err))?;

        let dim = header
            .dim
            .iter()
            .map(|&value| i64::from(value))
            .collect::<Vec<_>>();
        shape_from_dim(&dim).map_err(|message| VolumeCounterError::ImageRead {
            path: path.display().to_string(),
            message,
        })
    }
}

/// Converts a raw NIfTI `dim` field into the image shape.
///
/// `dim[0]` holds the number of dimensions (1..=7), followed by the size
/// of each axis.
pub fn shape_from_dim(dim: &[i64]) -> Result<Vec<u64>, String> {
    let ndim = *dim.first().ok_or_else(|| "empty dim field".to_string())?;
    if !(1..=7).contains(&ndim) || dim.len() <= ndim as usize {
        return Err(format!("invalid dimensionality {ndim}"));
    }
    dim[1..=ndim as usize]
        .iter()
        .map(|&size| u64::try_from(size).map_err(|_| format!("negative axis size {size}")))
        .collect()
}

/// 3D images hold one volume, 4D images one per entry of the 4th axis.
pub fn volumes_from_shape(shape: &[u64]) -> Option<u64> {
    match shape {
        [_, _, _] => Some(1),
        [_, _, _, frames] => Some(*frames),
        _ => None,
    }
}

/// Counts the volumes of one image, logging and returning `None` when the
/// file cannot be read or its dimensionality is neither 3 nor 4.
pub fn count_volumes(
    reader: &dyn VolumeReader,
    path: &Path,
    sink: &dyn ProgressSink,
) -> Option<u64> {
    let shape = match reader.shape(path) {
        Ok(shape) => shape,
        Err(err) => {
            sink.event(ProgressEvent {
                level: EventLevel::Error,
                message: format!("error loading {}: {err}", path.display()),
            });
            return None;
        }
    };

    let volumes = volumes_from_shape(&shape);
    if volumes.is_none() {
        sink.event(ProgressEvent {
            level: EventLevel::Warn,
            message: format!(
                "{}: unsupported {}D image, skipping",
                path.display(),
                shape.len()
            ),
        });
    }
    volumes
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn image_error(path: &Path, err: impl std::fmt::Display) -> VolumeCounterError {
    VolumeCounterError::ImageRead {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
