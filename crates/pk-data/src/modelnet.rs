//! ModelNet40-style dataset directories.
//!
//! A dataset directory holds a `manifest.json` describing per-split record
//! files with SHA-256 digests, plus the record files themselves. Record file
//! layout (little-endian): magic `PKPC`, u32 version, u32 cloud count,
//! u32 points-per-cloud, then for each cloud `num_points * 3` f32
//! coordinates followed by one i32 label. Files are verified before they are
//! loaded; a missing or tampered file fails the whole call.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    dataset::Dataset,
    error::{corrupt, integrity, Result},
};

pub const MAGIC: [u8; 4] = *b"PKPC";
pub const FORMAT_VERSION: u32 = 1;

pub const CATEGORIES: [&str; 40] = [
    "airplane",
    "bathtub",
    "bed",
    "bench",
    "bookshelf",
    "bottle",
    "bowl",
    "car",
    "chair",
    "cone",
    "cup",
    "curtain",
    "desk",
    "door",
    "dresser",
    "flower_pot",
    "glass_box",
    "guitar",
    "keyboard",
    "lamp",
    "laptop",
    "mantel",
    "monitor",
    "night_stand",
    "person",
    "piano",
    "plant",
    "radio",
    "range_hood",
    "sink",
    "sofa",
    "stairs",
    "stool",
    "table",
    "tent",
    "toilet",
    "tv_stand",
    "vase",
    "wardrobe",
    "xbox",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFile {
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub num_points: u32,
    pub splits: BTreeMap<String, Vec<RecordFile>>,
}

/// A verified-on-load dataset directory.
pub struct ModelNet40 {
    root: PathBuf,
    manifest: Manifest,
}

impl ModelNet40 {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join("manifest.json");
        let raw = fs::read(&manifest_path)?;
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| corrupt(format!("{}: {e}", manifest_path.display())))?;
        Ok(Self { root, manifest })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn splits(&self) -> impl Iterator<Item = &str> {
        self.manifest.splits.keys().map(|s| s.as_str())
    }

    /// Verifies every record file of every split against its digest.
    pub fn check_integrity(&self) -> Result<()> {
        for files in self.manifest.splits.values() {
            self.verify_files(files)?;
        }
        Ok(())
    }

    /// Verifies then loads one split into an in-memory [`Dataset`].
    pub fn load(&self, split: &str) -> Result<Dataset> {
        let files = self
            .manifest
            .splits
            .get(split)
            .ok_or_else(|| corrupt(format!("unknown split {split:?}")))?;
        self.verify_files(files)?;
        debug!(split, files = files.len(), "loading modelnet records");
        let mut dataset = Dataset::new();
        for file in files {
            let path = self.root.join(&file.filename);
            read_records(&path, self.manifest.num_points, &mut dataset)?;
        }
        debug!(split, samples = dataset.len(), "loaded modelnet split");
        Ok(dataset)
    }

    fn verify_files(&self, files: &[RecordFile]) -> Result<()> {
        for file in files {
            let path = self.root.join(&file.filename);
            if !path.is_file() {
                return Err(integrity(format!("{} is missing", path.display())));
            }
            let digest = sha256_hex(&path)?;
            if digest != file.sha256.to_lowercase() {
                return Err(integrity(format!(
                    "{} does not match its manifest digest",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

pub fn sha256_hex(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_records(path: &Path, num_points: u32, out: &mut Dataset) -> Result<()> {
    let bytes = fs::read(path)?;
    if bytes.len() < 16 || bytes[..4] != MAGIC {
        return Err(corrupt(format!("{} is not a record file", path.display())));
    }
    let version = read_u32(&bytes, 4);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "{}: unsupported record version {version}",
            path.display()
        )));
    }
    let count = read_u32(&bytes, 8) as usize;
    let file_points = read_u32(&bytes, 12) as usize;
    if file_points != num_points as usize {
        return Err(corrupt(format!(
            "{}: {file_points} points per cloud, manifest says {num_points}",
            path.display()
        )));
    }
    let stride = file_points * 3 * 4 + 4;
    if bytes.len() != 16 + count * stride {
        return Err(corrupt(format!(
            "{}: expected {} bytes for {count} clouds, found {}",
            path.display(),
            16 + count * stride,
            bytes.len()
        )));
    }
    for ci in 0..count {
        let base = 16 + ci * stride;
        let coords: Vec<f32> = bytes[base..base + file_points * 12]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let label = read_u32(&bytes, base + file_points * 12) as i32;
        let cloud = Array2::from_shape_vec((file_points, 3), coords)
            .map_err(|e| corrupt(format!("{}: {e}", path.display())))?;
        out.push(cloud, label)?;
    }
    Ok(())
}

/// Writes clouds into a record file; the counterpart of [`ModelNet40::load`]
/// for converters and tests. All clouds must share one point count.
pub fn write_records(path: &Path, samples: &[(Array2<f32>, i32)]) -> Result<()> {
    let num_points = samples
        .first()
        .map(|(cloud, _)| cloud.dim().0)
        .unwrap_or(0);
    let mut bytes =
        Vec::with_capacity(16 + samples.len() * (num_points * 12 + 4));
    bytes.extend_from_slice(&MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(num_points as u32).to_le_bytes());
    for (cloud, label) in samples {
        if cloud.dim() != (num_points, 3) {
            return Err(crate::error::shape(format!(
                "write_records: cloud shape {:?} does not match ({num_points}, 3)",
                cloud.dim()
            )));
        }
        for &v in cloud.iter() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&(*label as u32).to_le_bytes());
    }
    fs::write(path, bytes)?;
    Ok(())
}
