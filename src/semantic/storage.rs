//! Binary storage for the title vector index.
//!
//! File format: history.index
//!
//! Header (48 bytes):
//! - version: u8 (1)
//! - metric: u8 (0 = inner product)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, ascending id):
//! - history_id: i64 (little-endian)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::VectorIndex;

/// Current file format version
const FORMAT_VERSION: u8 = 1;

const METRIC_INNER_PRODUCT: u8 = 0;

/// Header size in bytes: version(1) + metric(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 48;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("index file not found at {0}, run build-index first")]
    Missing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Unsupported similarity metric id {0}")]
    UnsupportedMetric(u8),

    #[error("Model mismatch: index was built with a different model, rebuild it")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for the persisted index.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the vector index from storage.
    ///
    /// Any failure is fatal to the caller: there is no usable empty index.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VectorStorageError::Missing(self.path.clone()),
            _ => VectorStorageError::Io(e),
        })?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        Self::validate_header(&header, expected_model_id, expected_dimensions)?;

        let dimensions = header.dimensions as usize;
        let mut index = VectorIndex::new(dimensions);

        for _ in 0..header.entry_count {
            let (id, embedding) = Self::read_entry(&mut reader, dimensions)?;
            index.insert(id, embedding).map_err(|e| {
                VectorStorageError::InvalidFormat(format!("entry {id}: {e}"))
            })?;
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(VectorStorageError::InvalidFormat(
                "trailing bytes after last entry".to_string(),
            ));
        }

        if index.len() as u64 != header.entry_count {
            return Err(VectorStorageError::InvalidFormat(
                "duplicate entry ids".to_string(),
            ));
        }

        log::info!(
            "loaded {} vectors ({} dims) from {}",
            index.len(),
            dimensions,
            self.path.display()
        );

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: unique temp file -> fsync -> rename over the old
    /// artifact, so readers see either the old or the new index in full.
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.temp_path();

        let result = Self::write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        log::info!("saved {} vectors to {}", index.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.path.with_file_name(format!(
            ".{file_name}.{}.tmp",
            rusty_ulid::generate_ulid_string()
        ))
    }

    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the header",
                index.dimensions()
            ))
        })?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            metric: METRIC_INNER_PRODUCT,
            model_id: *model_id,
            dimensions,
            entry_count: index.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        for (id, embedding) in index.iter() {
            writer.write_all(&id.to_le_bytes())?;
            for &value in embedding {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                VectorStorageError::InvalidFormat("file shorter than header".to_string())
            }
            _ => VectorStorageError::Io(e),
        })?;

        let stored_checksum = u32::from_le_bytes([
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
            header_bytes[47],
        ]);
        if stored_checksum != crc32fast::hash(&header_bytes[0..44]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let version = header_bytes[0];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let metric = header_bytes[1];
        if metric != METRIC_INNER_PRODUCT {
            return Err(VectorStorageError::UnsupportedMetric(metric));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[2..34]);

        let dimensions = u16::from_le_bytes([header_bytes[34], header_bytes[35]]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[36..44]);
        let entry_count = u64::from_le_bytes(count_bytes);

        Ok(Header {
            version,
            metric,
            model_id,
            dimensions,
            entry_count,
        })
    }

    fn validate_header(
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1] = header.metric;
        header_bytes[2..34].copy_from_slice(&header.model_id);
        header_bytes[34..36].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[36..44].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..44]);
        header_bytes[44..48].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<(i64, Vec<f32>), VectorStorageError> {
        let truncated = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                VectorStorageError::InvalidFormat("truncated entry table".to_string())
            }
            _ => VectorStorageError::Io(e),
        };

        let mut id_bytes = [0u8; 8];
        reader.read_exact(&mut id_bytes).map_err(truncated)?;
        let id = i64::from_le_bytes(id_bytes);

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes).map_err(truncated)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok((id, embedding))
    }
}

#[derive(Debug)]
struct Header {
    version: u8,
    metric: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(3);
        index.insert(1, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(30, vec![0.0, 0.0, 1.0]).unwrap();
        index
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));

        storage.save(&sample_index(), &test_model_id()).unwrap();
        assert!(storage.path().exists());

        let loaded = storage.load(&test_model_id(), 3).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimensions(), 3);
        let (last_id, last) = loaded.iter().last().unwrap();
        assert_eq!(last_id, 30);
        assert_eq!(last, &[0.0, 0.0, 1.0][..]);
    }

    #[test]
    fn test_save_empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));

        storage.save(&VectorIndex::new(384), &test_model_id()).unwrap();
        let loaded = storage.load(&test_model_id(), 384).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));
        assert!(matches!(
            storage.load(&test_model_id(), 3),
            Err(VectorStorageError::Missing(_))
        ));
    }

    #[test]
    fn test_model_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));
        storage.save(&sample_index(), &test_model_id()).unwrap();

        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;
        assert!(matches!(
            storage.load(&wrong_model_id, 3),
            Err(VectorStorageError::ModelMismatch)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));
        storage.save(&sample_index(), &test_model_id()).unwrap();

        assert!(matches!(
            storage.load(&test_model_id(), 384),
            Err(VectorStorageError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.index");
        let storage = VectorStorage::new(path.clone());
        storage.save(&sample_index(), &test_model_id()).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        assert!(matches!(
            storage.load(&test_model_id(), 3),
            Err(VectorStorageError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_truncated_file_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.index");
        let storage = VectorStorage::new(path.clone());
        storage.save(&sample_index(), &test_model_id()).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 2).unwrap();

        assert!(matches!(
            storage.load(&test_model_id(), 3),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.index");
        std::fs::write(&path, b"not an index").unwrap();

        let storage = VectorStorage::new(path);
        assert!(matches!(
            storage.load(&test_model_id(), 3),
            Err(VectorStorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rebuild_replaces_old_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("history.index"));
        storage.save(&sample_index(), &test_model_id()).unwrap();

        let mut smaller = VectorIndex::new(3);
        smaller.insert(7, vec![1.0, 0.0, 0.0]).unwrap();
        storage.save(&smaller, &test_model_id()).unwrap();

        let loaded = storage.load(&test_model_id(), 3).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.iter().next().map(|(id, _)| id), Some(7));

        // no temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_save_cleans_up() {
        let path = PathBuf::from("/nonexistent/directory/history.index");
        let storage = VectorStorage::new(path);
        assert!(storage.save(&sample_index(), &test_model_id()).is_err());
    }
}
