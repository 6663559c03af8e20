use serde::Deserialize;
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;

/// Only manifest revision currently emitted by the export service.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

///
/// ManifestError
///
/// Any manifest failure is fatal: the run aborts before decoding starts.
///

#[derive(Debug, ThisError)]
pub enum ManifestError {
    #[error("manifest unreadable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("manifest malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported manifest format version {0} (expected {SUPPORTED_FORMAT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("manifest declares no kinds")]
    NoKinds,

    #[error("kind '{kind}' declares no shard files")]
    NoShards { kind: String },

    #[error("shard for kind '{kind}' cannot be resolved: {path}: {source}")]
    ShardUnresolvable {
        kind: String,
        path: PathBuf,
        source: std::io::Error,
    },
}

///
/// ShardRef
///
/// One shard file of the export. Belongs to exactly one kind; the
/// declared length is captured at load time and reported as provenance.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardRef {
    pub path: PathBuf,
    pub declared_len: u64,
}

impl ShardRef {
    /// Provenance label used in anomalies and translated records.
    #[must_use]
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }
}

///
/// KindInfo
///
/// Manifest entry for one kind: its shard files and the entity count the
/// validator checks decoding against. The count is trusted ground truth.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KindInfo {
    pub name: String,
    pub shards: Vec<ShardRef>,
    pub expected_count: u64,
}

///
/// ExportManifest
///
/// In-memory description of a bulk export, parsed from the manifest
/// document. Loading performs no consistency checking beyond
/// well-formedness and shard resolvability.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportManifest {
    pub export_id: String,
    pub format_version: u32,
    pub kinds: Vec<KindInfo>,
}

// Raw serde shape of the manifest document.
#[derive(Deserialize)]
struct RawManifest {
    export_id: String,
    format_version: u32,
    kinds: Vec<RawKind>,
}

#[derive(Deserialize)]
struct RawKind {
    name: String,
    files: Vec<PathBuf>,
    entity_count: u64,
}

impl ExportManifest {
    /// Load and resolve a manifest file. Shard paths are resolved
    /// relative to the manifest's own directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        Self::from_reader(file, base_dir)
    }

    /// Parse a manifest document from any reader, resolving shard paths
    /// against `base_dir`.
    pub fn from_reader(reader: impl Read, base_dir: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_reader(reader)?;

        if raw.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ManifestError::UnsupportedVersion(raw.format_version));
        }
        if raw.kinds.is_empty() {
            return Err(ManifestError::NoKinds);
        }

        let mut kinds = Vec::with_capacity(raw.kinds.len());
        for kind in raw.kinds {
            if kind.files.is_empty() {
                return Err(ManifestError::NoShards { kind: kind.name });
            }

            let mut shards = Vec::with_capacity(kind.files.len());
            for file in kind.files {
                let path = if file.is_absolute() {
                    file
                } else {
                    base_dir.join(file)
                };
                let meta =
                    fs::metadata(&path).map_err(|source| ManifestError::ShardUnresolvable {
                        kind: kind.name.clone(),
                        path: path.clone(),
                        source,
                    })?;

                shards.push(ShardRef {
                    path,
                    declared_len: meta.len(),
                });
            }

            kinds.push(KindInfo {
                name: kind.name,
                shards,
                expected_count: kind.entity_count,
            });
        }

        Ok(Self {
            export_id: raw.export_id,
            format_version: raw.format_version,
            kinds,
        })
    }
}
