//! Encoding cache: one face encoding per known identity.
//!
//! Built once at startup from a directory of reference images, or loaded from
//! an encodings file written by a previous build. Immutable afterwards.

use crate::pipeline::{FaceEncoder, PipelineError};
use crate::types::{Embedding, FaceEncoding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
const ENCODINGS_FILE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: cannot decode image: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{}: no face detected in reference image", path.display())]
    NoFace { path: PathBuf },
    #[error("{}: {count} faces detected in reference image, expected exactly one", path.display())]
    MultipleFaces { path: PathBuf, count: usize },
    #[error("{}: {source}", path.display())]
    Pipeline {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },
    #[error("no reference images found in {}", .0.display())]
    Empty(PathBuf),
    #[error("identity {0:?} appears more than once")]
    DuplicateIdentity(String),
    #[error("identity {identity:?} has a {actual}-dim encoding, expected {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported encodings file version {0}")]
    UnsupportedVersion(u32),
    #[error("encodings file: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk form of a cache.
#[derive(Serialize, Deserialize)]
struct EncodingsFile {
    version: u32,
    encodings: Vec<FaceEncoding>,
}

/// Known face encodings, at most one per identity, all of one dimension.
#[derive(Debug, Clone, Default)]
pub struct EncodingCache {
    encodings: Vec<FaceEncoding>,
}

impl EncodingCache {
    /// Validate and wrap a list of encodings.
    pub fn from_encodings(encodings: Vec<FaceEncoding>) -> Result<Self, CacheError> {
        let mut seen = std::collections::HashSet::new();
        let expected = encodings.first().map(|e| e.embedding.dim());
        for e in &encodings {
            if !seen.insert(e.identity.as_str()) {
                return Err(CacheError::DuplicateIdentity(e.identity.clone()));
            }
            if let Some(expected) = expected {
                if e.embedding.dim() != expected {
                    return Err(CacheError::DimensionMismatch {
                        identity: e.identity.clone(),
                        expected,
                        actual: e.embedding.dim(),
                    });
                }
            }
        }
        Ok(Self { encodings })
    }

    /// Encode every reference image under `dir`.
    ///
    /// Files directly in `dir` are keyed by file stem (`S1.jpg` → `S1`);
    /// subdirectories are keyed by their name and may hold several images,
    /// which are averaged into one encoding. Each image must contain exactly
    /// one face. Fails on the first bad image.
    pub fn build<E: FaceEncoder>(dir: &Path, encoder: &mut E) -> Result<Self, CacheError> {
        let references = collect_references(dir)?;
        if references.is_empty() {
            return Err(CacheError::Empty(dir.to_path_buf()));
        }

        let mut encodings = Vec::with_capacity(references.len());
        for (identity, paths) in references {
            let mut samples = Vec::with_capacity(paths.len());
            for path in &paths {
                samples.push(encode_reference(path, encoder)?);
            }
            let Some(embedding) = Embedding::mean(&samples) else {
                continue;
            };
            tracing::info!(identity = %identity, images = paths.len(), "encoded reference face");
            encodings.push(FaceEncoding { identity, embedding });
        }

        Self::from_encodings(encodings)
    }

    /// Read a cache previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let file = File::open(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: EncodingsFile = serde_json::from_reader(BufReader::new(file))?;
        if parsed.version != ENCODINGS_FILE_VERSION {
            return Err(CacheError::UnsupportedVersion(parsed.version));
        }
        let cache = Self::from_encodings(parsed.encodings)?;
        tracing::info!(path = %path.display(), identities = cache.len(), "loaded face encodings");
        Ok(cache)
    }

    /// Write the cache as JSON.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let file = File::create(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = EncodingsFile {
            version: ENCODINGS_FILE_VERSION,
            encodings: self.encodings.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &doc)?;
        tracing::info!(path = %path.display(), identities = self.len(), "saved face encodings");
        Ok(())
    }

    /// Embedding dimension shared by every encoding, `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.encodings.first().map(|e| e.embedding.dim())
    }

    /// Fail unless the encodings have the dimension `expected`, the width of
    /// the embeddings the recognizer produces.
    pub fn ensure_dim(&self, expected: usize) -> Result<(), CacheError> {
        match self.encodings.first() {
            Some(e) if e.embedding.dim() != expected => Err(CacheError::DimensionMismatch {
                identity: e.identity.clone(),
                expected,
                actual: e.embedding.dim(),
            }),
            _ => Ok(()),
        }
    }

    pub fn encodings(&self) -> &[FaceEncoding] {
        &self.encodings
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.encodings.iter().map(|e| e.identity.as_str())
    }

    pub fn get(&self, identity: &str) -> Option<&FaceEncoding> {
        self.encodings.iter().find(|e| e.identity == identity)
    }

    pub fn len(&self) -> usize {
        self.encodings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let io_err = |source| CacheError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

/// Group reference image paths by identity.
fn collect_references(dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, CacheError> {
    let mut refs: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for path in sorted_entries(dir)? {
        if path.is_dir() {
            let Some(identity) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let images: Vec<PathBuf> = sorted_entries(&path)?
                .into_iter()
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            if images.is_empty() {
                tracing::warn!(dir = %path.display(), "identity directory has no images, skipping");
                continue;
            }
            refs.entry(identity.to_string()).or_default().extend(images);
        } else if is_image(&path) {
            let Some(identity) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            refs.entry(identity.to_string()).or_default().push(path.clone());
        } else {
            tracing::debug!(path = %path.display(), "skipping non-image file");
        }
    }

    Ok(refs)
}

fn encode_reference<E: FaceEncoder>(path: &Path, encoder: &mut E) -> Result<Embedding, CacheError> {
    let img = image::open(path)
        .map_err(|source| CacheError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();

    let mut faces = encoder
        .encode(img.as_raw(), width, height)
        .map_err(|source| CacheError::Pipeline {
            path: path.to_path_buf(),
            source,
        })?;

    match faces.len() {
        0 => Err(CacheError::NoFace { path: path.to_path_buf() }),
        1 => Ok(faces.remove(0).embedding),
        count => Err(CacheError::MultipleFaces {
            path: path.to_path_buf(),
            count,
        }),
    }
}
