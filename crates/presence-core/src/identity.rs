//! Gallery of known identities and nearest-neighbor identity matching.

use crate::types::{Embedding, UNKNOWN_NAME};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery file not found: {0}")]
    NotFound(String),
    #[error("failed to read gallery {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed gallery {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("gallery has {names} names but {encodings} encodings")]
    LengthMismatch { names: usize, encodings: usize },
    #[error("gallery entry {index} ({name}) has dimension {actual}, expected {expected}")]
    InconsistentDimension {
        index: usize,
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("probe embedding has dimension {actual}, gallery uses {expected}")]
    ProbeDimension { expected: usize, actual: usize },
}

/// On-disk layout: parallel arrays, one row per reference embedding.
#[derive(Deserialize)]
struct GalleryFile {
    names: Vec<String>,
    encodings: Vec<Vec<f32>>,
}

/// One reference embedding and the identity that owns it.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub name: String,
    pub embedding: Embedding,
}

/// Immutable set of reference embeddings, in file order.
///
/// Loaded once at startup; nothing in the pipeline writes to it.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn load(path: &str) -> Result<Self, GalleryError> {
        if !Path::new(path).exists() {
            return Err(GalleryError::NotFound(path.to_string()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| GalleryError::Read {
            path: path.to_string(),
            source,
        })?;
        let file: GalleryFile = serde_json::from_str(&raw).map_err(|source| GalleryError::Parse {
            path: path.to_string(),
            source,
        })?;

        if file.names.len() != file.encodings.len() {
            return Err(GalleryError::LengthMismatch {
                names: file.names.len(),
                encodings: file.encodings.len(),
            });
        }

        let gallery = Self::from_entries(
            file.names
                .into_iter()
                .zip(file.encodings)
                .map(|(name, values)| (name, Embedding::new(values))),
        )?;

        if gallery.is_empty() {
            tracing::warn!(path, "gallery is empty; every face will be reported as unknown");
        } else {
            tracing::info!(
                path,
                entries = gallery.len(),
                identities = gallery.identities().len(),
                dimension = gallery.dimension().unwrap_or(0),
                "loaded gallery"
            );
        }
        Ok(gallery)
    }

    /// Build from `(name, embedding)` pairs, checking that all share one dimension.
    pub fn from_entries(
        pairs: impl IntoIterator<Item = (String, Embedding)>,
    ) -> Result<Self, GalleryError> {
        let mut entries: Vec<GalleryEntry> = Vec::new();
        for (index, (name, embedding)) in pairs.into_iter().enumerate() {
            let expected = entries.first().map(|e| e.embedding.len());
            if embedding.is_empty() || expected.is_some_and(|d| d != embedding.len()) {
                return Err(GalleryError::InconsistentDimension {
                    index,
                    name,
                    expected: expected.unwrap_or(0).max(1),
                    actual: embedding.len(),
                });
            }
            entries.push(GalleryEntry { name, embedding });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }

    /// Identity names with their reference counts, in first-seen order.
    pub fn identities(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = Vec::new();
        for entry in &self.entries {
            match out.iter_mut().find(|(name, _)| *name == entry.name) {
                Some((_, count)) => *count += 1,
                None => out.push((entry.name.clone(), 1)),
            }
        }
        out
    }
}

/// Outcome of matching one probe against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Owning identity of the nearest entry, or `"unknown"`.
    pub name: String,
    /// Distance to the nearest entry; `None` for an empty gallery.
    /// Reported for display, gates nothing beyond the tolerance check.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_NAME
    }
}

/// Nearest-neighbor matcher over Euclidean distance.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    gallery: Gallery,
    tolerance: f32,
}

impl IdentityMatcher {
    pub fn new(gallery: Gallery, tolerance: f32) -> Self {
        Self { gallery, tolerance }
    }

    /// Resolve a probe to the identity owning the nearest gallery entry.
    ///
    /// The name is reported only when the minimum distance is strictly below
    /// tolerance. Entries at equal minimum distance resolve to the first one
    /// in gallery order.
    pub fn match_face(&self, probe: &Embedding) -> Result<MatchResult, GalleryError> {
        if let Some(expected) = self.gallery.dimension() {
            if probe.len() != expected {
                return Err(GalleryError::ProbeDimension {
                    expected,
                    actual: probe.len(),
                });
            }
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in self.gallery.entries.iter().enumerate() {
            let d = probe.euclidean_distance(&entry.embedding);
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((i, d));
            }
        }

        let name = match best {
            Some((idx, d)) if d < self.tolerance => self.gallery.entries[idx].name.clone(),
            _ => UNKNOWN_NAME.to_string(),
        };
        Ok(MatchResult {
            name,
            distance: best.map(|(_, d)| d),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery(rows: &[(&str, &[f32])]) -> Gallery {
        Gallery::from_entries(
            rows.iter()
                .map(|(n, v)| (n.to_string(), Embedding::new(v.to_vec()))),
        )
        .unwrap()
    }

    #[test]
    fn test_match_within_tolerance() {
        let m = IdentityMatcher::new(
            gallery(&[("alice", &[0.0, 0.0]), ("bob", &[1.0, 1.0])]),
            0.6,
        );
        let r = m.match_face(&Embedding::new(vec![0.9, 1.0])).unwrap();
        assert_eq!(r.name, "bob");
        assert!((r.distance.unwrap() - 0.1).abs() < 1e-6);
        assert!(r.is_known());
    }

    #[test]
    fn test_unknown_iff_min_distance_at_or_above_tolerance() {
        let g = gallery(&[("alice", &[0.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.5]);
        for (tolerance, expected) in [(0.4, "unknown"), (0.5, "unknown"), (0.51, "alice")] {
            let r = IdentityMatcher::new(g.clone(), tolerance).match_face(&probe).unwrap();
            assert_eq!(r.name, expected, "tolerance {tolerance}");
            assert_eq!(r.distance, Some(0.5));
        }
    }

    #[test]
    fn test_tie_resolves_to_first_in_gallery_order() {
        let g = gallery(&[
            ("carol", &[5.0, 5.0]),
            ("alice", &[1.0, 0.0]),
            ("bob", &[-1.0, 0.0]),
        ]);
        let m = IdentityMatcher::new(g, 2.0);
        for _ in 0..3 {
            let r = m.match_face(&Embedding::new(vec![0.0, 0.0])).unwrap();
            assert_eq!(r.name, "alice");
        }
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let m = IdentityMatcher::new(Gallery::default(), 0.6);
        let r = m.match_face(&Embedding::new(vec![1.0])).unwrap();
        assert_eq!(r.name, UNKNOWN_NAME);
        assert_eq!(r.distance, None);
    }

    #[test]
    fn test_probe_dimension_mismatch() {
        let m = IdentityMatcher::new(gallery(&[("alice", &[0.0, 0.0])]), 0.6);
        let err = m.match_face(&Embedding::new(vec![0.0])).unwrap_err();
        assert!(matches!(err, GalleryError::ProbeDimension { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_identities_counts_references() {
        let g = gallery(&[("alice", &[0.0]), ("bob", &[1.0]), ("alice", &[0.1])]);
        assert_eq!(
            g.identities(),
            vec![("alice".to_string(), 2), ("bob".to_string(), 1)]
        );
    }

    #[test]
    fn test_from_entries_rejects_mixed_dimensions() {
        let err = Gallery::from_entries(vec![
            ("alice".to_string(), Embedding::new(vec![0.0, 1.0])),
            ("bob".to_string(), Embedding::new(vec![0.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, GalleryError::InconsistentDimension { index: 1, .. }));
    }

    #[test]
    fn test_load_gallery_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(
            &path,
            r#"{"names":["alice","bob"],"encodings":[[0.0,0.1],[0.5,0.5]]}"#,
        )
        .unwrap();
        let g = Gallery::load(path.to_str().unwrap()).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g.dimension(), Some(2));
        assert_eq!(g.entries[1].name, "bob");
    }

    #[test]
    fn test_load_gallery_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(&path, r#"{"names":["alice"],"encodings":[]}"#).unwrap();
        let err = Gallery::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, GalleryError::LengthMismatch { names: 1, encodings: 0 }));
    }

    #[test]
    fn test_load_missing_gallery() {
        assert!(matches!(
            Gallery::load("/nonexistent/encodings.json"),
            Err(GalleryError::NotFound(_))
        ));
    }
}
