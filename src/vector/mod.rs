//! Vector Index: brute-force cosine similarity search over embeddings
//! persisted in their own SQLite table.
//!
//! The index is not required to be exact; a brute-force scan is acceptable
//! at the scale this system targets (one assistant's working memory, not a
//! web-scale corpus) and avoids pulling in an ANN dependency.

use rusqlite::{params, OptionalExtension};

use crate::embedding::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::storage::Storage;

/// The metadata tuple stored alongside each vector, usable as an equality
/// pre-filter in [`VectorIndex::top_k`].
#[derive(Debug, Clone, Default)]
pub struct VectorMetadata {
    pub memory_type: Option<String>,
    pub project: Option<String>,
    pub source_role: Option<String>,
    pub importance: Option<f32>,
}

/// At most one equality predicate is pushed down to the index; anything
/// beyond that is the Engine's job to post-filter against Record Store rows.
#[derive(Debug, Clone)]
pub enum VectorFilter {
    Project(String),
    MemoryType(String),
}

pub struct VectorIndex {
    storage: Storage,
    dimensions: usize,
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl VectorIndex {
    /// Wrap the shared [`Storage`] connection. Refuses nothing at
    /// construction time; dimension mismatches are caught per-upsert.
    pub fn new(storage: Storage, dimensions: usize) -> Self {
        Self { storage, dimensions }
    }

    pub fn upsert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(MemoryError::EmbedError(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        let blob = encode_vector(vector);
        self.storage.with_connection(|conn| {
            conn.execute(
                "INSERT INTO vectors (id, embedding, memory_type, project, source_role, importance) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET embedding = excluded.embedding, \
                 memory_type = excluded.memory_type, project = excluded.project, \
                 source_role = excluded.source_role, importance = excluded.importance",
                params![
                    id,
                    blob,
                    metadata.memory_type,
                    metadata.project,
                    metadata.source_role,
                    metadata.importance,
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.storage.with_connection(|conn| {
            conn.execute("DELETE FROM vectors WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
        self.storage.with_connection(|conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row("SELECT embedding FROM vectors WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(blob.map(|b| decode_vector(&b)))
        })
    }

    /// Top-k by ascending cosine distance (`1 - similarity`), with an
    /// optional equality pre-filter.
    pub fn top_k(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&VectorFilter>,
    ) -> Result<Vec<(String, f32)>> {
        let rows = self.storage.with_connection(|conn| {
            let (sql, bind): (&str, Option<String>) = match filter {
                Some(VectorFilter::Project(p)) => {
                    ("SELECT id, embedding FROM vectors WHERE project = ?1", Some(p.clone()))
                }
                Some(VectorFilter::MemoryType(t)) => {
                    ("SELECT id, embedding FROM vectors WHERE memory_type = ?1", Some(t.clone()))
                }
                None => ("SELECT id, embedding FROM vectors", None),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows: Vec<(String, Vec<u8>)> = match bind {
                Some(b) => stmt
                    .query_map(params![b], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })?;

        let mut scored: Vec<(String, f32)> = rows
            .into_iter()
            .map(|(id, blob)| {
                let v = decode_vector(&blob);
                let sim = cosine_similarity(query_vector, &v);
                (id, 1.0 - sim)
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}
