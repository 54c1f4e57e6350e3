//! Snapshot persistence using SQLite
//!
//! A snapshot is one database file holding the vector matrix (`vectors`),
//! per-document metadata (`documents`) and the signature (`index_meta`).
//! Writes go to a temporary file that is renamed over the live one, so a
//! failed write never damages the previous snapshot.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};

use super::index::{Signature, VectorIndex};
use crate::core::document::{document_fingerprint, Document};
use crate::core::error::{Result, SearchError};

const SCHEMA_VERSION: i64 = 1;
const SNAPSHOT_FILE: &str = "index.db";
const TEMP_FILE: &str = "index.db.tmp";

/// Signature and size of a persisted snapshot, read without loading vectors.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub signature: Signature,
    pub built_at: Option<DateTime<Utc>>,
    pub file_size: u64,
}

/// Persisted snapshot location.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Write `index` atomically, replacing any previous snapshot.
    pub fn persist(&self, index: &VectorIndex) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp_path = self.dir.join(TEMP_FILE);
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        if let Err(e) = write_snapshot(&tmp_path, index) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, self.path())?;

        tracing::info!(
            path = %self.path().display(),
            documents = index.len(),
            model = %index.signature().model_id,
            "snapshot persisted"
        );
        Ok(())
    }

    /// Load and validate the snapshot.
    ///
    /// Returns `Ok(None)` when nothing is persisted, `SignatureMismatch` when it
    /// was built for another model or dimension, and `IndexCorrupt` when it
    /// fails structural validation.
    pub fn load(&self, model_id: &str, dimension: usize) -> Result<Option<VectorIndex>> {
        let path = self.path();
        if !path.is_file() {
            return Ok(None);
        }

        let conn = open_read_only(&path)?;
        let (signature, built_at) = read_meta(&conn)?;

        if signature.model_id != model_id || signature.dimension != dimension {
            return Err(SearchError::SignatureMismatch(format!(
                "snapshot built with {} ({} dims), current model is {} ({} dims)",
                signature.model_id, signature.dimension, model_id, dimension
            )));
        }

        let documents = read_documents(&conn)?;
        let matrix = read_vectors(&conn, signature.dimension)?;

        if document_fingerprint(&documents) != signature.document_fingerprint {
            return Err(SearchError::IndexCorrupt(
                "stored fingerprint does not match stored documents".into(),
            ));
        }

        let index = VectorIndex::from_parts(
            signature,
            documents,
            matrix,
            built_at.unwrap_or_else(Utc::now),
        )?;
        tracing::info!(path = %path.display(), documents = index.len(), "snapshot loaded");
        Ok(Some(index))
    }

    /// Read the stored signature only.
    pub fn describe(&self) -> Result<Option<StoredSnapshot>> {
        let path = self.path();
        if !path.is_file() {
            return Ok(None);
        }
        let conn = open_read_only(&path)?;
        let (signature, built_at) = read_meta(&conn)?;
        let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Ok(Some(StoredSnapshot {
            signature,
            built_at,
            file_size,
        }))
    }

    /// Delete the persisted snapshot. Missing files are not an error.
    pub fn remove(&self) -> Result<()> {
        for name in [SNAPSHOT_FILE, TEMP_FILE] {
            match fs::remove_file(self.dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn write_snapshot(path: &Path, index: &VectorIndex) -> Result<()> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(
        r#"
        CREATE TABLE documents (
            position INTEGER PRIMARY KEY,
            id TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL
        );

        CREATE TABLE vectors (
            position INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL
        );

        CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    let tx = conn.transaction()?;
    {
        let mut insert_doc = tx.prepare(
            "INSERT INTO documents (position, id, relative_path, name, content, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut insert_vec =
            tx.prepare("INSERT INTO vectors (position, embedding) VALUES (?1, ?2)")?;

        for (position, (doc, vector)) in index.documents().iter().zip(index.vectors()).enumerate() {
            let position = position as i64;
            insert_doc.execute(params![
                position,
                doc.id.to_string_lossy().to_string(),
                doc.relative_path,
                doc.name,
                doc.content,
                doc.content_hash,
            ])?;
            insert_vec.execute(params![position, embedding_to_blob(vector)])?;
        }

        let signature = index.signature();
        let mut insert_meta = tx.prepare("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in [
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("model_id", signature.model_id.clone()),
            ("dimension", signature.dimension.to_string()),
            ("document_fingerprint", signature.document_fingerprint.clone()),
            ("document_count", signature.document_count.to_string()),
            ("built_at", index.built_at().to_rfc3339()),
        ] {
            insert_meta.execute(params![key, value])?;
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| SearchError::from(e))?;
    Ok(())
}

fn corrupt(e: impl std::fmt::Display) -> SearchError {
    SearchError::IndexCorrupt(e.to_string())
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(corrupt)
}

fn read_meta(conn: &Connection) -> Result<(Signature, Option<DateTime<Utc>>)> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM index_meta")
        .map_err(corrupt)?;
    let meta: HashMap<String, String> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(corrupt)?
        .collect::<rusqlite::Result<_>>()
        .map_err(corrupt)?;

    let get = |key: &str| {
        meta.get(key)
            .cloned()
            .ok_or_else(|| SearchError::IndexCorrupt(format!("missing metadata key: {key}")))
    };
    let get_usize = |key: &str| -> Result<usize> { get(key)?.parse().map_err(corrupt) };

    let version: i64 = get("schema_version")?.parse().map_err(corrupt)?;
    if version != SCHEMA_VERSION {
        return Err(SearchError::IndexCorrupt(format!(
            "unsupported schema version {version}"
        )));
    }

    let signature = Signature {
        model_id: get("model_id")?,
        dimension: get_usize("dimension")?,
        document_fingerprint: get("document_fingerprint")?,
        document_count: get_usize("document_count")?,
    };
    let built_at = meta
        .get("built_at")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));

    Ok((signature, built_at))
}

fn read_documents(conn: &Connection) -> Result<Vec<Document>> {
    let mut stmt = conn
        .prepare(
            "SELECT position, id, relative_path, name, content, content_hash
             FROM documents ORDER BY position",
        )
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| {
            let position: i64 = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((
                position,
                Document {
                    id: PathBuf::from(id),
                    relative_path: row.get(2)?,
                    name: row.get(3)?,
                    content: row.get(4)?,
                    content_hash: row.get(5)?,
                },
            ))
        })
        .map_err(corrupt)?;

    let mut documents = Vec::new();
    for (expected, row) in rows.enumerate() {
        let (position, doc) = row.map_err(corrupt)?;
        if position != expected as i64 {
            return Err(SearchError::IndexCorrupt(format!(
                "document rows are not contiguous at position {expected}"
            )));
        }
        documents.push(doc);
    }
    Ok(documents)
}

fn read_vectors(conn: &Connection, dimension: usize) -> Result<Vec<f32>> {
    let mut stmt = conn
        .prepare("SELECT position, embedding FROM vectors ORDER BY position")
        .map_err(corrupt)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))
        .map_err(corrupt)?;

    let mut matrix = Vec::new();
    for (expected, row) in rows.enumerate() {
        let (position, blob) = row.map_err(corrupt)?;
        if position != expected as i64 {
            return Err(SearchError::IndexCorrupt(format!(
                "vector rows are not contiguous at position {expected}"
            )));
        }
        if blob.len() != dimension * 4 {
            return Err(SearchError::IndexCorrupt(format!(
                "vector {} has {} bytes, expected {}",
                position,
                blob.len(),
                dimension * 4
            )));
        }
        matrix.extend(blob_to_embedding(&blob));
    }
    Ok(matrix)
}

/// Convert f32 embedding to a little-endian BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> impl Iterator<Item = f32> + '_ {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
}
