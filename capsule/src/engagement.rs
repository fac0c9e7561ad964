//! Durable, client-local record of which capsules and comments this client
//! has already upvoted.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use borsh::{BorshDeserialize, BorshSerialize};
use chrono::Utc;

use crate::model::Target;

pub const ENGAGEMENT_SCHEMA_VERSION: u32 = 1;
const META_TREE: &str = "__meta";
const SCHEMA_KEY: &[u8] = b"schema_version";

#[derive(Debug, thiserror::Error)]
pub enum EngagementStoreError {
    #[error("I/O error while preparing engagement storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("unsupported engagement schema version {found}")]
    UnsupportedVersion { found: u32 },
    #[error("invalid engagement schema marker")]
    InvalidSchemaMarker,
    #[error("failed to serialize engagement entry")]
    Serialize,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct EngagementEntry {
    pub engaged_at: i64,
}

/// Engagement markers, one sled tree per [`Target`] namespace.
#[derive(Clone)]
pub struct EngagementRecord {
    db: sled::Db,
    posts: sled::Tree,
    comments: sled::Tree,
}

impl EngagementRecord {
    pub fn open(path: &Path) -> Result<Self, EngagementStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = sled::Config::new().path(path).open()?;
        Self::with_db(db)
    }

    /// A throwaway record that is deleted when dropped.
    pub fn temporary() -> Result<Self, EngagementStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self, EngagementStoreError> {
        ensure_schema(&db)?;
        let posts = db.open_tree(Target::Post.as_str())?;
        let comments = db.open_tree(Target::Comment.as_str())?;
        Ok(Self { db, posts, comments })
    }

    fn tree(&self, target: Target) -> &sled::Tree {
        match target {
            Target::Post => &self.posts,
            Target::Comment => &self.comments,
        }
    }

    pub fn contains(&self, target: Target, id: &str) -> Result<bool, EngagementStoreError> {
        Ok(self.tree(target).contains_key(id.as_bytes())?)
    }

    /// Returns whether the marker was newly inserted. Durable after [`Self::flush`].
    pub fn insert(&self, target: Target, id: &str) -> Result<bool, EngagementStoreError> {
        let entry = EngagementEntry { engaged_at: Utc::now().timestamp() };
        let bytes = borsh::to_vec(&entry).map_err(|_| EngagementStoreError::Serialize)?;
        let previous = self.tree(target).insert(id.as_bytes(), bytes)?;
        Ok(previous.is_none())
    }

    pub fn remove(&self, target: Target, id: &str) -> Result<bool, EngagementStoreError> {
        let previous = self.tree(target).remove(id.as_bytes())?;
        Ok(previous.is_some())
    }

    /// Blocks until every write so far is on disk.
    pub fn flush(&self) -> Result<(), EngagementStoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn ids(&self, target: Target) -> Result<HashSet<String>, EngagementStoreError> {
        let mut out = HashSet::new();
        for entry in self.tree(target).iter() {
            let (key, _value) = entry?;
            // Keys are written from &str, so this only skips foreign data.
            if let Ok(id) = std::str::from_utf8(&key) {
                out.insert(id.to_string());
            }
        }
        Ok(out)
    }

    pub fn schema_version(&self) -> Result<u32, EngagementStoreError> {
        let meta = self.db.open_tree(META_TREE)?;
        let Some(raw) = meta.get(SCHEMA_KEY)? else {
            return Err(EngagementStoreError::InvalidSchemaMarker);
        };
        let arr: [u8; 4] = raw.as_ref().try_into().map_err(|_| EngagementStoreError::InvalidSchemaMarker)?;
        Ok(u32::from_le_bytes(arr))
    }
}

fn ensure_schema(db: &sled::Db) -> Result<(), EngagementStoreError> {
    let meta = db.open_tree(META_TREE)?;
    match meta.get(SCHEMA_KEY)? {
        Some(raw) => {
            let arr: [u8; 4] = raw.as_ref().try_into().map_err(|_| EngagementStoreError::InvalidSchemaMarker)?;
            let version = u32::from_le_bytes(arr);
            if version > ENGAGEMENT_SCHEMA_VERSION {
                return Err(EngagementStoreError::UnsupportedVersion { found: version });
            }
        }
        None => {
            meta.insert(SCHEMA_KEY, &ENGAGEMENT_SCHEMA_VERSION.to_le_bytes()[..])?;
            db.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engagement.db");
        {
            let record = EngagementRecord::open(&path).unwrap();
            assert!(record.insert(Target::Post, "42").unwrap());
            assert!(!record.insert(Target::Post, "42").unwrap());
        }
        let record = EngagementRecord::open(&path).unwrap();
        assert!(record.contains(Target::Post, "42").unwrap());
        assert_eq!(record.schema_version().unwrap(), ENGAGEMENT_SCHEMA_VERSION);
    }

    #[test]
    fn flushed_removals_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engagement.db");
        let record = EngagementRecord::open(&path).unwrap();
        record.insert(Target::Comment, "9").unwrap();
        record.insert(Target::Post, "1").unwrap();
        assert!(record.remove(Target::Comment, "9").unwrap());
        record.flush().unwrap();
        drop(record);

        let record = EngagementRecord::open(&path).unwrap();
        assert!(record.contains(Target::Post, "1").unwrap());
        assert!(!record.contains(Target::Comment, "9").unwrap());
    }

    #[test]
    fn namespaces_are_independent() {
        let record = EngagementRecord::temporary().unwrap();
        record.insert(Target::Comment, "7").unwrap();
        assert!(!record.contains(Target::Post, "7").unwrap());
        assert_eq!(record.ids(Target::Comment).unwrap(), HashSet::from(["7".to_string()]));
        assert!(record.remove(Target::Comment, "7").unwrap());
        assert!(record.ids(Target::Comment).unwrap().is_empty());
    }

    #[test]
    fn rejects_future_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let db = sled::Config::new().path(&path).open().unwrap();
            let meta = db.open_tree(META_TREE).unwrap();
            meta.insert(SCHEMA_KEY, &(ENGAGEMENT_SCHEMA_VERSION + 1).to_le_bytes()[..]).unwrap();
            db.flush().unwrap();
        }
        let err = EngagementRecord::open(&path).err().unwrap();
        assert!(matches!(err, EngagementStoreError::UnsupportedVersion { .. }));
    }
}
