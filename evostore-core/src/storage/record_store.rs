use crate::error::Result;
use crate::types::{ModelId, ModelRecord};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite persistence for model records, one row per model:
/// `{data_dir}/meta.sqlite3`.
pub struct RecordStore {
    db_path: PathBuf,
}

impl RecordStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let store = Self {
            db_path: data_dir.join("meta.sqlite3"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn get_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS model_records (
                model_id INTEGER PRIMARY KEY,
                seq INTEGER NOT NULL,
                record TEXT NOT NULL,
                stored_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_model_records_seq ON model_records(seq)",
            [],
        )?;

        Ok(())
    }

    pub fn upsert_record(&self, record: &ModelRecord) -> Result<()> {
        let conn = self.get_conn()?;
        let body = serde_json::to_string(record)?;

        conn.execute(
            "INSERT INTO model_records (model_id, seq, record, stored_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(model_id) DO UPDATE SET
                seq = excluded.seq,
                record = excluded.record,
                stored_at = excluded.stored_at",
            params![
                record.model_id as i64,
                record.seq as i64,
                body,
                record.stored_at.to_rfc3339()
            ],
        )?;

        Ok(())
    }

    pub fn delete_record(&self, model_id: ModelId) -> Result<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM model_records WHERE model_id = ?1",
            params![model_id as i64],
        )?;
        Ok(removed > 0)
    }

    pub fn get_record(&self, model_id: ModelId) -> Result<Option<ModelRecord>> {
        let conn = self.get_conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT record FROM model_records WHERE model_id = ?1",
                params![model_id as i64],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// All records in commit order.
    pub fn load_records(&self) -> Result<Vec<ModelRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT record FROM model_records ORDER BY seq ASC")?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            records.push(serde_json::from_str(&body)?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(model_id: ModelId, seq: u64) -> ModelRecord {
        let mut record =
            ModelRecord::from_parts(model_id, vec![0, 1], &[0, 1], &[1, 1], &[80, 80], 0.25)
                .unwrap();
        record.seq = seq;
        record
    }

    #[test]
    fn test_upsert_and_load_in_commit_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        store.upsert_record(&record(5, 2)).unwrap();
        store.upsert_record(&record(9, 1)).unwrap();
        store.upsert_record(&record(5, 3)).unwrap();

        let loaded = store.load_records().unwrap();
        let order: Vec<(ModelId, u64)> = loaded.iter().map(|r| (r.model_id, r.seq)).collect();
        assert_eq!(order, vec![(9, 1), (5, 3)]);

        let fetched = store.get_record(5).unwrap().unwrap();
        assert_eq!(fetched, loaded[1]);
    }

    #[test]
    fn test_delete_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        store.upsert_record(&record(u64::MAX, 1)).unwrap();
        assert!(store.get_record(u64::MAX).unwrap().is_some());
        assert!(store.delete_record(u64::MAX).unwrap());
        assert!(!store.delete_record(u64::MAX).unwrap());
        assert!(store.get_record(u64::MAX).unwrap().is_none());
    }
}
