//! SQLite-backed ledger store: single-writer connection in WAL mode, with
//! the full schema created in `open()`.
//!
//! The whole store is one `Mutex<Connection>` critical section: sequence
//! allocation, previous_hash read, entry insert, block bookkeeping, and
//! optional seal must happen as one atomic step, and readers that need a
//! consistent view take the same lock rather than risk a torn read of an
//! in-flight append.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{GovernanceError, GovernanceResult};
use crate::merkle::MerkleProof;
use crate::merkle::MerkleTree;

use super::{LedgerBlock, LedgerEntry, LedgerEvent, LedgerStatistics};

pub struct LedgerStore {
    conn: Mutex<Connection>,
    block_size: usize,
}

impl LedgerStore {
    pub fn open(db_path: &Path, block_size: usize) -> GovernanceResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GovernanceError::Persistence(e.to_string()))?;
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS ledger_blocks (
                block_number   INTEGER PRIMARY KEY,
                first_sequence INTEGER NOT NULL,
                last_sequence  INTEGER NOT NULL,
                entry_count    INTEGER NOT NULL,
                merkle_root    TEXT,
                sealed_at      TEXT,
                is_verified    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                sequence_number INTEGER PRIMARY KEY,
                event_json      TEXT NOT NULL,
                previous_hash   TEXT,
                entry_hash      TEXT NOT NULL,
                block_id        INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                FOREIGN KEY(block_id) REFERENCES ledger_blocks(block_number)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_block ON ledger_entries(block_id);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn), block_size })
    }

    pub fn open_in_memory(block_size: usize) -> GovernanceResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r#"
            CREATE TABLE ledger_blocks (
                block_number   INTEGER PRIMARY KEY,
                first_sequence INTEGER NOT NULL,
                last_sequence  INTEGER NOT NULL,
                entry_count    INTEGER NOT NULL,
                merkle_root    TEXT,
                sealed_at      TEXT,
                is_verified    INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE ledger_entries (
                sequence_number INTEGER PRIMARY KEY,
                event_json      TEXT NOT NULL,
                previous_hash   TEXT,
                entry_hash      TEXT NOT NULL,
                block_id        INTEGER NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX idx_entries_block ON ledger_entries(block_id);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn), block_size })
    }

    /// Append one event, assigning the next sequence number, chaining it to
    /// the previous entry's hash, and sealing the current block if it is
    /// now full. Atomic: either the entry and its block bookkeeping both
    /// land, or neither does.
    pub fn append_event(&self, event: LedgerEvent) -> GovernanceResult<LedgerEntry> {
        let mut conn = self.conn.lock().expect("ledger store mutex poisoned");
        let tx = conn.transaction()?;

        let prev_seq: Option<u64> = tx.query_row(
            "SELECT MAX(sequence_number) FROM ledger_entries",
            [],
            |row| row.get(0),
        )?;

        let sequence_number = prev_seq.unwrap_or(0) + 1;
        let previous_hash: Option<String> = match prev_seq {
            None => None,
            Some(seq) => Some(tx.query_row(
                "SELECT entry_hash FROM ledger_entries WHERE sequence_number = ?1",
                params![seq],
                |row| row.get(0),
            )?),
        };

        // Find (or open) the current unsealed block.
        let open_block: Option<(u64, u64)> = tx
            .query_row(
                "SELECT block_number, entry_count FROM ledger_blocks
                 WHERE sealed_at IS NULL ORDER BY block_number DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let block_number = match open_block {
            Some((bn, _)) => bn,
            None => {
                let next_bn: u64 = tx
                    .query_row("SELECT COALESCE(MAX(block_number), 0) + 1 FROM ledger_blocks", [], |r| r.get(0))?;
                tx.execute(
                    "INSERT INTO ledger_blocks (block_number, first_sequence, last_sequence, entry_count, merkle_root, sealed_at, is_verified)
                     VALUES (?1, ?2, ?2, 0, NULL, NULL, 0)",
                    params![next_bn, sequence_number],
                )?;
                next_bn
            }
        };

        let created_at = Utc::now();
        let entry_hash =
            LedgerEntry::compute_hash(sequence_number, &event, &previous_hash, &created_at);

        tx.execute(
            "INSERT INTO ledger_entries (sequence_number, event_json, previous_hash, entry_hash, block_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                sequence_number,
                serde_json::to_string(&event)?,
                previous_hash,
                entry_hash,
                block_number,
                created_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            "UPDATE ledger_blocks SET entry_count = entry_count + 1, last_sequence = ?1 WHERE block_number = ?2",
            params![sequence_number, block_number],
        )?;

        let entry = LedgerEntry {
            sequence_number,
            event,
            previous_hash,
            entry_hash,
            block_id: block_number,
            created_at,
        };

        let entry_count: usize = tx.query_row(
            "SELECT entry_count FROM ledger_blocks WHERE block_number = ?1",
            params![block_number],
            |row| row.get(0),
        )?;

        if entry_count >= self.block_size {
            seal_block_tx(&tx, block_number)?;
        }

        tx.commit()?;
        Ok(entry)
    }

    pub fn get_entry(&self, sequence_number: u64) -> GovernanceResult<Option<LedgerEntry>> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        read_entry(&conn, sequence_number)
    }

    pub fn get_block(&self, block_number: u64) -> GovernanceResult<Option<LedgerBlock>> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        read_block(&conn, block_number)
    }

    pub fn get_block_entries(&self, block_number: u64) -> GovernanceResult<Vec<LedgerEntry>> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT sequence_number FROM ledger_entries WHERE block_id = ?1 ORDER BY sequence_number ASC",
        )?;
        let seqs: Vec<u64> = stmt
            .query_map(params![block_number], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        seqs.into_iter()
            .map(|seq| {
                read_entry(&conn, seq)?.ok_or_else(|| {
                    GovernanceError::Persistence(format!("dangling entry reference seq={seq}"))
                })
            })
            .collect()
    }

    /// Recompute each entry's hash and chain linkage across `[start, end]`
    /// (inclusive); `end` defaults to the latest sequence number.
    pub fn verify_chain_integrity(&self, start: u64, end: Option<u64>) -> GovernanceResult<bool> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let last_seq: u64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM ledger_entries",
            [],
            |row| row.get(0),
        )?;
        let end = end.unwrap_or(last_seq).min(last_seq);
        let start = start.max(1);
        if start > end {
            return Ok(true);
        }

        let mut prior_hash: Option<String> = if start > 1 {
            read_entry(&conn, start - 1)?.map(|e| e.entry_hash)
        } else {
            None
        };

        for seq in start..=end {
            let entry = match read_entry(&conn, seq)? {
                Some(e) => e,
                None => return Ok(false),
            };
            if entry.recompute_hash() != entry.entry_hash {
                return Ok(false);
            }
            if entry.previous_hash != prior_hash {
                return Ok(false);
            }
            prior_hash = Some(entry.entry_hash.clone());
        }
        Ok(true)
    }

    pub fn verify_block_integrity(&self, block_number: u64) -> GovernanceResult<bool> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let block = match read_block(&conn, block_number)? {
            Some(b) => b,
            None => return Err(GovernanceError::NotFound(format!("block {block_number}"))),
        };
        let Some(expected_root) = block.merkle_root.clone() else {
            return Ok(false);
        };

        drop(conn);
        let entries = self.get_block_entries(block_number)?;
        for entry in &entries {
            if entry.recompute_hash() != entry.entry_hash {
                return Ok(false);
            }
        }
        let hashes: Vec<String> = entries.iter().map(|e| e.entry_hash.clone()).collect();
        let Some(tree) = MerkleTree::build(&hashes) else {
            return Ok(false);
        };
        Ok(tree.root() == expected_root)
    }

    /// Merkle inclusion proof for the entry at `sequence_number`, within its
    /// (sealed) block.
    pub fn get_proof(&self, sequence_number: u64) -> GovernanceResult<Option<MerkleProof>> {
        let entry = match self.get_entry(sequence_number)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let entries = self.get_block_entries(entry.block_id)?;
        let hashes: Vec<String> = entries.iter().map(|e| e.entry_hash.clone()).collect();
        let Some(tree) = MerkleTree::build(&hashes) else {
            return Ok(None);
        };
        let index = entries
            .iter()
            .position(|e| e.sequence_number == sequence_number)
            .expect("entry belongs to the block it was fetched from");
        Ok(tree.proof(index))
    }

    /// Idempotent manual seal of whatever block is currently open.
    pub fn seal_current_block(&self) -> GovernanceResult<Option<u64>> {
        let mut conn = self.conn.lock().expect("ledger store mutex poisoned");
        let tx = conn.transaction()?;
        let open_block: Option<u64> = tx
            .query_row(
                "SELECT block_number FROM ledger_blocks WHERE sealed_at IS NULL ORDER BY block_number DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let result = match open_block {
            Some(bn) => {
                seal_block_tx(&tx, bn)?;
                Some(bn)
            }
            None => None,
        };
        tx.commit()?;
        Ok(result)
    }

    pub fn get_ledger_statistics(&self) -> GovernanceResult<LedgerStatistics> {
        let conn = self.conn.lock().expect("ledger store mutex poisoned");
        let total_entries: u64 =
            conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
        let total_blocks: u64 =
            conn.query_row("SELECT COUNT(*) FROM ledger_blocks", [], |row| row.get(0))?;
        let sealed_blocks: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ledger_blocks WHERE sealed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let latest_sequence: u64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM ledger_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(LedgerStatistics {
            total_entries,
            total_blocks,
            sealed_blocks,
            unsealed_blocks: total_blocks - sealed_blocks,
            latest_sequence,
        })
    }
}

fn seal_block_tx(tx: &rusqlite::Transaction, block_number: u64) -> GovernanceResult<()> {
    let already_sealed: Option<String> = tx
        .query_row(
            "SELECT sealed_at FROM ledger_blocks WHERE block_number = ?1",
            params![block_number],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    if already_sealed.is_some() {
        return Ok(());
    }

    let mut stmt = tx.prepare(
        "SELECT entry_hash FROM ledger_entries WHERE block_id = ?1 ORDER BY sequence_number ASC",
    )?;
    let hashes: Vec<String> = stmt
        .query_map(params![block_number], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let Some(tree) = MerkleTree::build(&hashes) else {
        // No entries to seal over (shouldn't happen: a block is only created
        // alongside its first entry).
        return Ok(());
    };

    tx.execute(
        "UPDATE ledger_blocks SET merkle_root = ?1, sealed_at = ?2, is_verified = 1 WHERE block_number = ?3",
        params![tree.root(), Utc::now().to_rfc3339(), block_number],
    )?;
    tracing::info!(block_number, root = tree.root(), "sealed ledger block");
    Ok(())
}

fn read_entry(conn: &Connection, sequence_number: u64) -> GovernanceResult<Option<LedgerEntry>> {
    conn.query_row(
        "SELECT sequence_number, event_json, previous_hash, entry_hash, block_id, created_at
         FROM ledger_entries WHERE sequence_number = ?1",
        params![sequence_number],
        |row| {
            let event_json: String = row.get(1)?;
            let created_at: String = row.get(5)?;
            Ok((
                row.get::<_, u64>(0)?,
                event_json,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u64>(4)?,
                created_at,
            ))
        },
    )
    .optional()?
    .map(|(seq, event_json, previous_hash, entry_hash, block_id, created_at)| {
        Ok(LedgerEntry {
            sequence_number: seq,
            event: serde_json::from_str(&event_json)?,
            previous_hash,
            entry_hash,
            block_id,
            created_at: created_at
                .parse()
                .map_err(|e| GovernanceError::Persistence(format!("bad timestamp: {e}")))?,
        })
    })
    .transpose()
}

fn read_block(conn: &Connection, block_number: u64) -> GovernanceResult<Option<LedgerBlock>> {
    conn.query_row(
        "SELECT block_number, first_sequence, last_sequence, entry_count, merkle_root, sealed_at, is_verified
         FROM ledger_blocks WHERE block_number = ?1",
        params![block_number],
        |row| {
            let sealed_at: Option<String> = row.get(5)?;
            Ok(LedgerBlock {
                block_number: row.get(0)?,
                first_sequence: row.get(1)?,
                last_sequence: row.get(2)?,
                entry_count: row.get::<_, i64>(3)? as usize,
                merkle_root: row.get(4)?,
                sealed_at: sealed_at.and_then(|s| s.parse().ok()),
                is_verified: row.get::<_, i64>(6)? != 0,
            })
        },
    )
    .optional()
    .map_err(GovernanceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EventType, LedgerEvent};

    fn store() -> LedgerStore {
        LedgerStore::open_in_memory(100).unwrap()
    }

    fn evt(actor: &str) -> LedgerEvent {
        LedgerEvent::new(EventType::ToolCall, actor, "call")
    }

    #[test]
    fn s1_chain_round_trip() {
        let s = store();
        let e1 = s.append_event(evt("A")).unwrap();
        let e2 = s.append_event(evt("B")).unwrap();
        let e3 = s.append_event(evt("C")).unwrap();

        assert_eq!((e1.sequence_number, e2.sequence_number, e3.sequence_number), (1, 2, 3));
        assert!(e1.previous_hash.is_none());
        assert_eq!(e2.previous_hash.as_deref(), Some(e1.entry_hash.as_str()));
        assert_eq!(e3.previous_hash.as_deref(), Some(e2.entry_hash.as_str()));
        assert!(s.verify_chain_integrity(1, None).unwrap());
    }

    #[test]
    fn s1_tampered_entry_breaks_chain_integrity() {
        let s = store();
        s.append_event(evt("A")).unwrap();
        s.append_event(evt("B")).unwrap();
        s.append_event(evt("C")).unwrap();

        {
            let conn = s.conn.lock().unwrap();
            conn.execute(
                "UPDATE ledger_entries SET entry_hash = 'deadbeef' WHERE sequence_number = 2",
                [],
            )
            .unwrap();
        }
        assert!(!s.verify_chain_integrity(1, None).unwrap());
    }

    #[test]
    fn s2_merkle_proof_over_sealed_block() {
        let s = store();
        s.append_event(evt("A")).unwrap();
        s.append_event(evt("B")).unwrap();
        s.append_event(evt("C")).unwrap();
        s.seal_current_block().unwrap();

        let proof = s.get_proof(1).unwrap().unwrap();
        assert_eq!(proof.path.len(), 2);
        assert!(proof.verify());

        let mut tampered = proof.clone();
        tampered.leaf_hash.push('0');
        assert!(!tampered.verify());

        assert!(s.verify_block_integrity(1).unwrap());
    }

    #[test]
    fn sealing_at_block_size_is_automatic() {
        let s = LedgerStore::open_in_memory(2).unwrap();
        s.append_event(evt("A")).unwrap();
        let stats = s.get_ledger_statistics().unwrap();
        assert_eq!(stats.sealed_blocks, 0);
        s.append_event(evt("B")).unwrap();
        let block = s.get_block(1).unwrap().unwrap();
        assert!(block.is_sealed());
    }

    #[test]
    fn reseal_is_a_no_op() {
        let s = store();
        s.append_event(evt("A")).unwrap();
        s.seal_current_block().unwrap();
        let root_before = s.get_block(1).unwrap().unwrap().merkle_root;
        s.seal_current_block().unwrap();
        let root_after = s.get_block(1).unwrap().unwrap().merkle_root;
        assert_eq!(root_before, root_after);
    }

    #[test]
    fn sequence_numbers_are_contiguous() {
        let s = store();
        for i in 0..10 {
            let e = s.append_event(evt(&format!("actor{i}"))).unwrap();
            assert_eq!(e.sequence_number, i + 1);
        }
    }
}
