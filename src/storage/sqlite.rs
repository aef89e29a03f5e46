//! SQLite storage backend
//!
//! Dates are stored as ISO-8601 `YYYY-MM-DD` text so range predicates
//! compare lexicographically. Decimals are stored as text to keep them exact.

use super::traits::{AttributeStore, GraphStore, OpenStore, StorageError, StorageResult};
use crate::model::{AttributeRecord, Node, NodeId, NodeKind, Position};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed snapshot store
///
/// Uses a single database file with tables for nodes, positions, and
/// attribute records. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS positions (
                parent_id INTEGER NOT NULL,
                child_id INTEGER NOT NULL,
                quantity TEXT,
                weight TEXT,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                CHECK (parent_id <> child_id)
            );

            CREATE INDEX IF NOT EXISTS idx_positions_parent
                ON positions(parent_id, effective_from);

            CREATE TABLE IF NOT EXISTS attribute_records (
                node_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                as_of_date TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                PRIMARY KEY (node_id, category, as_of_date)
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("connection lock poisoned: {}", e)))
    }

    // === Loading helpers ===

    pub fn insert_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO nodes (id, kind) VALUES (?1, ?2)",
            params![node.id.get(), node.kind.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_position(&self, position: &Position) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO positions
                (parent_id, child_id, quantity, weight, effective_from, effective_to)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                position.parent.get(),
                position.child.get(),
                position.quantity.map(|q| q.to_string()),
                position.weight.map(|w| w.to_string()),
                format_date(position.effective_from),
                position.effective_to.map(format_date),
            ],
        )?;
        Ok(())
    }

    pub fn insert_record(&self, record: &AttributeRecord) -> StorageResult<()> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO attribute_records (node_id, category, as_of_date, fields_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.node.get(),
                record.category,
                format_date(record.as_of),
                fields_json
            ],
        )?;
        Ok(())
    }

    fn row_to_position(
        parent: i64,
        child: i64,
        quantity: Option<String>,
        weight: Option<String>,
        effective_from: String,
        effective_to: Option<String>,
    ) -> StorageResult<Position> {
        Ok(Position {
            parent: NodeId::new(parent),
            child: NodeId::new(child),
            quantity: quantity.as_deref().map(parse_decimal).transpose()?,
            weight: weight.as_deref().map(parse_decimal).transpose()?,
            effective_from: parse_date(&effective_from)?,
            effective_to: effective_to.as_deref().map(parse_date).transpose()?,
        })
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| StorageError::DateParse(format!("{}: {}", s, e)))
}

fn parse_decimal(s: &str) -> StorageResult<Decimal> {
    Decimal::from_str(s).map_err(|e| StorageError::Decimal(format!("{}: {}", s, e)))
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    fn edges_from(&self, node: NodeId, as_of: NaiveDate) -> StorageResult<Vec<Position>> {
        let conn = self.conn()?;
        let as_of = format_date(as_of);

        let mut stmt = conn.prepare(
            "SELECT parent_id, child_id, quantity, weight, effective_from, effective_to
             FROM positions
             WHERE parent_id = ?1
               AND effective_from <= ?2
               AND (effective_to IS NULL OR effective_to > ?2)
             ORDER BY child_id",
        )?;

        let rows = stmt.query_map(params![node.get(), as_of], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut positions = Vec::new();
        for row in rows {
            let (parent, child, quantity, weight, from, to) = row?;
            positions.push(Self::row_to_position(parent, child, quantity, weight, from, to)?);
        }

        Ok(positions)
    }

    fn node_kind(&self, node: NodeId) -> StorageResult<Option<NodeKind>> {
        let conn = self.conn()?;
        let kind = conn
            .query_row(
                "SELECT kind FROM nodes WHERE id = ?1",
                params![node.get()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(kind.map(NodeKind::from))
    }
}

impl AttributeStore for SqliteStore {
    fn lookup(
        &self,
        node: NodeId,
        category: &str,
        as_of: NaiveDate,
    ) -> StorageResult<Option<AttributeRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT as_of_date, fields_json FROM attribute_records
                 WHERE node_id = ?1 AND category = ?2 AND as_of_date <= ?3
                 ORDER BY as_of_date DESC
                 LIMIT 1",
                params![node.get(), category, format_date(as_of)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((date, fields_json)) => Ok(Some(AttributeRecord {
                node,
                category: category.to_string(),
                as_of: parse_date(&date)?,
                fields: serde_json::from_str(&fields_json)?,
            })),
            None => Ok(None),
        }
    }
}
