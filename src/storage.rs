//! SQLite persistence for types, records and the id high-water mark.
//!
//! Reads are served from snapshots; this connection is only touched on open,
//! on type declaration and on commit.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::config::DatabaseConfig;
use crate::errors::DocGraphError;
use crate::record::{Endpoints, Record, TypeDef, TypeKind};
use crate::schema::ensure_schema;
use crate::transaction::ChangeSet;
use crate::value::{Properties, RecordId};

const NEXT_RECORD_ID: &str = "next_record_id";

pub(crate) struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &Path, config: &DatabaseConfig) -> Result<Self, DocGraphError> {
        if !path.exists() && (!config.auto_create || config.read_only) {
            return Err(DocGraphError::not_found(format!(
                "database {}",
                path.display()
            )));
        }
        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(path, flags)?;
        if !config.read_only {
            ensure_schema(&conn)?;
        }
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, DocGraphError> {
        let conn = Connection::open_in_memory()?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn load_types(&self) -> Result<Vec<TypeDef>, DocGraphError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, kind FROM doc_types ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut defs = Vec::new();
        for row in rows {
            let (name, kind) = row?;
            defs.push(TypeDef {
                name,
                kind: kind.parse()?,
            });
        }
        Ok(defs)
    }

    pub fn load_records(&self) -> Result<Vec<Record>, DocGraphError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type_name, kind, version, from_id, to_id, properties
             FROM doc_records ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredRow {
                id: row.get(0)?,
                type_name: row.get(1)?,
                kind: row.get(2)?,
                version: row.get(3)?,
                from_id: row.get(4)?,
                to_id: row.get(5)?,
                properties: row.get(6)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    pub fn load_next_id(&self) -> Result<Option<u64>, DocGraphError> {
        let value: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM doc_meta WHERE key=?1",
                params![NEXT_RECORD_ID],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| v as u64))
    }

    pub fn insert_type(&self, def: &TypeDef) -> Result<(), DocGraphError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO doc_types(name, kind) VALUES(?1, ?2)",
            params![def.name, def.kind.as_str()],
        )?;
        Ok(())
    }

    /// Writes one commit inside a single SQLite transaction.
    pub fn persist(&mut self, changes: &ChangeSet, next_id: u64) -> Result<(), DocGraphError> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT OR REPLACE INTO doc_records(id, type_name, kind, version, from_id, to_id, properties)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in &changes.upserts {
                let properties = serde_json::to_string(&record.properties)?;
                let (from_id, to_id) = match record.endpoints {
                    Some(ends) => (Some(ends.from.as_u64() as i64), Some(ends.to.as_u64() as i64)),
                    None => (None, None),
                };
                upsert.execute(params![
                    record.id.as_u64() as i64,
                    record.type_name,
                    record.kind.as_str(),
                    record.version as i64,
                    from_id,
                    to_id,
                    properties,
                ])?;
            }
            let mut delete = tx.prepare_cached("DELETE FROM doc_records WHERE id=?1")?;
            for id in &changes.deletes {
                delete.execute(params![id.as_u64() as i64])?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO doc_meta(key, value) VALUES(?1, ?2)",
                params![NEXT_RECORD_ID, next_id as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

struct StoredRow {
    id: i64,
    type_name: String,
    kind: String,
    version: i64,
    from_id: Option<i64>,
    to_id: Option<i64>,
    properties: String,
}

impl StoredRow {
    fn into_record(self) -> Result<Record, DocGraphError> {
        let kind: TypeKind = self.kind.parse()?;
        let properties: Properties = serde_json::from_str(&self.properties)?;
        let endpoints = match (kind, self.from_id, self.to_id) {
            (TypeKind::Edge, Some(from), Some(to)) => Some(Endpoints {
                from: RecordId::new(from as u64),
                to: RecordId::new(to as u64),
            }),
            (TypeKind::Edge, _, _) => {
                return Err(DocGraphError::storage(format!(
                    "edge #{} is missing an endpoint",
                    self.id
                )));
            }
            _ => None,
        };
        Ok(Record {
            id: RecordId::new(self.id as u64),
            type_name: self.type_name,
            kind,
            version: self.version as u64,
            properties,
            endpoints,
        })
    }
}
