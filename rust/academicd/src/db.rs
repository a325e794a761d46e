use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::api::FormInstance;
use crate::forms::template::FormTemplate;

pub const DB_FILE: &str = "academicd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS form_templates(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            template_json TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS form_instances(
            id TEXT PRIMARY KEY,
            template_id TEXT,
            instance_json TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        )",
        [],
    )?;
    // Caches written before status filtering existed lack this column.
    ensure_instances_approve_status(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_form_instances_template ON form_instances(template_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_instances_approve_status(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "form_instances", "approve_status")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE form_instances ADD COLUMN approve_status TEXT NOT NULL DEFAULT 'pending'",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTemplate {
    pub id: String,
    pub title: String,
    pub fingerprint: String,
    pub fetched_at: String,
}

pub fn template_put(conn: &Connection, template: &FormTemplate, fingerprint: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO form_templates(id, title, template_json, fingerprint, fetched_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           template_json = excluded.template_json,
           fingerprint = excluded.fingerprint,
           fetched_at = excluded.fetched_at",
        (
            &template.id,
            &template.title,
            serde_json::to_string(template)?,
            fingerprint,
            now(),
        ),
    )?;
    Ok(())
}

pub fn template_get(conn: &Connection, id: &str) -> anyhow::Result<Option<FormTemplate>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT template_json FROM form_templates WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn templates_list(conn: &Connection) -> anyhow::Result<Vec<CachedTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, fingerprint, fetched_at FROM form_templates ORDER BY title, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CachedTemplate {
                id: row.get(0)?,
                title: row.get(1)?,
                fingerprint: row.get(2)?,
                fetched_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replaces the cached instance list with a fresh copy from the backend.
pub fn instances_replace(conn: &Connection, instances: &[FormInstance]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM form_instances", [])?;
    let fetched_at = now();
    for inst in instances {
        tx.execute(
            "INSERT OR REPLACE INTO form_instances(id, template_id, approve_status, instance_json, fetched_at)
             VALUES(?, ?, ?, ?, ?)",
            (
                &inst.id,
                &inst.template_id,
                inst.approve_status().as_str(),
                serde_json::to_string(inst)?,
                &fetched_at,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn instances_list(conn: &Connection, status: Option<&str>) -> anyhow::Result<Vec<FormInstance>> {
    let mut stmt = conn.prepare(
        "SELECT instance_json FROM form_instances
         WHERE (?1 IS NULL OR approve_status = ?1)
         ORDER BY fetched_at DESC, id",
    )?;
    let raw = stmt
        .query_map([status], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        out.push(serde_json::from_str(&s)?);
    }
    Ok(out)
}

pub fn instance_remove(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM form_instances WHERE id = ?", [id])?;
    Ok(n > 0)
}
