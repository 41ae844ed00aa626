//! Database migrations for codex-mem

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Run all pending SQLite migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Memories (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            project TEXT NOT NULL CHECK (project <> ''),
            type TEXT NOT NULL DEFAULT 'discovery',
            tags TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '',
            concepts TEXT NOT NULL DEFAULT '[]',
            files_read TEXT NOT NULL DEFAULT '[]',
            files_modified TEXT NOT NULL DEFAULT '[]',
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_memories_project_created
            ON memories(project, created_at_epoch DESC);
        CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Conversation turns (v2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            created_at_epoch INTEGER NOT NULL,
            project TEXT NOT NULL CHECK (project <> ''),
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant', 'tool')),
            content TEXT NOT NULL,
            context_json TEXT NOT NULL DEFAULT '{}',
            metadata_json TEXT NOT NULL DEFAULT '{}'
        );

        CREATE INDEX IF NOT EXISTS idx_turns_project_session_created
            ON conversation_turns(project, session_id, created_at_epoch DESC);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;

    Ok(())
}

/// PostgreSQL schema, applied statement by statement; every statement is idempotent
pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS memories (
        id BIGSERIAL PRIMARY KEY,
        created_at TEXT NOT NULL,
        created_at_epoch BIGINT NOT NULL,
        project TEXT NOT NULL CHECK (project <> ''),
        type TEXT NOT NULL DEFAULT 'discovery',
        tags TEXT NOT NULL DEFAULT '',
        summary TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '',
        concepts TEXT NOT NULL DEFAULT '[]',
        files_read TEXT NOT NULL DEFAULT '[]',
        files_modified TEXT NOT NULL DEFAULT '[]',
        metadata_json TEXT NOT NULL DEFAULT '{}'
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_memories_project_created ON memories(project, created_at_epoch DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type)",
    r#"CREATE TABLE IF NOT EXISTS conversation_turns (
        id BIGSERIAL PRIMARY KEY,
        created_at TEXT NOT NULL,
        created_at_epoch BIGINT NOT NULL,
        project TEXT NOT NULL CHECK (project <> ''),
        session_id TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('system', 'user', 'assistant', 'tool')),
        content TEXT NOT NULL,
        context_json TEXT NOT NULL DEFAULT '{}',
        metadata_json TEXT NOT NULL DEFAULT '{}'
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_turns_project_session_created ON conversation_turns(project, session_id, created_at_epoch DESC)",
];
