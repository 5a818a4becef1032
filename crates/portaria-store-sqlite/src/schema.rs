//! SQL schema for the Portaria SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id   TEXT PRIMARY KEY,
    subject_key  TEXT NOT NULL UNIQUE,
    kind         TEXT NOT NULL,            -- 'employee' | 'vehicle' | 'visitor'
    profile_json TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);

-- Events are append-only; rows leave only through explicit batch deletes.
-- No foreign key to subjects: history outlives a deleted profile.
CREATE TABLE IF NOT EXISTS events (
    event_id     TEXT PRIMARY KEY,
    subject_key  TEXT NOT NULL,            -- '' for legacy rows
    kind         TEXT NOT NULL,
    direction    TEXT NOT NULL,            -- 'entry' | 'exit'
    recorded_at  TEXT NOT NULL,            -- fixed-width RFC 3339 UTC
    visit_id     TEXT NOT NULL,
    display_name TEXT NOT NULL,
    context_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS events_subject_idx
    ON events(subject_key, recorded_at, event_id);
CREATE INDEX IF NOT EXISTS events_recorded_idx ON events(recorded_at);
CREATE INDEX IF NOT EXISTS events_kind_idx     ON events(kind);

PRAGMA user_version = 1;
";
