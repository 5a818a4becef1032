//! [`SqliteStore`]: the SQLite implementation of [`AccessStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use portaria_core::{
  event::{NewEvent, VisitEvent},
  store::{
    AccessStore, Appended, CHANGE_FEED_CAPACITY, Change, DeletePolicy,
    EventQuery, ImportSummary,
  },
  subject::{NewSubject, Subject, SubjectKey, SubjectKind},
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, RawEvent, RawSubject, SUBJECT_COLUMNS, encode_dt,
    encode_uuid, storable,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Portaria access store backed by a single SQLite file.
///
/// Cloning is cheap; clones share the connection and the change feed.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  changes: broadcast::Sender<Change>,
}

/// Outcome of the conditional insert, before decoding.
enum RawAppend {
  Recorded,
  Stale(Option<RawEvent>),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
    Ok(Self { conn, changes })
  }

  fn publish(&self, change: Change) {
    // No subscribers is not an error.
    let _ = self.changes.send(change);
  }

  async fn subject_where(
    &self,
    column: &'static str,
    value: String,
  ) -> Result<Option<Subject>> {
    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE {column} = ?1"),
              rusqlite::params![value],
              RawSubject::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn event_where(
    &self,
    sql_tail: &'static str,
    value: String,
  ) -> Result<Option<VisitEvent>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {EVENT_COLUMNS} FROM events {sql_tail}"),
              rusqlite::params![value],
              RawEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }
}

const LATEST_FOR_KEY: &str = "WHERE subject_key = ?1 \
                              ORDER BY recorded_at DESC, event_id DESC LIMIT 1";

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Build the `WHERE` / `ORDER BY` / `LIMIT` tail for an [`EventQuery`].
fn event_query_sql(query: &EventQuery) -> (String, Vec<Value>) {
  let mut conds: Vec<&'static str> = Vec::new();
  let mut params: Vec<Value> = Vec::new();

  if let Some(kind) = query.kind {
    conds.push("kind = ?");
    params.push(Value::Text(kind.as_ref().to_owned()));
  }
  if let Some(key) = &query.subject_key {
    conds.push("subject_key = ?");
    params.push(Value::Text(key.as_str().to_owned()));
  }
  if let Some(direction) = query.direction {
    conds.push("direction = ?");
    params.push(Value::Text(direction.as_ref().to_owned()));
  }
  if let Some(since) = query.since {
    conds.push("recorded_at >= ?");
    params.push(Value::Text(encode_dt(since)));
  }
  if let Some(until) = query.until {
    conds.push("recorded_at < ?");
    params.push(Value::Text(encode_dt(until)));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  let order = if query.newest_first { "DESC" } else { "ASC" };
  let limit = query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
  params.push(Value::Integer(limit));

  (
    format!(
      "SELECT {EVENT_COLUMNS} FROM events {where_clause} \
       ORDER BY recorded_at {order}, event_id {order} LIMIT ?"
    ),
    params,
  )
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn add_subject(&self, input: NewSubject) -> Result<Subject> {
    let mut subject = Subject::from_new(input)?;
    subject.created_at = storable(subject.created_at);
    let raw = RawSubject::encode(&subject)?;

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          &format!(
            "INSERT INTO subjects ({SUBJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
          ),
          rusqlite::params![
            raw.subject_id,
            raw.subject_key,
            raw.kind,
            raw.profile_json,
            raw.active,
            raw.created_at,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateSubject(subject.key));
    }
    self.publish(Change::SubjectAdded { subject: subject.clone() });
    Ok(subject)
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    self.subject_where("subject_id", encode_uuid(id)).await
  }

  async fn get_subject_by_key(&self, key: SubjectKey) -> Result<Option<Subject>> {
    self
      .subject_where("subject_key", key.as_str().to_owned())
      .await
  }

  async fn list_subjects(
    &self,
    kind: Option<SubjectKind>,
    include_inactive: bool,
  ) -> Result<Vec<Subject>> {
    let kind_str = kind.map(|k| k.as_ref().to_owned());

    let raws: Vec<RawSubject> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUBJECT_COLUMNS} FROM subjects
           WHERE (?1 IS NULL OR kind = ?1) AND (?2 OR active)
           ORDER BY created_at, subject_id"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![kind_str, include_inactive],
            RawSubject::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn update_subject(&self, subject: Subject) -> Result<Subject> {
    let raw = RawSubject::encode(&subject)?;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subjects SET profile_json = ?2, active = ?3 WHERE subject_id = ?1",
          rusqlite::params![raw.subject_id, raw.profile_json, raw.active],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::SubjectNotFound(subject.subject_id));
    }
    self.publish(Change::SubjectUpdated { subject: subject.clone() });
    Ok(subject)
  }

  async fn delete_subjects(
    &self,
    ids: Vec<Uuid>,
    policy: DeletePolicy,
  ) -> Result<usize> {
    let id_strs: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
    let cascade = policy == DeletePolicy::Cascade;

    let (removed, dropped): (Vec<String>, Vec<String>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = Vec::new();
        let mut dropped = Vec::new();
        for id in id_strs {
          let key: Option<String> = tx
            .query_row(
              "SELECT subject_key FROM subjects WHERE subject_id = ?1",
              rusqlite::params![id],
              |r| r.get(0),
            )
            .optional()?;
          let Some(key) = key else { continue };

          tx.execute(
            "DELETE FROM subjects WHERE subject_id = ?1",
            rusqlite::params![id],
          )?;
          removed.push(id);

          if cascade {
            let mut stmt =
              tx.prepare("SELECT event_id FROM events WHERE subject_key = ?1")?;
            let events = stmt
              .query_map(rusqlite::params![key], |r| r.get::<_, String>(0))?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            drop(stmt);
            tx.execute(
              "DELETE FROM events WHERE subject_key = ?1",
              rusqlite::params![key],
            )?;
            dropped.extend(events);
          }
        }
        tx.commit()?;
        Ok((removed, dropped))
      })
      .await?;

    let removed: Vec<Uuid> = removed
      .iter()
      .map(|s| Uuid::parse_str(s))
      .collect::<std::result::Result<_, _>>()?;
    let dropped: Vec<Uuid> = dropped
      .iter()
      .map(|s| Uuid::parse_str(s))
      .collect::<std::result::Result<_, _>>()?;

    let count = removed.len();
    if count > 0 {
      self.publish(Change::SubjectsDeleted { ids: removed });
    }
    if !dropped.is_empty() {
      self.publish(Change::EventsDeleted { ids: dropped });
    }
    Ok(count)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn append_if_latest(
    &self,
    mut input: NewEvent,
    expected: Option<Uuid>,
  ) -> Result<Appended> {
    input.recorded_at = storable(input.recorded_at);
    let event = VisitEvent::from_new(input);
    let raw = RawEvent::encode(&event)?;
    let expected = expected.map(encode_uuid);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let latest: Option<RawEvent> = tx
          .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events {LATEST_FOR_KEY}"),
            rusqlite::params![raw.subject_key],
            RawEvent::from_row,
          )
          .optional()?;

        if latest.as_ref().map(|e| &e.event_id) != expected.as_ref() {
          return Ok(RawAppend::Stale(latest));
        }
        raw.insert(&tx, false)?;
        tx.commit()?;
        Ok(RawAppend::Recorded)
      })
      .await?;

    match outcome {
      RawAppend::Recorded => {
        self.publish(Change::EventAppended { event: event.clone() });
        Ok(Appended::Recorded(event))
      }
      RawAppend::Stale(latest) => {
        tracing::debug!(key = %event.subject_key, "conditional append lost");
        Ok(Appended::Stale {
          latest: latest.map(RawEvent::into_event).transpose()?,
        })
      }
    }
  }

  async fn get_event(&self, id: Uuid) -> Result<Option<VisitEvent>> {
    self.event_where("WHERE event_id = ?1", encode_uuid(id)).await
  }

  async fn latest_event(&self, key: SubjectKey) -> Result<Option<VisitEvent>> {
    self
      .event_where(LATEST_FOR_KEY, key.as_str().to_owned())
      .await
  }

  async fn list_events(&self, query: EventQuery) -> Result<Vec<VisitEvent>> {
    let (sql, params) = event_query_sql(&query);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn delete_events(&self, ids: Vec<Uuid>) -> Result<usize> {
    let id_strs: Vec<(Uuid, String)> =
      ids.into_iter().map(|id| (id, encode_uuid(id))).collect();

    let removed: Vec<Uuid> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = Vec::new();
        for (id, id_str) in id_strs {
          let n = tx.execute(
            "DELETE FROM events WHERE event_id = ?1",
            rusqlite::params![id_str],
          )?;
          if n > 0 {
            removed.push(id);
          }
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;

    let count = removed.len();
    if count > 0 {
      self.publish(Change::EventsDeleted { ids: removed });
    }
    Ok(count)
  }

  async fn delete_events_for(&self, keys: Vec<SubjectKey>) -> Result<usize> {
    let key_strs: Vec<String> =
      keys.iter().map(|k| k.as_str().to_owned()).collect();

    let removed: Vec<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = Vec::new();
        for key in key_strs {
          let mut stmt =
            tx.prepare("SELECT event_id FROM events WHERE subject_key = ?1")?;
          let ids = stmt
            .query_map(rusqlite::params![key], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          drop(stmt);
          tx.execute(
            "DELETE FROM events WHERE subject_key = ?1",
            rusqlite::params![key],
          )?;
          removed.extend(ids);
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;

    let removed: Vec<Uuid> = removed
      .iter()
      .map(|s| Uuid::parse_str(s))
      .collect::<std::result::Result<_, _>>()?;
    let count = removed.len();
    if count > 0 {
      self.publish(Change::EventsDeleted { ids: removed });
    }
    Ok(count)
  }

  // ── Bulk ──────────────────────────────────────────────────────────────────

  async fn import(
    &self,
    subjects: Vec<Subject>,
    events: Vec<VisitEvent>,
  ) -> Result<ImportSummary> {
    let subjects: Vec<RawSubject> =
      subjects.iter().map(RawSubject::encode).collect::<Result<_>>()?;
    let events: Vec<RawEvent> =
      events.iter().map(RawEvent::encode).collect::<Result<_>>()?;

    let summary = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();
        for raw in &subjects {
          // Conflicts on either the id or the key skip the row.
          summary.subjects += tx.execute(
            &format!(
              "INSERT OR IGNORE INTO subjects ({SUBJECT_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            rusqlite::params![
              raw.subject_id,
              raw.subject_key,
              raw.kind,
              raw.profile_json,
              raw.active,
              raw.created_at,
            ],
          )?;
        }
        for raw in &events {
          summary.events += raw.insert(&tx, true)?;
        }
        tx.commit()?;
        Ok(summary)
      })
      .await?;

    self.publish(Change::Imported { summary });
    Ok(summary)
  }

  // ── Change feed ───────────────────────────────────────────────────────────

  fn subscribe(&self) -> broadcast::Receiver<Change> { self.changes.subscribe() }
}
