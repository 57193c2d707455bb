//! Shared test doubles.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::EntityTable;
use crate::remote::{Filter, RemoteError, RemoteService};

/// In-memory stand-in for the hosted database.
///
/// Rows are JSON objects keyed by table; ids are assigned as `r1`, `r2`,
/// ... on insert; updates upsert, matching the last-write-wins posture of
/// the real service. Every call is recorded for order and count
/// assertions. Failure injection:
/// - `set_unreachable(true)` fails every call as transient,
/// - a record or patch carrying `"poison": true` is rejected outright.
#[derive(Default)]
pub struct MockRemote {
  rows: Mutex<HashMap<EntityTable, Vec<Value>>>,
  calls: Mutex<Vec<String>>,
  next_id: AtomicU64,
  unreachable: AtomicBool,
}

impl MockRemote {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-populate a table.
  pub fn seed(&self, table: EntityTable, rows: Vec<Value>) {
    self.rows_guard().insert(table, rows);
  }

  /// Current rows of a table.
  pub fn rows(&self, table: EntityTable) -> Vec<Value> {
    self.rows_guard().get(&table).cloned().unwrap_or_default()
  }

  /// Every call made so far, in order, as `verb:table[:id]` strings.
  pub fn calls(&self) -> Vec<String> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  fn rows_guard(&self) -> MutexGuard<'_, HashMap<EntityTable, Vec<Value>>> {
    self.rows.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn record(&self, call: String) {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(call);
  }

  fn check_reachable(&self) -> Result<(), RemoteError> {
    if self.unreachable.load(Ordering::SeqCst) {
      Err(RemoteError::Unavailable("injected outage".to_string()))
    } else {
      Ok(())
    }
  }

  fn check_poison(value: &Value) -> Result<(), RemoteError> {
    if value.get("poison").and_then(Value::as_bool) == Some(true) {
      Err(RemoteError::Rejected("injected validation failure".to_string()))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl RemoteService for MockRemote {
  async fn insert(&self, table: EntityTable, record: Value) -> Result<Value, RemoteError> {
    self.record(format!("insert:{table}"));
    self.check_reachable()?;
    Self::check_poison(&record)?;

    let Value::Object(mut fields) = record else {
      return Err(RemoteError::Rejected("record must be an object".to_string()));
    };

    let id = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    let now = Utc::now().to_rfc3339();
    fields.insert("id".to_string(), Value::String(id));
    fields.insert("created_at".to_string(), Value::String(now.clone()));
    fields.insert("updated_at".to_string(), Value::String(now));

    let row = Value::Object(fields);
    self.rows_guard().entry(table).or_default().push(row.clone());
    Ok(row)
  }

  async fn update(
    &self,
    table: EntityTable,
    id: &str,
    patch: Value,
  ) -> Result<Value, RemoteError> {
    self.record(format!("update:{table}:{id}"));
    self.check_reachable()?;
    Self::check_poison(&patch)?;

    let now = Utc::now().to_rfc3339();
    let mut tables = self.rows_guard();
    let rows = tables.entry(table).or_default();

    if let Some(row) = rows
      .iter_mut()
      .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
    {
      if let (Some(fields), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
          fields.insert(key.clone(), value.clone());
        }
        fields.insert("updated_at".to_string(), Value::String(now));
      }
      return Ok(row.clone());
    }

    // Unknown id: upsert, as a last-write-wins service would.
    let mut fields = patch.as_object().cloned().unwrap_or_default();
    fields.insert("id".to_string(), Value::String(id.to_string()));
    fields.insert("updated_at".to_string(), Value::String(now));
    let row = Value::Object(fields);
    rows.push(row.clone());
    Ok(row)
  }

  async fn delete(&self, table: EntityTable, id: &str) -> Result<(), RemoteError> {
    self.record(format!("delete:{table}:{id}"));
    self.check_reachable()?;

    self
      .rows_guard()
      .entry(table)
      .or_default()
      .retain(|row| row.get("id").and_then(Value::as_str) != Some(id));
    Ok(())
  }

  async fn select(
    &self,
    table: EntityTable,
    filter: Option<&Filter>,
  ) -> Result<Vec<Value>, RemoteError> {
    self.record(format!("select:{table}"));
    self.check_reachable()?;

    let rows = self.rows(table);
    Ok(match filter {
      Some(filter) => rows.into_iter().filter(|row| filter.matches(row)).collect(),
      None => rows,
    })
  }
}
