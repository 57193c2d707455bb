use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Remote collections the sync core knows about.
///
/// The variant drives both the remote dispatch and the local cache key
/// namespace, so a queued operation can never be replayed against the
/// wrong collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
  Project,
  Milestone,
  Outsourcing,
  Payment,
}

impl EntityTable {
  /// Remote collection name, also used as the cache key for the table's
  /// list data.
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityTable::Project => "projects",
      EntityTable::Milestone => "milestones",
      EntityTable::Outsourcing => "outsourcing",
      EntityTable::Payment => "payments",
    }
  }
}

impl fmt::Display for EntityTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Trait for records the offline facade can create, update, and list.
///
/// Implementors pin themselves to a remote collection via `TABLE`, which
/// keeps cache namespacing and queue dispatch checked at compile time.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Remote collection and cache namespace this record belongs to.
  const TABLE: EntityTable;

  /// Canonical identifier, or a `temp_` placeholder for records created
  /// while offline.
  fn id(&self) -> &str;
}

/// A tracked project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub client: Option<String>,
  pub status: String,
  #[serde(default)]
  pub budget: Option<f64>,
  #[serde(default)]
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A project milestone, optionally tied to a billable amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
  pub id: String,
  pub project_id: String,
  pub title: String,
  pub status: String,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
  #[serde(default)]
  pub amount: Option<f64>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Work handed to an external vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outsourcing {
  pub id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  pub vendor: String,
  #[serde(default)]
  pub description: Option<String>,
  pub status: String,
  #[serde(default)]
  pub cost: Option<f64>,
  #[serde(default)]
  pub due_date: Option<NaiveDate>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A payment, incoming from a client or outgoing to a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
  pub id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  #[serde(default)]
  pub milestone_id: Option<String>,
  pub amount: f64,
  pub direction: String,
  pub status: String,
  #[serde(default)]
  pub paid_on: Option<NaiveDate>,
  #[serde(default)]
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Entity for Project {
  const TABLE: EntityTable = EntityTable::Project;

  fn id(&self) -> &str {
    &self.id
  }
}

impl Entity for Milestone {
  const TABLE: EntityTable = EntityTable::Milestone;

  fn id(&self) -> &str {
    &self.id
  }
}

impl Entity for Outsourcing {
  const TABLE: EntityTable = EntityTable::Outsourcing;

  fn id(&self) -> &str {
    &self.id
  }
}

impl Entity for Payment {
  const TABLE: EntityTable = EntityTable::Payment;

  fn id(&self) -> &str {
    &self.id
  }
}
