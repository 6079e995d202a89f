use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Statistikfelder, die der ProgressMonitor schreibt; alles andere gehört dem Job-Besitzer
pub const PROGRESS_FIELDS: [&str; 8] = [
    "start_time",
    "migrated_count",
    "source_count",
    "percentage",
    "current_rate",
    "average_rate",
    "eta_seconds",
    "last_updated",
];

/// Attributname des Concurrency Tokens
pub const ETAG_FIELD: &str = "_etag";

/// 100 Jahre, größere Werte bedeuten praktisch "alles"
const MAX_DATA_AGE_HOURS: u64 = 24 * 365 * 100;

/// Adresse einer Collection: Account-Name aus der Config plus Tabelle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionLocator {
    pub account: String,
    pub table: String,
}

impl CollectionLocator {
    pub fn new(account: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for CollectionLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.table)
    }
}

/// Schreibmodus für den Bulk Writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    #[serde(rename = "insert_only")]
    InsertOnly,
    #[serde(rename = "upsert")]
    Upsert,
}

impl WriteMode {
    pub fn as_str(&self) -> &str {
        match self {
            WriteMode::InsertOnly => "insert_only",
            WriteMode::Upsert => "upsert",
        }
    }
}

/// Vorbedingung für ein Statistik-Update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtagCondition<'a> {
    /// Extern angelegter Job, der noch nie einen Token bekommen hat
    Missing,
    Equals(&'a str),
}

/// Persistierter Migrations-Job inkl. Fortschrittsstatistik
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: String,
    pub source: CollectionLocator,
    pub destination: CollectionLocator,
    /// Einzelnes Feld, verschachtelter Pfad oder Komma-Liste
    #[serde(default)]
    pub source_partition_key: Option<String>,
    #[serde(default)]
    pub destination_partition_key: Option<String>,
    /// true = nur fehlende Dokumente einfügen, false = upsert
    #[serde(default)]
    pub only_insert_missing: bool,
    /// Nur Dokumente der letzten N Stunden migrieren
    #[serde(default)]
    pub data_age_hours: Option<u64>,
    #[serde(default)]
    pub completed: bool,

    // Statistik, nur vom ProgressMonitor geschrieben
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub migrated_count: u64,
    #[serde(default)]
    pub source_count: u64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub current_rate: f64,
    #[serde(default)]
    pub average_rate: f64,
    #[serde(default)]
    pub eta_seconds: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Optimistic Concurrency Token
    #[serde(rename = "_etag", default)]
    pub etag: String,
}

impl MigrationJob {
    pub fn new(id: impl Into<String>, source: CollectionLocator, destination: CollectionLocator) -> Self {
        Self {
            id: id.into(),
            source,
            destination,
            source_partition_key: None,
            destination_partition_key: None,
            only_insert_missing: false,
            data_age_hours: None,
            completed: false,
            start_time: None,
            migrated_count: 0,
            source_count: 0,
            percentage: 0.0,
            current_rate: 0.0,
            average_rate: 0.0,
            eta_seconds: 0.0,
            last_updated: None,
            etag: Self::next_etag(),
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        if self.only_insert_missing {
            WriteMode::InsertOnly
        } else {
            WriteMode::Upsert
        }
    }

    /// Untergrenze für `_ts` aus dem Data-Age Cutoff
    pub fn modified_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.data_age_hours
            .map(|hours| now - chrono::Duration::hours(hours.min(MAX_DATA_AGE_HOURS) as i64))
    }

    pub fn next_etag() -> String {
        Uuid::new_v4().to_string()
    }

    /// Leerer Token heißt: Attribut existiert im Store nicht
    pub fn etag_condition(&self) -> EtagCondition<'_> {
        if self.etag.is_empty() {
            EtagCondition::Missing
        } else {
            EtagCondition::Equals(&self.etag)
        }
    }

    /// Nur die Statistikfelder, serialisiert wie im Store
    pub fn progress_fields(&self) -> serde_json::Result<Map<String, Value>> {
        let Value::Object(mut all) = self.to_value()? else {
            return Ok(Map::new());
        };
        all.retain(|key, _| PROGRESS_FIELDS.contains(&key.as_str()));
        Ok(all)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}
