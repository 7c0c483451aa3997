//! SQLite-backed metadata store.
//!
//! Persists per-document entity metadata as an inverted relation: one row
//! per `(doc_id, name)` pair, one table per entity kind, all under WAL so
//! concurrent readers never block. Writes go through `put`, which replaces
//! a document's rows atomically inside a single transaction.
//!
//! # Schema
//!
//! ```text
//! ┌───────────────┐   ┌──────────────┐  ┌──────────────┐
//! │  documents    │   │ people       │  │ dates        │
//! │               │   │ organizations│  │              │
//! │ doc_id (PK)   │◀──│ locations    │  │ id (PK)      │
//! │ filename      │   │              │  │ doc_id       │
//! │ word_count    │   │ id (PK)      │  │ date_str     │
//! │ fingerprint   │   │ doc_id       │  └──────────────┘
//! │ created_at    │   │ name         │  ┌──────────────┐
//! └───────────────┘   └──────────────┘  │ emails       │
//! ┌───────────────┐                     │ id (PK)      │
//! │ entity_aliases│                     │ doc_id       │
//! │ id (PK)       │                     │ email        │
//! │ kind          │                     └──────────────┘
//! │ variant       │
//! │ canonical     │
//! └───────────────┘
//! ```
//!
//! Every `name` / `date_str` / `email` column and every `doc_id` column is
//! indexed; exact filtering always runs on indexed lookups. Fuzzy filtering
//! has no index to use and scans candidate documents' metadata in memory.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, warn};

use crate::consolidate::ConsolidationGroup;
use crate::error::{EngineError, EngineResult};
use crate::matcher::EntityMatcher;
use crate::models::{DocumentMetadata, EntityKind, FilterCriteria, QueryEntities};

/// Entity tables with a `name` column, in storage order.
const NAME_TABLES: [(EntityKind, &str); 3] = [
    (EntityKind::Person, "people"),
    (EntityKind::Organization, "organizations"),
    (EntityKind::Location, "locations"),
];

/// SQLite-backed metadata store.
///
/// Single-writer at index time (the build pipeline issues sequential
/// `put` calls); effectively immutable at query time, so reads need no
/// coordination.
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (creating if missing) the store at `path` and ensure the schema.
    pub async fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::Input {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store (tests and throwaway sessions).
    pub async fn in_memory() -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A second connection would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Whether the store already holds any documents.
    pub async fn document_count(&self) -> EngineResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Stored content fingerprint for a document, if present.
    pub async fn fingerprint(&self, doc_id: &str) -> EngineResult<Option<String>> {
        let row = sqlx::query_scalar("SELECT fingerprint FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// All stored document ids.
    pub async fn doc_ids(&self) -> EngineResult<BTreeSet<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT doc_id FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Upsert all metadata for one document atomically.
    ///
    /// Existing rows for the document are deleted and fresh rows inserted
    /// inside one transaction; a failure rolls the document back to its
    /// previous state. Transient failures are retried once before
    /// surfacing.
    pub async fn put(
        &self,
        meta: &DocumentMetadata,
        filename: &str,
        fingerprint: &str,
    ) -> EngineResult<()> {
        match self.put_once(meta, filename, fingerprint).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(doc_id = %meta.doc_id, error = %first, "put failed, retrying once");
                self.put_once(meta, filename, fingerprint)
                    .await
                    .map_err(EngineError::from)
            }
        }
    }

    async fn put_once(
        &self,
        meta: &DocumentMetadata,
        filename: &str,
        fingerprint: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (doc_id, filename, word_count, fingerprint, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                filename = excluded.filename,
                word_count = excluded.word_count,
                fingerprint = excluded.fingerprint
            "#,
        )
        .bind(&meta.doc_id)
        .bind(filename)
        .bind(meta.word_count as i64)
        .bind(fingerprint)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        for table in ["people", "organizations", "locations", "dates", "emails"] {
            let sql = format!("DELETE FROM {table} WHERE doc_id = ?");
            sqlx::query(&sql).bind(&meta.doc_id).execute(&mut *tx).await?;
        }

        for (kind, table) in NAME_TABLES {
            let sql = format!("INSERT INTO {table} (doc_id, name) VALUES (?, ?)");
            for name in meta.entities(kind) {
                sqlx::query(&sql)
                    .bind(&meta.doc_id)
                    .bind(name)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for date in &meta.dates {
            sqlx::query("INSERT INTO dates (doc_id, date_str) VALUES (?, ?)")
                .bind(&meta.doc_id)
                .bind(date)
                .execute(&mut *tx)
                .await?;
        }

        for email in &meta.emails {
            sqlx::query("INSERT INTO emails (doc_id, email) VALUES (?, ?)")
                .bind(&meta.doc_id)
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(doc_id = %meta.doc_id, "stored metadata");
        Ok(())
    }

    /// Fetch stored metadata for a document.
    pub async fn get(&self, doc_id: &str) -> EngineResult<Option<DocumentMetadata>> {
        let row = sqlx::query("SELECT word_count FROM documents WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;

        let word_count: i64 = match row {
            Some(row) => row.get("word_count"),
            None => return Ok(None),
        };

        let mut meta = DocumentMetadata {
            doc_id: doc_id.to_string(),
            word_count: word_count as u64,
            ..DocumentMetadata::default()
        };

        for (kind, table) in NAME_TABLES {
            let sql = format!("SELECT name FROM {table} WHERE doc_id = ?");
            let names = sqlx::query_scalar::<_, String>(&sql)
                .bind(doc_id)
                .fetch_all(&self.pool)
                .await?;
            meta.entities_mut(kind).extend(names);
        }

        let dates = sqlx::query_scalar::<_, String>("SELECT date_str FROM dates WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await?;
        meta.dates.extend(dates);

        let emails = sqlx::query_scalar::<_, String>("SELECT email FROM emails WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await?;
        meta.emails.extend(emails);

        Ok(Some(meta))
    }

    /// Filter candidates by exact canonical-name criteria.
    ///
    /// AND across entity types, OR within a type's value list, indexed
    /// lookups throughout. Survivors come back in `candidate_ids` order.
    pub async fn filter(
        &self,
        candidate_ids: &[String],
        criteria: &FilterCriteria,
    ) -> EngineResult<Vec<String>> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut surviving: HashSet<String> = candidate_ids.iter().cloned().collect();

        for (values, table) in [
            (&criteria.people, "people"),
            (&criteria.organizations, "organizations"),
            (&criteria.locations, "locations"),
        ] {
            if values.is_empty() || surviving.is_empty() {
                continue;
            }
            let matched = self
                .docs_with_any_name(table, "name", values, &surviving)
                .await?;
            surviving.retain(|id| matched.contains(id));
            debug!(table, remaining = surviving.len(), "after exact filter");
        }

        if let Some((low, high)) = &criteria.date_range {
            if !surviving.is_empty() {
                let ids: Vec<&String> = surviving.iter().collect();
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!(
                    "SELECT DISTINCT doc_id FROM dates \
                     WHERE date_str BETWEEN ? AND ? AND doc_id IN ({placeholders})"
                );
                let mut query = sqlx::query_scalar::<_, String>(&sql).bind(low).bind(high);
                for id in &ids {
                    query = query.bind(id.as_str());
                }
                let matched: HashSet<String> =
                    query.fetch_all(&self.pool).await?.into_iter().collect();
                surviving.retain(|id| matched.contains(id));
            }
        }

        Ok(candidate_ids
            .iter()
            .filter(|id| surviving.contains(*id))
            .cloned()
            .collect())
    }

    async fn docs_with_any_name(
        &self,
        table: &str,
        column: &str,
        values: &[String],
        within: &HashSet<String>,
    ) -> EngineResult<HashSet<String>> {
        let value_ph = vec!["?"; values.len()].join(",");
        let id_ph = vec!["?"; within.len()].join(",");
        let sql = format!(
            "SELECT DISTINCT doc_id FROM {table} \
             WHERE {column} IN ({value_ph}) AND doc_id IN ({id_ph})"
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for value in values {
            query = query.bind(value);
        }
        for id in within {
            query = query.bind(id);
        }
        Ok(query.fetch_all(&self.pool).await?.into_iter().collect())
    }

    /// Filter candidates with fuzzy entity matching.
    ///
    /// Same AND-across-types, OR-within-type semantics as [`filter`], but
    /// names compare through the [`EntityMatcher`] so "Maxwell" keeps a
    /// document tagged "Ghislaine Maxwell". Dates still filter via the
    /// indexed range lookup when a range is given, and via matcher
    /// equality/substring when the query carries date strings. Candidates
    /// without stored metadata are rejected.
    pub async fn filter_fuzzy(
        &self,
        candidate_ids: &[String],
        entities: &QueryEntities,
        date_range: Option<&(String, String)>,
        matcher: &EntityMatcher,
    ) -> EngineResult<Vec<String>> {
        let mut surviving = Vec::new();

        for doc_id in candidate_ids {
            let Some(meta) = self.get(doc_id).await? else {
                continue;
            };

            let mut matches = true;
            for kind in EntityKind::ALL {
                let wanted = entities.entities(kind);
                if !wanted.is_empty() && !matcher.match_any(wanted, meta.entities(kind)) {
                    matches = false;
                    break;
                }
            }

            if matches && !entities.dates.is_empty() && !matcher.match_any(&entities.dates, &meta.dates)
            {
                matches = false;
            }

            if matches {
                if let Some((low, high)) = date_range {
                    matches = meta
                        .dates
                        .iter()
                        .any(|d| d.as_str() >= low.as_str() && d.as_str() <= high.as_str());
                }
            }

            if matches {
                surviving.push(doc_id.clone());
            }
        }

        debug!(
            candidates = candidate_ids.len(),
            surviving = surviving.len(),
            "fuzzy filter"
        );
        Ok(surviving)
    }

    /// All distinct stored values per entity table, keyed by table label.
    pub async fn all_entities(&self) -> EngineResult<BTreeMap<String, BTreeSet<String>>> {
        let mut result = BTreeMap::new();

        for (_, table) in NAME_TABLES {
            let sql = format!("SELECT DISTINCT name FROM {table} ORDER BY name");
            let names = sqlx::query_scalar::<_, String>(&sql)
                .fetch_all(&self.pool)
                .await?;
            result.insert(table.to_string(), names.into_iter().collect());
        }

        let dates =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT date_str FROM dates ORDER BY date_str")
                .fetch_all(&self.pool)
                .await?;
        result.insert("dates".to_string(), dates.into_iter().collect());

        let emails =
            sqlx::query_scalar::<_, String>("SELECT DISTINCT email FROM emails ORDER BY email")
                .fetch_all(&self.pool)
                .await?;
        result.insert("emails".to_string(), emails.into_iter().collect());

        Ok(result)
    }

    /// Distinct-document frequency per canonical name of one kind,
    /// highest first, ties by name.
    pub async fn frequencies(&self, kind: EntityKind) -> EngineResult<Vec<(String, u64)>> {
        let table = kind.label();
        let sql = format!(
            "SELECT name, COUNT(DISTINCT doc_id) AS doc_count FROM {table} \
             GROUP BY name ORDER BY doc_count DESC, name"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let count: i64 = row.get("doc_count");
                (name, count as u64)
            })
            .collect())
    }

    /// Documents containing a canonical name of one kind.
    pub async fn documents_with(&self, name: &str, kind: EntityKind) -> EngineResult<Vec<String>> {
        let table = kind.label();
        let sql = format!(
            "SELECT DISTINCT doc_id FROM {table} WHERE name = ? ORDER BY doc_id"
        );
        Ok(sqlx::query_scalar(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Names of the same kind that co-occur with `name`, by shared-document
    /// count descending, ties by name, capped at `limit`.
    pub async fn cooccurrences(
        &self,
        name: &str,
        kind: EntityKind,
        limit: usize,
    ) -> EngineResult<Vec<(String, u64)>> {
        let table = kind.label();
        let sql = format!(
            "SELECT name, COUNT(DISTINCT doc_id) AS shared FROM {table} \
             WHERE doc_id IN (SELECT doc_id FROM {table} WHERE name = ?) AND name != ? \
             GROUP BY name ORDER BY shared DESC, name LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(name)
            .bind(name)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let other: String = row.get("name");
                let count: i64 = row.get("shared");
                (other, count as u64)
            })
            .collect())
    }

    /// Replace the persisted consolidation alias table.
    ///
    /// Stores every variant → canonical association so the query-time
    /// lookup index can be rebuilt without re-running consolidation.
    pub async fn replace_aliases(&self, groups: &[ConsolidationGroup]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entity_aliases")
            .execute(&mut *tx)
            .await?;

        for group in groups {
            for variant in &group.variants {
                sqlx::query(
                    "INSERT INTO entity_aliases (kind, variant, canonical) VALUES (?, ?, ?)",
                )
                .bind(group.kind.label())
                .bind(variant)
                .bind(&group.canonical)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// All stored `(kind, variant, canonical)` alias rows.
    pub async fn aliases(&self) -> EngineResult<Vec<(EntityKind, String, String)>> {
        let rows = sqlx::query("SELECT kind, variant, canonical FROM entity_aliases")
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind_label: String = row.get("kind");
            let Ok(kind) = kind_label.parse::<EntityKind>() else {
                continue;
            };
            result.push((kind, row.get("variant"), row.get("canonical")));
        }
        Ok(result)
    }

    /// Delete documents (and their entity rows) not present in `known_ids`.
    ///
    /// Keeps the store consistent with the corpus after files disappear.
    pub async fn retain_documents(&self, known_ids: &BTreeSet<String>) -> EngineResult<u64> {
        let stored = self.doc_ids().await?;
        let stale: Vec<&String> = stored.iter().filter(|id| !known_ids.contains(*id)).collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for doc_id in &stale {
            for table in ["people", "organizations", "locations", "dates", "emails", "documents"] {
                let sql = format!("DELETE FROM {table} WHERE doc_id = ?");
                sqlx::query(&sql).bind(doc_id.as_str()).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;

        warn!(removed = stale.len(), "pruned stale documents from store");
        Ok(stale.len() as u64)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                fingerprint TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (_, table) in NAME_TABLES {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    doc_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
                )
                "#
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                date_str TEXT NOT NULL,
                FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL,
                email TEXT NOT NULL,
                FOREIGN KEY (doc_id) REFERENCES documents(doc_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_aliases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                variant TEXT NOT NULL,
                canonical TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, table, column) in [
            ("idx_people_name", "people", "name"),
            ("idx_people_doc", "people", "doc_id"),
            ("idx_orgs_name", "organizations", "name"),
            ("idx_orgs_doc", "organizations", "doc_id"),
            ("idx_locations_name", "locations", "name"),
            ("idx_locations_doc", "locations", "doc_id"),
            ("idx_dates_str", "dates", "date_str"),
            ("idx_dates_doc", "dates", "doc_id"),
            ("idx_emails_email", "emails", "email"),
            ("idx_emails_doc", "emails", "doc_id"),
            ("idx_aliases_variant", "entity_aliases", "variant"),
        ] {
            let sql = format!("CREATE INDEX IF NOT EXISTS {name} ON {table}({column})");
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        Ok(())
    }
}
