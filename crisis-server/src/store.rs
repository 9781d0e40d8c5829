use chrono::{DateTime, Duration, SecondsFormat, Utc};
use crisis_core::views::interval_text;
use crisis_core::{
    validation, Activity, ActivityQuery, AuthUser, BobBoard, BobEntry, CrisisDocument,
    CrisisStatus, CrisisSummary, DocumentType, EntryType, LinkError, NewActivity, NewBobEntry,
    ResponsibilityCard, Session, UserProfile, ValidationError,
};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const OTP_TTL_MINUTES: i64 = 10;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT,
        salt TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sessions (
        token TEXT PRIMARY KEY,
        account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS otp_codes (
        email TEXT PRIMARY KEY,
        code TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        full_name TEXT,
        role TEXT
    );
    CREATE TABLE IF NOT EXISTS crises (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS activities (
        id TEXT PRIMARY KEY,
        crisis_id TEXT,
        description TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_activities_ts ON activities(timestamp);
    CREATE TABLE IF NOT EXISTS responsibility_cards (
        id TEXT PRIMARY KEY,
        role TEXT NOT NULL,
        duties TEXT NOT NULL DEFAULT '[]',
        description TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        type TEXT,
        content TEXT,
        file_url TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bob_entries (
        id TEXT PRIMARY KEY,
        crisis_id TEXT,
        user_id TEXT NOT NULL,
        type TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS bob_links (
        from_entry_id TEXT NOT NULL REFERENCES bob_entries(id) ON DELETE CASCADE,
        to_entry_id TEXT NOT NULL REFERENCES bob_entries(id) ON DELETE CASCADE,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (from_entry_id, to_entry_id)
    );
";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Token has expired or is invalid")]
    InvalidOtp,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Signups not allowed for otp")]
    UnknownAccount,
    #[error("{0}")]
    Corrupt(String),
}

/// SQLite-backed tables. Every call opens its own connection.
#[derive(Clone, Debug)]
pub struct Store {
    db_path: Arc<PathBuf>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&*self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    // --- accounts and sessions ---

    pub fn sign_up(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let email = validation::validate_sign_up(email, password)?;
        let conn = self.connect()?;
        if account_id(&conn, &email)?.is_some() {
            return Err(StoreError::AlreadyRegistered);
        }
        let id = uuid::Uuid::new_v4().to_string();
        let salt = hex::encode(rand::random::<[u8; 16]>());
        conn.execute(
            "INSERT INTO accounts (id, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, email, hash_password(&salt, password), salt, stamp(Utc::now())],
        )?;
        tracing::info!(account_id = %id, "account registered");
        issue_session(&conn, &id)
    }

    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let conn = self.connect()?;
        let row: Option<(String, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT id, password_hash, salt FROM accounts WHERE email = ?1",
                params![email.trim()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((id, Some(hash), Some(salt))) = row else {
            return Err(StoreError::InvalidCredentials);
        };
        if hash_password(&salt, password) != hash {
            return Err(StoreError::InvalidCredentials);
        }
        issue_session(&conn, &id)
    }

    /// Creates a 6-digit code for `email`, replacing any pending one. The
    /// account is created on the fly when `create_user` is set.
    pub fn issue_otp(&self, email: &str, create_user: bool) -> Result<String, StoreError> {
        let email = validation::validate_email(email)?;
        let conn = self.connect()?;
        if account_id(&conn, &email)?.is_none() {
            if !create_user {
                return Err(StoreError::UnknownAccount);
            }
            conn.execute(
                "INSERT INTO accounts (id, email, created_at) VALUES (?1, ?2, ?3)",
                params![uuid::Uuid::new_v4().to_string(), email, stamp(Utc::now())],
            )?;
        }
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
        conn.execute(
            "INSERT OR REPLACE INTO otp_codes (email, code, expires_at) VALUES (?1, ?2, ?3)",
            params![email, code, stamp(expires_at)],
        )?;
        Ok(code)
    }

    /// Pending code for `email`, for local tooling that stands in for mail.
    pub fn pending_otp(&self, email: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT code FROM otp_codes WHERE email = ?1",
                params![email.trim()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn verify_otp(&self, email: &str, code: &str) -> Result<Session, StoreError> {
        let (email, code) = validation::validate_otp(email, code)?;
        let conn = self.connect()?;
        let pending: Option<(String, String)> = conn
            .query_row(
                "SELECT code, expires_at FROM otp_codes WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((expected, expires_at)) = pending else {
            return Err(StoreError::InvalidOtp);
        };
        if expected != code || expires_at < stamp(Utc::now()) {
            return Err(StoreError::InvalidOtp);
        }
        conn.execute("DELETE FROM otp_codes WHERE email = ?1", params![email])?;
        let id = account_id(&conn, &email)?.ok_or(StoreError::InvalidOtp)?;
        issue_session(&conn, &id)
    }

    pub fn sign_out(&self, token: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        let conn = self.connect()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT account_id FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => load_user(&conn, &id),
            None => Ok(None),
        }
    }

    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (id, email, full_name, role) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                full_name = excluded.full_name,
                role = excluded.role",
            params![profile.id, profile.email, profile.full_name, profile.role],
        )?;
        Ok(())
    }

    pub fn profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        let conn = self.connect()?;
        Ok(conn
            .query_row(
                "SELECT id, email, full_name, role FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        full_name: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    // --- dashboard ---

    pub fn insert_crisis(
        &self,
        name: &str,
        status: &CrisisStatus,
        start_time: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let conn = self.connect()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO crises (id, name, status, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, status.label(), stamp(start_time)],
        )?;
        Ok(id)
    }

    pub fn has_crises(&self) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM crises", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Most recently started crisis that is not closed, with its elapsed
    /// time at `now`.
    pub fn current_crisis(&self, now: DateTime<Utc>) -> Result<Option<CrisisSummary>, StoreError> {
        let conn = self.connect()?;
        let crisis = conn
            .query_row(
                "SELECT id, name, status, start_time FROM crises
                 WHERE status != 'Closed'
                 ORDER BY start_time DESC
                 LIMIT 1",
                [],
                |row| {
                    let start_time = timestamp_at(row, 3)?;
                    Ok(CrisisSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        status: parse_status(&row.get::<_, String>(2)?),
                        start_time,
                        duration: interval_text(start_time, now),
                    })
                },
            )
            .optional()?;
        Ok(crisis)
    }

    pub fn activity_log(&self, query: &ActivityQuery) -> Result<Vec<Activity>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, crisis_id, description, timestamp FROM activities
             WHERE ?1 IS NULL OR crisis_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![query.crisis_id, query.limit, query.offset],
            |row| {
                Ok(Activity {
                    id: row.get(0)?,
                    crisis_id: row.get(1)?,
                    description: row.get(2)?,
                    timestamp: timestamp_at(row, 3)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn insert_activity(&self, activity: &NewActivity) -> Result<String, StoreError> {
        let description = validation::validate_activity_description(&activity.description)?;
        let conn = self.connect()?;
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO activities (id, crisis_id, description, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                activity.crisis_id,
                description,
                stamp(activity.timestamp.unwrap_or_else(Utc::now)),
            ],
        )?;
        Ok(id)
    }

    // --- reference views ---

    pub fn insert_card(&self, role: &str, duties: &[&str], description: Option<&str>) -> Result<String, StoreError> {
        let conn = self.connect()?;
        let id = uuid::Uuid::new_v4().to_string();
        let duties = serde_json::to_string(duties).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        conn.execute(
            "INSERT INTO responsibility_cards (id, role, duties, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, role, duties, description, stamp(Utc::now())],
        )?;
        Ok(id)
    }

    pub fn responsibility_cards(&self) -> Result<Vec<ResponsibilityCard>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, role, duties, description, created_at FROM responsibility_cards ORDER BY role",
        )?;
        let rows = stmt.query_map([], |row| {
            let duties: Option<String> = row.get(2)?;
            let duties = duties
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
                    })
                })
                .transpose()?
                .unwrap_or_default();
            Ok(ResponsibilityCard {
                id: row.get(0)?,
                role: row.get(1)?,
                duties,
                description: row.get(3)?,
                created_at: timestamp_at(row, 4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_document(
        &self,
        title: &str,
        doc_type: DocumentType,
        description: Option<&str>,
        file_url: Option<&str>,
    ) -> Result<String, StoreError> {
        let conn = self.connect()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = stamp(Utc::now());
        conn.execute(
            "INSERT INTO documents (id, title, description, type, file_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, title, description, document_type_name(doc_type)?, file_url, now],
        )?;
        Ok(id)
    }

    pub fn documents(&self) -> Result<Vec<CrisisDocument>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, type, content, file_url, created_at, updated_at
             FROM documents ORDER BY title",
        )?;
        let rows = stmt.query_map([], |row| {
            let doc_type: Option<String> = row.get(3)?;
            Ok(CrisisDocument {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                doc_type: doc_type.map(|raw| parse_document_type(&raw)).unwrap_or_default(),
                content: row.get(4)?,
                file_url: row.get(5)?,
                created_at: timestamp_at(row, 6)?,
                updated_at: timestamp_at(row, 7)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // --- BOB board ---

    pub fn bob_entries(&self, crisis_id: Option<&str>) -> Result<Vec<BobEntry>, StoreError> {
        let conn = self.connect()?;
        load_entries(&conn, crisis_id)
    }

    /// Stores a new entry and its outgoing links in one transaction. Links
    /// are checked against the layering rule before anything is written.
    pub fn create_bob_entry(&self, user_id: &str, entry: &NewBobEntry) -> Result<String, StoreError> {
        let content = validation::validate_entry_content(&entry.content)?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = stamp(Utc::now());
        tx.execute(
            "INSERT INTO bob_entries (id, crisis_id, user_id, type, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, entry.crisis_id, user_id, entry.entry_type.as_str(), content, now],
        )?;
        if !entry.linked_to.is_empty() {
            let mut board = BobBoard::from_entries(load_entries(&tx, None)?);
            for to_id in board.create_link(&id, entry.linked_to.as_slice())? {
                insert_link(&tx, &id, &to_id, user_id)?;
            }
        }
        tx.commit()?;
        tracing::debug!(%id, entry_type = %entry.entry_type, "bob entry stored");
        Ok(id)
    }

    pub fn update_bob_entry(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let content = validation::validate_entry_content(content)?;
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bob_entries SET content = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, content, stamp(Utc::now())],
        )?;
        Ok(())
    }

    pub fn delete_bob_entry(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM bob_entries WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Idempotent: an existing edge is left as is.
    pub fn create_bob_link(&self, from_id: &str, to_id: &str, created_by: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let mut board = BobBoard::from_entries(load_entries(&conn, None)?);
        for added in board.create_link(from_id, &[to_id])? {
            insert_link(&conn, from_id, &added, created_by)?;
        }
        Ok(())
    }

    pub fn delete_bob_link(&self, from_id: &str, to_id: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM bob_links WHERE from_entry_id = ?1 AND to_entry_id = ?2",
            params![from_id, to_id],
        )?;
        Ok(())
    }
}

fn load_entries(conn: &Connection, crisis_id: Option<&str>) -> Result<Vec<BobEntry>, StoreError> {
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT from_entry_id, to_entry_id FROM bob_links ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (from, to) = row?;
        links.entry(from).or_default().push(to);
    }

    let mut stmt = conn.prepare(
        "SELECT id, crisis_id, user_id, type, content, created_at, updated_at FROM bob_entries
         WHERE ?1 IS NULL OR crisis_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![crisis_id], map_entry)?;
    let mut out = Vec::new();
    for row in rows {
        let mut entry = row?;
        entry.linked_to = links.remove(&entry.id).unwrap_or_default();
        out.push(entry);
    }
    Ok(out)
}

fn map_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<BobEntry> {
    let raw_type: String = row.get(3)?;
    let entry_type: EntryType = raw_type.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(BobEntry {
        id: row.get(0)?,
        crisis_id: row.get(1)?,
        user_id: row.get(2)?,
        entry_type,
        content: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
        linked_to: Vec::new(),
    })
}

fn insert_link(conn: &Connection, from_id: &str, to_id: &str, created_by: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO bob_links (from_entry_id, to_entry_id, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![from_id, to_id, created_by, stamp(Utc::now())],
    )?;
    Ok(())
}

fn account_id(conn: &Connection, email: &str) -> Result<Option<String>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id FROM accounts WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()?)
}

fn load_user(conn: &Connection, id: &str) -> Result<Option<AuthUser>, StoreError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, email, metadata FROM accounts WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((id, email, metadata)) = row else {
        return Ok(None);
    };
    let user_metadata = serde_json::from_str(&metadata).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Some(AuthUser {
        id,
        email: Some(email),
        user_metadata,
    }))
}

fn issue_session(conn: &Connection, account_id: &str) -> Result<Session, StoreError> {
    let token = hex::encode(rand::random::<[u8; 32]>());
    conn.execute(
        "INSERT INTO sessions (token, account_id, created_at) VALUES (?1, ?2, ?3)",
        params![token, account_id, stamp(Utc::now())],
    )?;
    let user = load_user(conn, account_id)?
        .ok_or_else(|| StoreError::Corrupt(format!("account {account_id} vanished")))?;
    Ok(Session {
        access_token: token,
        refresh_token: None,
        user,
    })
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fixed-width UTC text, so lexical order is chronological order.
fn stamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err)))
}

fn parse_status(raw: &str) -> CrisisStatus {
    match raw {
        "Active" => CrisisStatus::Active,
        "Monitoring" => CrisisStatus::Monitoring,
        "Closed" => CrisisStatus::Closed,
        _ => CrisisStatus::Unknown,
    }
}

fn document_type_name(doc_type: DocumentType) -> Result<String, StoreError> {
    match serde_json::to_value(doc_type) {
        Ok(serde_json::Value::String(name)) => Ok(name),
        Ok(other) => Err(StoreError::Corrupt(format!("unexpected document type {other}"))),
        Err(err) => Err(StoreError::Corrupt(err.to_string())),
    }
}

fn parse_document_type(raw: &str) -> DocumentType {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or(DocumentType::Other)
}
