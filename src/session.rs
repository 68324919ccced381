// 🗂️ Session Store - one directory per undo, kept forever for audit
//
// Layout:
//   <root>/session_<YYYYmmdd_HHMMSS>_loan_<id>/
//       transactions.json            undo outcomes
//       transactions.xlsx            sheet handed to the operator
//       transactions_corrected.xlsx  sheet the operator uploaded
//       replay_results.json          repayment outcomes

use chrono::{DateTime, Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const SESSION_PREFIX: &str = "session_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt session artifact: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid session id: {0:?}")]
    InvalidId(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("No session found. Please run undo operation first.")]
    NoSessions,

    #[error("{artifact} not found in session {session}")]
    ArtifactMissing {
        session: String,
        artifact: &'static str,
    },
}

/// The four files a session can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    UndoLog,
    ExportSheet,
    CorrectedSheet,
    ReplayLog,
}

impl Artifact {
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::UndoLog => "transactions.json",
            Artifact::ExportSheet => "transactions.xlsx",
            Artifact::CorrectedSheet => "transactions_corrected.xlsx",
            Artifact::ReplayLog => "replay_results.json",
        }
    }
}

/// Where a session is in `created → undone → exported → imported → replayed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Undone,
    Exported,
    Imported,
    Replayed,
}

impl Stage {
    pub fn name(&self) -> &str {
        match self {
            Stage::Created => "created",
            Stage::Undone => "undone",
            Stage::Exported => "exported",
            Stage::Imported => "imported",
            Stage::Replayed => "replayed",
        }
    }
}

// ============================================================================
// SESSION STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SessionStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh directory for `loan_id`, stamped with the current local time.
    pub fn create_session(&self, loan_id: i64) -> Result<Session, SessionError> {
        self.create_session_at(loan_id, Local::now())
    }

    /// Like `create_session` with an explicit clock. Never reuses a directory:
    /// a second session in the same second gets a numeric suffix.
    pub fn create_session_at(&self, loan_id: i64, now: DateTime<Local>) -> Result<Session, SessionError> {
        fs::create_dir_all(&self.root)?;

        let base = format!("{SESSION_PREFIX}{}_loan_{loan_id}", now.format(TIMESTAMP_FORMAT));
        let mut id = base.clone();
        let mut n = 1;
        loop {
            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    info!("📁 New session: {}", dir.display());
                    return Ok(Session::from_dir(id, dir));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    n += 1;
                    id = format!("{base}_{n}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn open(&self, id: &str) -> Result<Session, SessionError> {
        if !is_valid_id(id) {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(Session::from_dir(id.to_string(), dir))
    }

    /// Every session on disk, newest first.
    pub fn list(&self) -> Result<Vec<Session>, SessionError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_valid_id(&name) && entry.path().is_dir() {
                sessions.push(Session::from_dir(name, entry.path()));
            }
        }

        sessions.sort_by(|a, b| (b.created_at(), b.suffix(), b.id()).cmp(&(a.created_at(), a.suffix(), a.id())));
        Ok(sessions)
    }

    pub fn latest(&self) -> Result<Session, SessionError> {
        self.list()?.into_iter().next().ok_or(SessionError::NoSessions)
    }

    /// The named session, or the latest one when no id is given.
    pub fn resolve(&self, id: Option<&str>) -> Result<Session, SessionError> {
        match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => self.open(id),
            None => self.latest(),
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    id.starts_with(SESSION_PREFIX)
        && id.len() > SESSION_PREFIX.len()
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// SESSION HANDLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

impl Session {
    fn from_dir(id: String, dir: PathBuf) -> Self {
        Session { id, dir }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loan id encoded in the directory name
    pub fn loan_id(&self) -> Option<i64> {
        let (_, rest) = self.id.split_once("_loan_")?;
        rest.split('_').next()?.parse().ok()
    }

    /// Creation time encoded in the directory name
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        let stamp = self.id.strip_prefix(SESSION_PREFIX)?.get(..15)?;
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
    }

    fn suffix(&self) -> u32 {
        self.id
            .split_once("_loan_")
            .and_then(|(_, rest)| rest.split('_').nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(1)
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn has(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    pub fn stage(&self) -> Stage {
        if self.has(Artifact::ReplayLog) {
            Stage::Replayed
        } else if self.has(Artifact::CorrectedSheet) {
            Stage::Imported
        } else if self.has(Artifact::ExportSheet) {
            Stage::Exported
        } else if self.has(Artifact::UndoLog) {
            Stage::Undone
        } else {
            Stage::Created
        }
    }

    /// Replace an artifact. Written to a temp file first so a crash never
    /// leaves a half-written file under the real name.
    pub fn write_bytes(&self, artifact: Artifact, data: &[u8]) -> Result<PathBuf, SessionError> {
        let path = self.path(artifact);
        let tmp = self.dir.join(format!(".{}.tmp", artifact.file_name()));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn write_json<T: Serialize>(&self, artifact: Artifact, value: &T) -> Result<PathBuf, SessionError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_bytes(artifact, &json)
    }

    pub fn read_bytes(&self, artifact: Artifact) -> Result<Vec<u8>, SessionError> {
        match fs::read(self.path(artifact)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SessionError::ArtifactMissing {
                session: self.id.clone(),
                artifact: artifact.file_name(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_json<T: DeserializeOwned>(&self, artifact: Artifact) -> Result<T, SessionError> {
        let data = self.read_bytes(artifact)?;
        Ok(serde_json::from_slice(&data)?)
    }
}
