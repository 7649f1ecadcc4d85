//! Session persistence.
//!
//! Sessions persist outside the process as one JSON file per backend id.
//! Loading is forgiving: a missing or corrupt file yields a fresh session
//! rather than an error. Writers are not coordinated — persistence is
//! last-write-wins with no merge.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::session::model::SessionState;
use crate::{AppError, Result};

/// Storage seam for session state.
pub trait SessionStore {
    /// Load the session for `server_id`, or a fresh one when absent or
    /// unreadable.
    fn load(&self, server_id: &str) -> SessionState;

    /// Persist `session`, overwriting any previous state.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] on serialization or write failure.
    fn save(&self, session: &SessionState) -> Result<()>;

    /// Replace the session for `server_id` with a fresh one and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] on write failure.
    fn reset(&self, server_id: &str) -> Result<SessionState>;

    /// Write the session for `server_id` to `out_path` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`] on write failure.
    fn export(&self, server_id: &str, out_path: &Path) -> Result<PathBuf>;
}

/// File-backed store writing `session-<id>.json` under one directory.
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    dir: PathBuf,
}

impl FsSessionStore {
    /// Create a store rooted at `dir`; the directory is created on first
    /// write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_path(&self, server_id: &str) -> PathBuf {
        self.dir.join(format!("session-{server_id}.json"))
    }

    fn write_pretty(session: &SessionState, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|err| AppError::Session(format!("failed to serialize session: {err}")))?;
        fs::write(path, bytes).map_err(|err| {
            AppError::Session(format!("failed to write {}: {err}", path.display()))
        })
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::Session(format!(
                "failed to create session dir {}: {err}",
                self.dir.display()
            ))
        })
    }
}

impl SessionStore for FsSessionStore {
    fn load(&self, server_id: &str) -> SessionState {
        let path = self.session_path(server_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return SessionState::new(server_id),
        };

        match serde_json::from_str::<SessionState>(&raw) {
            Ok(mut session) => {
                session.server_id = server_id.to_owned();
                session
            }
            Err(err) => {
                warn!(server_id, error = %err, path = %path.display(), "corrupt session file, starting fresh");
                SessionState::new(server_id)
            }
        }
    }

    fn save(&self, session: &SessionState) -> Result<()> {
        self.ensure_dir()?;
        Self::write_pretty(session, &self.session_path(&session.server_id))
    }

    fn reset(&self, server_id: &str) -> Result<SessionState> {
        let fresh = SessionState::new(server_id);
        self.save(&fresh)?;
        Ok(fresh)
    }

    fn export(&self, server_id: &str, out_path: &Path) -> Result<PathBuf> {
        let session = self.load(server_id);
        Self::write_pretty(&session, out_path)?;
        Ok(out_path.to_path_buf())
    }
}
