use async_trait::async_trait;
use dptb_core::{DptbError, DptbResult, Fingerprint};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Turn / Transcript
// ---------------------------------------------------------------------------

/// One exchange: what the user said and what the agent answered.
///
/// Serializes as a two-element JSON array `[user, agent]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn(pub String, pub String);

impl Turn {
    /// Creates a turn from a message and its response.
    pub fn new(user: impl Into<String>, agent: impl Into<String>) -> Self {
        Self(user.into(), agent.into())
    }

    /// The user's message.
    pub fn user(&self) -> &str {
        &self.0
    }

    /// The agent's response.
    pub fn agent(&self) -> &str {
        &self.1
    }
}

/// Ordered chat history of one session.
pub type Transcript = Vec<Turn>;

// ---------------------------------------------------------------------------
// TranscriptLoad
// ---------------------------------------------------------------------------

/// Outcome of reading a transcript file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptLoad {
    /// The file exists and parsed.
    Found(Transcript),
    /// No transcript has been saved for this fingerprint.
    NotFound,
    /// The file exists but is not a JSON array of pairs.
    ParseError(String),
    /// The file exists but could not be read.
    Unreadable(String),
}

impl TranscriptLoad {
    /// The loaded transcript, or an empty one for every other outcome.
    pub fn into_transcript(self) -> Transcript {
        match self {
            TranscriptLoad::Found(transcript) => transcript,
            TranscriptLoad::NotFound
            | TranscriptLoad::ParseError(_)
            | TranscriptLoad::Unreadable(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptStore trait
// ---------------------------------------------------------------------------

/// Persistence for per-session chat transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Reads the transcript saved for `fingerprint`.
    async fn load(&self, fingerprint: &Fingerprint) -> TranscriptLoad;

    /// Overwrites the transcript for `fingerprint`.
    async fn try_save(&self, fingerprint: &Fingerprint, transcript: &[Turn]) -> DptbResult<()>;

    /// Like [`TranscriptStore::try_save`], but failures are only logged.
    async fn save(&self, fingerprint: &Fingerprint, transcript: &[Turn]) {
        if let Err(e) = self.try_save(fingerprint, transcript).await {
            warn!(session = %fingerprint.short(), error = %e, "Failed to save chat history");
        }
    }
}

// ---------------------------------------------------------------------------
// FileTranscriptStore
// ---------------------------------------------------------------------------

/// Stores each transcript as a pretty-printed JSON file named after the
/// first 16 hex characters of the fingerprint.
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    /// Default directory, relative to the working directory.
    pub const DEFAULT_DIR: &'static str = "./chat_history";

    /// Creates a store rooted at `dir`. The directory is created on the
    /// first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the transcript files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path of the transcript for `fingerprint`.
    pub fn transcript_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint.short()))
    }
}

impl Default for FileTranscriptStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIR)
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn load(&self, fingerprint: &Fingerprint) -> TranscriptLoad {
        let path = self.transcript_path(fingerprint);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return TranscriptLoad::NotFound,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Chat history unreadable");
                return TranscriptLoad::Unreadable(e.to_string());
            }
        };
        match serde_json::from_str::<Transcript>(&data) {
            Ok(transcript) => TranscriptLoad::Found(transcript),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Chat history is not valid JSON");
                TranscriptLoad::ParseError(e.to_string())
            }
        }
    }

    async fn try_save(&self, fingerprint: &Fingerprint, transcript: &[Turn]) -> DptbResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            DptbError::Session(format!(
                "cannot create history directory '{}': {e}",
                self.dir.display()
            ))
        })?;
        let json = serde_json::to_string_pretty(transcript)?;
        tokio::fs::write(self.transcript_path(fingerprint), json).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
