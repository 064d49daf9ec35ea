//! Read-only quiz content.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use learnloop_protocol::{ProtocolError, Quiz, QuizId};
use serde::Deserialize;

use crate::QuizError;

/// Looks quizzes up by id.
///
/// Consulted only when a quiz is started or advanced. Implementations are
/// shared across every session without locking, so they must be
/// read-only once the server is running.
pub trait QuizCatalog: Send + Sync + 'static {
    fn quiz(&self, id: QuizId) -> Option<Arc<Quiz>>;
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    quizzes: HashMap<QuizId, Arc<Quiz>>,
}

/// A content file holds one quiz or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum Content {
    One(Quiz),
    Many(Vec<Quiz>),
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quiz`, returning the quiz it replaced if the id was taken.
    pub fn insert(&mut self, quiz: Quiz) -> Option<Arc<Quiz>> {
        self.quizzes.insert(quiz.id, Arc::new(quiz))
    }

    /// Builds a catalog from one JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, QuizError> {
        let mut catalog = Self::new();
        catalog.extend_from_json(json, "inline content")?;
        Ok(catalog)
    }

    /// Loads every `*.json` file in `dir`, in file-name order.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, QuizError> {
        let dir = dir.as_ref();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| QuizError::CatalogIo { path, source }
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            let json = tokio::fs::read_to_string(&path)
                .await
                .map_err(io_err(path.as_path()))?;
            catalog.extend_from_json(&json, &path.display().to_string())?;
        }

        tracing::info!(dir = %dir.display(), quizzes = catalog.len(), "quiz catalog loaded");
        Ok(catalog)
    }

    fn extend_from_json(&mut self, json: &str, origin: &str) -> Result<(), QuizError> {
        let content: Content = serde_json::from_str(json).map_err(|e| {
            QuizError::CatalogParse {
                origin: origin.to_owned(),
                source: ProtocolError::Decode(e),
            }
        })?;
        let quizzes = match content {
            Content::One(quiz) => vec![quiz],
            Content::Many(quizzes) => quizzes,
        };
        for quiz in quizzes {
            if self.insert(quiz).is_some() {
                tracing::warn!(origin, "duplicate quiz id, later definition wins");
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }
}

impl QuizCatalog for MemoryCatalog {
    fn quiz(&self, id: QuizId) -> Option<Arc<Quiz>> {
        self.quizzes.get(&id).cloned()
    }
}
