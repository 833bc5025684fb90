//! JSON file persistence with a single writer task per file.
//!
//! Every [`JsonFile`] owns one background writer. Saves are queued on a
//! bounded channel and applied in order with an atomic replace, so concurrent
//! callers never race on the same file and readers never see a partial write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::utils::fs;
use crate::{Error, Result};

/// Pending saves allowed before `save` waits for the writer.
const WRITE_QUEUE_CAPACITY: usize = 32;

struct WriteRequest<T> {
    value: T,
    ack: oneshot::Sender<Result<()>>,
}

pub struct JsonFile<T> {
    path: Arc<PathBuf>,
    tx: mpsc::Sender<WriteRequest<T>>,
}

impl<T> Clone for JsonFile<T> {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            tx: self.tx.clone(),
        }
    }
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Bind to `path` and start its writer task. Must be called inside a tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = Arc::new(path.into());
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        tokio::spawn(writer_loop(Arc::clone(&path), rx));
        Self { path, tx }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<T>> {
        let raw = match tokio::fs::read_to_string(self.path.as_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(fs::io_error("reading state file", &self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Queue `value` for writing and wait until it is on disk.
    pub async fn save(&self, value: T) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteRequest { value, ack })
            .await
            .map_err(|_| Error::Other(format!("writer for {} stopped", self.path.display())))?;
        done.await
            .map_err(|_| Error::Other(format!("writer for {} dropped a save", self.path.display())))?
    }
}

async fn writer_loop<T: Serialize>(path: Arc<PathBuf>, mut rx: mpsc::Receiver<WriteRequest<T>>) {
    while let Some(WriteRequest { value, ack }) = rx.recv().await {
        let result = match serde_json::to_vec_pretty(&value) {
            Ok(bytes) => fs::write_atomic(&path, &bytes).await,
            Err(e) => Err(e.into()),
        };
        match &result {
            Ok(()) => debug!(path = %path.display(), "State persisted"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist state"),
        }
        let _ = ack.send(result);
    }
    debug!(path = %path.display(), "State writer stopped");
}
