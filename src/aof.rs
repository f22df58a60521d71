use bytes::BytesMut;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::Decoder;
use tracing::{debug, error, info};

use crate::codec::{CodecError, FrameCodec};
use crate::frame::Frame;

#[derive(Debug, ThisError)]
pub enum AofError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("corrupt log record at byte {offset}, after {records} good records: {source}")]
    Corrupt {
        offset: usize,
        records: usize,
        source: CodecError,
    },
}

/// Append-only log of the commands that changed the store.
///
/// Each record is a request frame serialized exactly as it came off the wire, so the file is a
/// plain sequence of RESP arrays. Writes are buffered; they reach the disk on [`Aof::flush`],
/// which [`Aof::spawn_flusher`] calls on a fixed cadence.
#[derive(Clone)]
pub struct Aof {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl Aof {
    /// Opens the log at `path`, creating it if needed. New records go to the end of the file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Aof, AofError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "opened append-only log");

        Ok(Aof {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, frame: &Frame) -> Result<(), AofError> {
        let bytes = frame.serialize();

        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;

        Ok(())
    }

    /// Pushes buffered records to the file and syncs it to stable storage.
    pub async fn flush(&self) -> Result<(), AofError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.get_ref().sync_data().await?;

        Ok(())
    }

    /// Reads the log from the start and calls `visit` with every record, in file order. Returns
    /// the number of records visited.
    ///
    /// Stops at the first record that fails to decode, including a record cut short by the end
    /// of the file. Records before it have already been visited.
    pub async fn replay<F>(&self, mut visit: F) -> Result<usize, AofError>
    where
        F: FnMut(Frame),
    {
        let data = fs::read(&self.path).await?;
        let total = data.len();
        let mut buf = BytesMut::from(&data[..]);
        // The whole file is already in memory, so the size limit is irrelevant here.
        let mut codec = FrameCodec::new(usize::MAX);
        let mut records = 0;

        loop {
            let offset = total - buf.len();

            match codec.decode_eof(&mut buf) {
                Ok(Some(frame)) => {
                    visit(frame);
                    records += 1;
                }
                Ok(None) => return Ok(records),
                Err(source) => {
                    return Err(AofError::Corrupt {
                        offset,
                        records,
                        source,
                    })
                }
            }
        }
    }

    /// Flushes the log every `every` until `shutdown` fires or its sender is dropped.
    pub fn spawn_flusher(
        &self,
        every: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let aof = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = aof.flush().await {
                            error!(
                                error = %e,
                                path = %aof.path.display(),
                                "failed to flush append-only log"
                            );
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            debug!("append-only log flusher stopped");
        })
    }
}
