//! Query and answer telemetry.
//!
//! A single writer thread owns the [`RecordStore`]. Appends are offered to a
//! bounded channel and never awaited, so a slow or failing store cannot
//! delay a search or an answer; when the queue is full the record is dropped
//! with a warning. Mutations that report back (`rate`, `summary`, `flush`)
//! wait for room on the same channel and therefore observe every append
//! queued before them.

pub mod store;

pub use store::{RecordStore, SqliteRecordStore};

use crate::store::ArticleStore;
use crate::types::{AnswerRecord, QueryRecord, RecordSummary};
use kbase_core::{AppError, AppResult};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Commands buffered ahead of the writer.
pub const QUEUE_CAPACITY: usize = 1024;

enum Command {
    Query(QueryRecord),
    Answer(AnswerRecord),
    Click {
        query_id: String,
        article_id: String,
    },
    Rate {
        answer_id: String,
        helpful: bool,
        reply: oneshot::Sender<AppResult<()>>,
    },
    Summary {
        top_n: usize,
        reply: oneshot::Sender<AppResult<RecordSummary>>,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the recorder thread.
pub struct Recorder {
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Recorder {
    /// Start the writer thread.
    ///
    /// When `articles` is given, a recorded click also bumps the article's
    /// view count.
    pub fn spawn(
        store: Box<dyn RecordStore>,
        articles: Option<Arc<dyn ArticleStore>>,
    ) -> AppResult<Self> {
        Self::with_capacity(store, articles, QUEUE_CAPACITY)
    }

    /// Start the writer thread with a queue of `capacity` commands.
    pub fn with_capacity(
        store: Box<dyn RecordStore>,
        articles: Option<Arc<dyn ArticleStore>>,
        capacity: usize,
    ) -> AppResult<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = std::thread::Builder::new()
            .name("kbase-recorder".to_string())
            .spawn(move || run(store, articles, rx))?;

        Ok(Self {
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a query record.
    pub fn record_query(&self, record: QueryRecord) {
        self.send(Command::Query(record));
    }

    /// Queue an answer record.
    pub fn record_answer(&self, record: AnswerRecord) {
        self.send(Command::Answer(record));
    }

    /// Queue a click on one of a query's results.
    ///
    /// Validation failures are logged by the writer.
    pub fn record_click(&self, query_id: impl Into<String>, article_id: impl Into<String>) {
        self.send(Command::Click {
            query_id: query_id.into(),
            article_id: article_id.into(),
        });
    }

    /// Attach a helpfulness rating to a recorded answer.
    pub async fn rate(&self, answer_id: impl Into<String>, helpful: bool) -> AppResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Rate {
            answer_id: answer_id.into(),
            helpful,
            reply,
        })
        .await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn summary(&self, top_n: usize) -> AppResult<RecordSummary> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Summary { top_n, reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    /// Wait until everything sent so far has been written.
    pub async fn flush(&self) -> AppResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Flush(reply)).await?;
        rx.await.map_err(|_| stopped())
    }

    /// Drain pending writes and stop the writer thread. Idempotent.
    pub fn shutdown(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            self.send_shutdown();
            if handle.join().is_err() {
                tracing::error!("Recorder thread panicked");
            }
            tracing::debug!("Recorder stopped");
        }
    }

    fn send(&self, command: Command) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(capacity = self.tx.max_capacity(), "Recorder queue is full, dropping record");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Recorder is stopped, dropping record");
            }
        }
    }

    async fn request(&self, command: Command) -> AppResult<()> {
        self.tx.send(command).await.map_err(|_| stopped())
    }

    /// Queue the stop marker behind everything already pending.
    fn send_shutdown(&self) {
        let mut command = Command::Shutdown;
        loop {
            match self.tx.try_send(command) {
                Ok(()) | Err(TrySendError::Closed(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    command = returned;
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stopped() -> AppError {
    AppError::Other("recorder is stopped".to_string())
}

fn run(
    mut store: Box<dyn RecordStore>,
    articles: Option<Arc<dyn ArticleStore>>,
    mut rx: mpsc::Receiver<Command>,
) {
    tracing::debug!("Recorder started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Query(record) => {
                if let Err(e) = store.append_query(&record) {
                    tracing::warn!(query_id = %record.id, error = %e, "Failed to write query record");
                }
            }
            Command::Answer(record) => {
                if let Err(e) = store.append_answer(&record) {
                    tracing::warn!(answer_id = %record.id, error = %e, "Failed to write answer record");
                }
            }
            Command::Click {
                query_id,
                article_id,
            } => match store.click(&query_id, &article_id) {
                Ok(()) => {
                    if let Some(articles) = &articles {
                        if let Err(e) = articles.increment_views(&article_id) {
                            tracing::warn!(article_id = %article_id, error = %e, "Failed to update view count");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(query_id = %query_id, article_id = %article_id, error = %e, "Rejected click");
                }
            },
            Command::Rate {
                answer_id,
                helpful,
                reply,
            } => {
                let _ = reply.send(store.rate(&answer_id, helpful));
            }
            Command::Summary { top_n, reply } => {
                let _ = reply.send(store.summary(top_n));
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteArticleStore;
    use crate::types::{Article, Citation, RankedHit, SearchMode};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn answer(id: &str) -> AnswerRecord {
        AnswerRecord {
            id: id.to_string(),
            question: "q".to_string(),
            answer: "a".to_string(),
            citations: vec![Citation {
                article_id: "kb-1".to_string(),
                title: "t".to_string(),
            }],
            tokens: 10,
            latency_ms: 5,
            confidence: 0.8,
            helpful: None,
            created_at: Utc::now(),
        }
    }

    fn recorder() -> Recorder {
        Recorder::spawn(Box::new(SqliteRecordStore::open_in_memory().unwrap()), None).unwrap()
    }

    #[tokio::test]
    async fn test_rate_sees_earlier_append() {
        let recorder = recorder();
        recorder.record_answer(answer("ans-1"));
        recorder.rate("ans-1", true).await.unwrap();

        let summary = recorder.summary(5).await.unwrap();
        assert_eq!(summary.total_answers, 1);
        assert_eq!(summary.helpful_answers, 1);
    }

    #[tokio::test]
    async fn test_rate_unknown_answer() {
        let recorder = recorder();
        assert!(matches!(
            recorder.rate("missing", false).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_click_bumps_view_count() {
        let articles: Arc<dyn ArticleStore> = Arc::new(SqliteArticleStore::open_in_memory().unwrap());
        articles.upsert(&Article::new("kb-1", "Creating projects", "body")).unwrap();

        let recorder = Recorder::spawn(
            Box::new(SqliteRecordStore::open_in_memory().unwrap()),
            Some(articles.clone()),
        )
        .unwrap();

        let query = QueryRecord::new(
            "projects",
            SearchMode::Text,
            vec![RankedHit {
                article_id: "kb-1".to_string(),
                score: 0.5,
            }],
        );
        let query_id = query.id.clone();
        recorder.record_query(query);
        recorder.record_click(&query_id, "kb-1");
        recorder.record_click(&query_id, "kb-unrelated");
        recorder.flush().await.unwrap();

        assert_eq!(articles.get("kb-1").unwrap().unwrap().view_count, 1);
        assert_eq!(recorder.summary(5).await.unwrap().clicked_queries, 1);
    }

    struct FailingStore {
        attempts: Arc<AtomicUsize>,
    }

    impl RecordStore for FailingStore {
        fn append_query(&mut self, _record: &QueryRecord) -> AppResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Storage("disk full".to_string()))
        }

        fn append_answer(&mut self, _record: &AnswerRecord) -> AppResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Storage("disk full".to_string()))
        }

        fn rate(&mut self, _answer_id: &str, _helpful: bool) -> AppResult<()> {
            Err(AppError::Storage("disk full".to_string()))
        }

        fn click(&mut self, _query_id: &str, _article_id: &str) -> AppResult<()> {
            Err(AppError::Storage("disk full".to_string()))
        }

        fn query(&self, _id: &str) -> AppResult<Option<QueryRecord>> {
            Ok(None)
        }

        fn answer(&self, _id: &str) -> AppResult<Option<AnswerRecord>> {
            Ok(None)
        }

        fn summary(&self, _top_n: usize) -> AppResult<RecordSummary> {
            Ok(RecordSummary::default())
        }
    }

    #[tokio::test]
    async fn test_write_failures_stay_inside_recorder() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let recorder = Recorder::spawn(
            Box::new(FailingStore {
                attempts: attempts.clone(),
            }),
            None,
        )
        .unwrap();

        recorder.record_query(QueryRecord::new("x", SearchMode::Text, vec![]));
        recorder.record_answer(answer("a"));
        recorder.flush().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    /// Blocks every append until `release` is dropped.
    struct GatedStore {
        appended: Arc<AtomicUsize>,
        entered: std::sync::mpsc::Sender<()>,
        release: std::sync::mpsc::Receiver<()>,
    }

    impl RecordStore for GatedStore {
        fn append_query(&mut self, _record: &QueryRecord) -> AppResult<()> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.appended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn append_answer(&mut self, _record: &AnswerRecord) -> AppResult<()> {
            self.appended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rate(&mut self, _answer_id: &str, _helpful: bool) -> AppResult<()> {
            Ok(())
        }

        fn click(&mut self, _query_id: &str, _article_id: &str) -> AppResult<()> {
            Ok(())
        }

        fn query(&self, _id: &str) -> AppResult<Option<QueryRecord>> {
            Ok(None)
        }

        fn answer(&self, _id: &str) -> AppResult<Option<AnswerRecord>> {
            Ok(None)
        }

        fn summary(&self, _top_n: usize) -> AppResult<RecordSummary> {
            Ok(RecordSummary::default())
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_records() {
        let appended = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let recorder = Recorder::with_capacity(
            Box::new(GatedStore {
                appended: appended.clone(),
                entered: entered_tx,
                release: release_rx,
            }),
            None,
            2,
        )
        .unwrap();

        // The writer holds the first record; two more fit in the queue.
        recorder.record_query(QueryRecord::new("first", SearchMode::Text, vec![]));
        entered_rx.recv().unwrap();
        for text in ["second", "third", "fourth", "fifth"] {
            recorder.record_query(QueryRecord::new(text, SearchMode::Text, vec![]));
        }

        drop(release_tx);
        recorder.flush().await.unwrap();
        assert_eq!(appended.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let recorder = recorder();
        recorder.record_answer(answer("ans-1"));
        recorder.shutdown();
        recorder.shutdown();

        recorder.record_answer(answer("ans-2"));
        assert!(recorder.rate("ans-1", true).await.is_err());
    }
}
