use crate::analytics::{run_analytics, RunParams};
use crate::error::ApiError;
use crate::telemetry::TelemetryProvider;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
}

/// What a stream reader receives: buffered messages, then one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Done(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token(_) => "token",
            StreamEvent::Done(_) => "done",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            StreamEvent::Token(d) | StreamEvent::Done(d) => d,
        }
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    pending: VecDeque<String>,
    output: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub run_id: String,
    pub status: JobStatus,
    pub mode: String,
    pub params: RunParams,
    pub pending: usize,
    pub output: String,
}

/// One tracked analytics request. Status, message queue and output share a
/// lock so a reader never observes `Finished` without the terminal message.
#[derive(Debug)]
pub struct Job {
    id: String,
    mode: String,
    params: RunParams,
    state: Mutex<JobState>,
}

impl Job {
    fn new(id: String, mode: String, params: RunParams) -> Self {
        Self {
            id,
            mode,
            params,
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                pending: VecDeque::new(),
                output: String::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    /// Queues a message for the next stream reader.
    pub fn push_message(&self, msg: impl Into<String>) {
        self.state.lock().pending.push_back(msg.into());
    }

    fn mark_running(&self) {
        let mut st = self.state.lock();
        if st.status == JobStatus::Queued {
            st.status = JobStatus::Running;
        }
    }

    fn finish(&self, output: String, message: String) {
        let mut st = self.state.lock();
        if st.status == JobStatus::Finished {
            tracing::warn!(run_id = %self.id, "job already finished; ignoring second result");
            return;
        }
        st.pending.push_back(message);
        st.output = output;
        st.status = JobStatus::Finished;
    }

    /// Takes every pending message, plus the final output if the job is done.
    fn drain(&self) -> (Vec<String>, Option<String>) {
        let mut st = self.state.lock();
        let messages = st.pending.drain(..).collect();
        let done = (st.status == JobStatus::Finished).then(|| st.output.clone());
        (messages, done)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let st = self.state.lock();
        JobSnapshot {
            run_id: self.id.clone(),
            status: st.status,
            mode: self.mode.clone(),
            params: self.params.clone(),
            pending: st.pending.len(),
            output: st.output.clone(),
        }
    }
}

/// The work a job performs. Returns the job's final output text.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: &Job) -> String;
}

/// Runs session analytics against a telemetry provider.
pub struct AnalyticsRunner {
    provider: Arc<dyn TelemetryProvider>,
    timeout: Option<Duration>,
}

impl AnalyticsRunner {
    pub fn new(provider: Arc<dyn TelemetryProvider>, timeout: Option<Duration>) -> Self {
        Self { provider, timeout }
    }
}

#[async_trait]
impl JobRunner for AnalyticsRunner {
    async fn run(&self, job: &Job) -> String {
        run_analytics(self.provider.as_ref(), job.params(), self.timeout).await
    }
}

/// In-memory job table. Jobs are kept for the lifetime of the store.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    runner: Arc<dyn JobRunner>,
    poll_interval: Duration,
}

impl JobStore {
    pub fn new(runner: Arc<dyn JobRunner>, poll_interval: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            runner,
            poll_interval,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a queued job and starts its worker. Must be called from within
    /// a tokio runtime.
    pub fn submit(&self, mode: impl Into<String>, params: RunParams) -> String {
        let id = Uuid::new_v4().to_string();
        let job = Arc::new(Job::new(id.clone(), mode.into(), params));
        self.jobs.write().insert(id.clone(), job.clone());
        tracing::info!(run_id = %id, params = ?job.params(), "run queued");
        spawn_worker(self.runner.clone(), job);
        id
    }

    /// Event stream for a job: pending messages in order, then `Done`.
    /// Dropping the stream stops polling; the job itself keeps running.
    pub fn stream(
        &self,
        id: &str,
    ) -> Result<impl Stream<Item = StreamEvent> + Send + 'static, ApiError> {
        let job = self.get(id).ok_or(ApiError::NotFound)?;
        let cursor = Cursor {
            job,
            buffered: VecDeque::new(),
            terminal: None,
            closed: false,
            poll_interval: self.poll_interval,
        };
        Ok(stream::unfold(cursor, |mut cur| async move {
            let event = cur.next_event().await?;
            Some((event, cur))
        }))
    }
}

struct Cursor {
    job: Arc<Job>,
    buffered: VecDeque<String>,
    terminal: Option<String>,
    closed: bool,
    poll_interval: Duration,
}

impl Cursor {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(msg) = self.buffered.pop_front() {
                return Some(StreamEvent::Token(msg));
            }
            if let Some(output) = self.terminal.take() {
                self.closed = true;
                return Some(StreamEvent::Done(output));
            }
            if self.closed {
                return None;
            }
            let (messages, done) = self.job.drain();
            let idle = messages.is_empty() && done.is_none();
            self.buffered.extend(messages);
            self.terminal = done;
            if idle {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }
}

fn spawn_worker(runner: Arc<dyn JobRunner>, job: Arc<Job>) {
    tokio::spawn(async move {
        job.mark_running();
        tracing::info!(run_id = %job.id(), "run started");

        // Run the work in its own task so a panic is caught here as a JoinError.
        let work = {
            let job = job.clone();
            tokio::spawn(async move { runner.run(&job).await })
        };
        match work.await {
            Ok(output) => {
                job.finish(output.clone(), output);
                tracing::info!(run_id = %job.id(), "run finished");
            }
            Err(e) => {
                tracing::error!(run_id = %job.id(), error = %e, "run worker failed");
                job.finish(format!("Error: {e}"), format!("❌ Error: {e}"));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Instant;
    use tokio::sync::Notify;

    struct EchoRunner;

    #[async_trait]
    impl JobRunner for EchoRunner {
        async fn run(&self, job: &Job) -> String {
            format!("{} {}", job.params().circuit, job.params().year)
        }
    }

    /// Waits for a signal, emitting progress messages first.
    struct GatedRunner {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, job: &Job) -> String {
            job.push_message("one");
            job.push_message("two");
            self.gate.notified().await;
            job.push_message("three");
            "final".to_string()
        }
    }

    struct PanicRunner;

    #[async_trait]
    impl JobRunner for PanicRunner {
        async fn run(&self, _job: &Job) -> String {
            panic!("provider exploded")
        }
    }

    fn store(runner: impl JobRunner) -> JobStore {
        JobStore::new(Arc::new(runner), Duration::from_millis(10))
    }

    async fn collect(store: &JobStore, id: &str) -> Vec<StreamEvent> {
        let events = store.stream(id).unwrap();
        tokio::time::timeout(Duration::from_secs(5), events.collect::<Vec<_>>())
            .await
            .expect("stream should close")
    }

    #[tokio::test]
    async fn stream_yields_token_then_single_done() {
        let store = store(EchoRunner);
        let id = store.submit("analytics", RunParams::default());
        let events = collect(&store, &id).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Monaco 2024".to_string()),
                StreamEvent::Done("Monaco 2024".to_string()),
            ]
        );
        assert_eq!(store.get(&id).unwrap().status(), JobStatus::Finished);
    }

    #[tokio::test]
    async fn messages_are_delivered_once_in_order() {
        let gate = Arc::new(Notify::new());
        let store = store(GatedRunner { gate: gate.clone() });
        let id = store.submit("analytics", RunParams::default());

        let mut events = Box::pin(store.stream(&id).unwrap());
        assert_eq!(events.next().await, Some(StreamEvent::Token("one".into())));
        assert_eq!(events.next().await, Some(StreamEvent::Token("two".into())));
        gate.notify_one();
        let rest: Vec<StreamEvent> = events.collect().await;
        assert_eq!(
            rest,
            vec![
                StreamEvent::Token("three".into()),
                StreamEvent::Token("final".into()),
                StreamEvent::Done("final".into()),
            ]
        );

        // drained messages are gone; a second reader only sees the terminal event
        let again = collect(&store, &id).await;
        assert_eq!(again, vec![StreamEvent::Done("final".into())]);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = store(EchoRunner);
        assert!(matches!(store.stream("nope"), Err(ApiError::NotFound)));
    }

    #[tokio::test]
    async fn panicking_work_still_finishes_job() {
        let store = store(PanicRunner);
        let id = store.submit("analytics", RunParams::default());
        let events = collect(&store, &id).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].data().starts_with("❌ Error:"));
        assert_eq!(events[1].kind(), "done");
        assert!(events[1].data().starts_with("Error:"));
        assert!(events[1].data().contains("panicked"));
    }

    #[tokio::test]
    async fn concurrent_jobs_do_not_mix() {
        let store = store(EchoRunner);
        let a = store.submit(
            "analytics",
            RunParams {
                circuit: "Spa".into(),
                ..RunParams::default()
            },
        );
        let b = store.submit(
            "analytics",
            RunParams {
                year: 2023,
                ..RunParams::default()
            },
        );
        assert_ne!(a, b);
        let (ea, eb) = tokio::join!(collect(&store, &a), collect(&store, &b));
        assert_eq!(ea.last(), Some(&StreamEvent::Done("Spa 2024".into())));
        assert_eq!(eb.last(), Some(&StreamEvent::Done("Monaco 2023".into())));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn dropped_stream_does_not_cancel_job() {
        let gate = Arc::new(Notify::new());
        let store = store(GatedRunner { gate: gate.clone() });
        let id = store.submit("analytics", RunParams::default());
        {
            let mut events = Box::pin(store.stream(&id).unwrap());
            assert!(events.next().await.is_some());
        }
        gate.notify_one();
        let job = store.get(&id).unwrap();
        let start = Instant::now();
        while job.status() != JobStatus::Finished {
            assert!(start.elapsed() < Duration::from_secs(5));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let snap = job.snapshot();
        assert_eq!(snap.output, "final");
        // "three" and "final" were queued after the reader went away
        assert!(snap.pending >= 2, "pending {}", snap.pending);
    }

    #[tokio::test]
    async fn idle_reader_waits_one_poll_interval() {
        let gate = Arc::new(Notify::new());
        let store = JobStore::new(
            Arc::new(GatedRunner { gate: gate.clone() }),
            Duration::from_millis(100),
        );
        let id = store.submit("analytics", RunParams::default());
        let mut events = Box::pin(store.stream(&id).unwrap());
        events.next().await;
        events.next().await;

        // nothing pending: the reader sleeps instead of spinning
        let notify = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            notify.notify_one();
        });
        let start = Instant::now();
        assert_eq!(events.next().await, Some(StreamEvent::Token("three".into())));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(90), "woke after {waited:?}");
        assert!(waited < Duration::from_secs(2), "woke after {waited:?}");
    }
}
