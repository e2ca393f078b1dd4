/*!
session.rs - debounced, latest-wins live preview.

Two layers:
  - `Orchestrator`: the synchronous state machine
      Idle -> Debouncing -> Running -> Displaying(Success | Failure)
    Every edit carries a monotonically increasing `EditStamp`; a completion is
    applied only while its stamp is still the newest one seen.
  - `PreviewSession`: a tokio actor owning an `Orchestrator`. It runs the
    debounce timer, spawns one tool invocation per expired window, aborts the
    superseded one, persists accepted successes, and publishes every state
    change on a `watch` channel.
*/

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, sleep_until};

use super::PreviewSettings;
use super::invoker::{InvocationRequest, Payload, ToolInvoker};
use super::sample;
use crate::command::{build_args, synthesize};
use crate::config::{Configuration, OutputFormat};
use crate::error::PreviewError;
use crate::store::StateStore;

/* ---- Stamps / Edits ---- */

/// Identity of one edit; later edits compare greater.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditStamp(pub u64);

impl fmt::Display for EditStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of everything the preview depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edit {
    pub config: Configuration,
    /// Pasted input, used in text mode.
    pub text: String,
}

impl Edit {
    pub fn new(config: Configuration, text: impl Into<String>) -> Self {
        Self {
            config,
            text: text.into(),
        }
    }

    /// Whether there is anything to feed the tool.
    pub fn has_input(&self) -> bool {
        match self.config.file_input() {
            Some(_) => true,
            None => !self.text.trim().is_empty(),
        }
    }

    fn is_runnable(&self) -> bool {
        self.has_input() && self.config.has_enabled_verbs()
    }
}

/* ---- States ---- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSuccess {
    pub output: String,
    /// Command line matching the configuration that produced `output`.
    pub command: String,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Success(PreviewSuccess),
    Failure { message: String, transport: bool },
}

/// Observable preview state. `Idle` means output and command are both cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    Idle { stamp: EditStamp },
    Debouncing { stamp: EditStamp },
    Running { stamp: EditStamp },
    Displaying { stamp: EditStamp, outcome: PreviewOutcome },
}

impl Default for PreviewState {
    fn default() -> Self {
        PreviewState::Idle {
            stamp: EditStamp::default(),
        }
    }
}

impl PreviewState {
    pub fn stamp(&self) -> EditStamp {
        match self {
            PreviewState::Idle { stamp }
            | PreviewState::Debouncing { stamp }
            | PreviewState::Running { stamp }
            | PreviewState::Displaying { stamp, .. } => *stamp,
        }
    }

    /// No timer pending and nothing running.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PreviewState::Idle { .. } | PreviewState::Displaying { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PreviewState::Idle { .. } => "idle",
            PreviewState::Debouncing { .. } => "debouncing",
            PreviewState::Running { .. } => "running",
            PreviewState::Displaying {
                outcome: PreviewOutcome::Success(_),
                ..
            } => "success",
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { .. },
                ..
            } => "failure",
        }
    }
}

/* ---- State Machine ---- */

/// An edit whose debounce window expired and that should be executed now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub stamp: EditStamp,
    pub edit: Edit,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    latest: EditStamp,
    pending: Option<Job>,
    state: PreviewState,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn latest(&self) -> EditStamp {
        self.latest
    }

    /// Records an edit and (re)enters `Debouncing`. Returns `true` when a running job was
    /// superseded. Stamps not newer than the latest are ignored.
    pub fn edit(&mut self, stamp: EditStamp, edit: Edit) -> bool {
        if stamp <= self.latest {
            return false;
        }
        let superseded = matches!(self.state, PreviewState::Running { .. });
        self.latest = stamp;
        self.pending = Some(Job { stamp, edit });
        self.state = PreviewState::Debouncing { stamp };
        superseded
    }

    /// Debounce window expired. Yields the job to execute, or short-circuits to `Idle` when
    /// there is no input or no enabled verb.
    pub fn fire(&mut self) -> Option<Job> {
        let job = self.pending.take()?;
        if job.edit.is_runnable() {
            self.state = PreviewState::Running { stamp: job.stamp };
            Some(job)
        } else {
            self.state = PreviewState::Idle { stamp: job.stamp };
            None
        }
    }

    /// Whether a completion for `stamp` would still be shown.
    pub fn is_current(&self, stamp: EditStamp) -> bool {
        matches!(self.state, PreviewState::Running { stamp: s } if s == stamp)
    }

    /// Applies a finished job. Returns `false` (and changes nothing) for stale results.
    pub fn complete(&mut self, stamp: EditStamp, outcome: PreviewOutcome) -> bool {
        if !self.is_current(stamp) {
            return false;
        }
        self.state = PreviewState::Displaying { stamp, outcome };
        true
    }
}

/* ---- One Preview Cycle ---- */

/// Reads the bounded sample, executes the tool, and classifies the result.
pub async fn run_cycle<I: ToolInvoker>(
    invoker: &I,
    settings: &PreviewSettings,
    edit: &Edit,
) -> Result<PreviewSuccess, PreviewError> {
    let config = &edit.config;
    let args = build_args(config)?;

    let input = match config.file_input() {
        Some(path) => sample::read_head(Path::new(path), settings.sample_lines)
            .await
            .map_err(|source| PreviewError::Io {
                path: path.into(),
                source,
            })?,
        None => sample::bound_text(&edit.text, settings.sample_lines, settings.max_text_bytes)
            .to_string(),
    };

    let output = invoker
        .invoke(InvocationRequest {
            args,
            payload: Payload::Stdin(input),
            output_format: config.output_format,
        })
        .await?;

    if !output.is_clean() {
        return Err(PreviewError::Tool {
            status: output.status,
            stderr: output.stderr,
        });
    }

    Ok(PreviewSuccess {
        output: output.stdout,
        command: synthesize(config),
        format: config.output_format,
    })
}

/* ---- Actor ---- */

struct Completion {
    stamp: EditStamp,
    config: Configuration,
    outcome: Result<PreviewSuccess, PreviewError>,
}

struct Driver<I, S> {
    orchestrator: Orchestrator,
    invoker: Arc<I>,
    store: Arc<S>,
    settings: PreviewSettings,
    state_tx: watch::Sender<PreviewState>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: Option<AbortHandle>,
}

impl<I: ToolInvoker, S: StateStore + 'static> Driver<I, S> {
    async fn run(mut self, mut edits: mpsc::UnboundedReceiver<(EditStamp, Edit)>) {
        let mut deadline: Option<Instant> = None;
        loop {
            let window = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                received = edits.recv() => {
                    let Some((stamp, edit)) = received else { break };
                    if self.orchestrator.edit(stamp, edit) {
                        self.abort_in_flight();
                    }
                    deadline = Some(Instant::now() + self.settings.debounce);
                    self.publish();
                }
                () = window => {
                    deadline = None;
                    if let Some(job) = self.orchestrator.fire() {
                        self.launch(job);
                    }
                    self.publish();
                }
                Some(done) = self.done_rx.recv() => self.finish(done),
            }
        }
        self.abort_in_flight();
        tracing::debug!("preview session closed");
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.orchestrator.state().clone());
    }

    fn abort_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
            tracing::debug!("superseded preview aborted");
        }
    }

    fn launch(&mut self, job: Job) {
        let Job { stamp, edit } = job;
        tracing::debug!(%stamp, "preview started");

        let invoker = Arc::clone(&self.invoker);
        let settings = self.settings.clone();
        let config = edit.config.clone();
        let work = tokio::spawn(async move { run_cycle(invoker.as_ref(), &settings, &edit).await });
        self.in_flight = Some(work.abort_handle());

        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return,
                Err(e) => Err(PreviewError::Internal(panic_message(e.into_panic()))),
            };
            let _ = done_tx.send(Completion {
                stamp,
                config,
                outcome,
            });
        });
    }

    fn finish(&mut self, done: Completion) {
        let Completion {
            stamp,
            config,
            outcome,
        } = done;

        if !self.orchestrator.is_current(stamp) {
            tracing::debug!(%stamp, latest = %self.orchestrator.latest(), "stale preview dropped");
            return;
        }
        self.in_flight = None;

        let shown = match outcome {
            Ok(success) => {
                if let Err(e) = self.store.save(&config) {
                    tracing::warn!(error = %format!("{:#}", anyhow::Error::new(e)), "could not persist state");
                }
                PreviewOutcome::Success(success)
            }
            Err(e) => {
                let transport = e.is_transport();
                let message = format!("{:#}", anyhow::Error::new(e));
                if transport {
                    tracing::error!(target: "telemetry", %stamp, error = %message, "tool could not be run");
                } else {
                    tracing::warn!(%stamp, error = %message, "preview failed");
                }
                PreviewOutcome::Failure { message, transport }
            }
        };

        self.orchestrator.complete(stamp, shown);
        self.publish();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "preview task panicked".to_string()
    }
}

/// Handle to a running preview actor.
pub struct PreviewSession {
    edits: mpsc::UnboundedSender<(EditStamp, Edit)>,
    state: watch::Receiver<PreviewState>,
    next_stamp: u64,
    task: JoinHandle<()>,
}

impl PreviewSession {
    /// Spawns the actor on the current tokio runtime.
    pub fn spawn<I, S>(invoker: Arc<I>, store: Arc<S>, settings: PreviewSettings) -> Self
    where
        I: ToolInvoker,
        S: StateStore + 'static,
    {
        let (edits_tx, edits_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PreviewState::default());
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            orchestrator: Orchestrator::new(),
            invoker,
            store,
            settings,
            state_tx,
            done_tx,
            done_rx,
            in_flight: None,
        };
        let task = tokio::spawn(driver.run(edits_rx));

        Self {
            edits: edits_tx,
            state: state_rx,
            next_stamp: 0,
            task,
        }
    }

    /// Queues an edit; the preview reruns once edits pause for the debounce window.
    pub fn submit(&mut self, edit: Edit) -> Result<EditStamp> {
        self.next_stamp += 1;
        let stamp = EditStamp(self.next_stamp);
        self.edits
            .send((stamp, edit))
            .map_err(|_| anyhow::anyhow!("preview session is no longer running"))?;
        Ok(stamp)
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.clone()
    }

    /// Waits until the preview has settled on `stamp` or a later edit.
    pub async fn settled(&self, stamp: EditStamp) -> Result<PreviewState> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| s.stamp() >= stamp && s.is_settled())
            .await
            .context("preview session stopped before settling")?;
        Ok(state.clone())
    }

    /// Stops the actor, aborting any in-flight invocation.
    pub async fn shutdown(self) {
        drop(self.edits);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputFormat, VerbStep};
    use crate::error::TransportError;
    use crate::preview::invoker::ToolOutput;
    use crate::store::MemoryStateStore;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the argv back after `delay`; fails when the args contain "boom".
    #[derive(Default)]
    struct FakeInvoker {
        calls: Mutex<Vec<InvocationRequest>>,
        delay: Duration,
        missing: bool,
    }

    impl FakeInvoker {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<InvocationRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolInvoker for FakeInvoker {
        fn invoke(
            &self,
            request: InvocationRequest,
        ) -> impl std::future::Future<Output = Result<ToolOutput, TransportError>> + Send {
            self.calls.lock().unwrap().push(request.clone());
            let delay = self.delay;
            let missing = self.missing;
            async move {
                tokio::time::sleep(delay).await;
                if missing {
                    return Err(TransportError::NotFound {
                        program: "mlr".into(),
                    });
                }
                if request.args.iter().any(|a| a == "boom") {
                    return Ok(ToolOutput {
                        stdout: String::new(),
                        stderr: "mlr: verb \"boom\" not found.".into(),
                        status: Some(1),
                    });
                }
                Ok(ToolOutput {
                    stdout: request.args.join(" "),
                    stderr: String::new(),
                    status: Some(0),
                })
            }
        }
    }

    fn settings() -> PreviewSettings {
        PreviewSettings {
            debounce: Duration::from_millis(500),
            ..PreviewSettings::default()
        }
    }

    fn edit(verbs: &[&str]) -> Edit {
        let config = Configuration::default()
            .with_input_format(InputFormat::Csv)
            .with_verbs(verbs.iter().filter_map(VerbStep::new).collect());
        Edit::new(config, "a,b\n1,2\n")
    }

    fn success_output(state: &PreviewState) -> &str {
        match state {
            PreviewState::Displaying {
                outcome: PreviewOutcome::Success(s),
                ..
            } => &s.output,
            other => panic!("expected success, got {other:?}"),
        }
    }

    /* ---- state machine ---- */

    #[test]
    fn stale_completion_is_ignored() {
        let mut o = Orchestrator::new();
        o.edit(EditStamp(1), edit(&["cat"]));
        let job = o.fire().unwrap();
        assert_eq!(job.stamp, EditStamp(1));
        assert!(o.edit(EditStamp(2), edit(&["head"])), "running job superseded");

        let late = PreviewOutcome::Success(PreviewSuccess {
            output: "old".into(),
            command: "mlr cat".into(),
            format: OutputFormat::Auto,
        });
        assert!(!o.complete(EditStamp(1), late));
        assert_eq!(o.state(), &PreviewState::Debouncing { stamp: EditStamp(2) });
    }

    #[test]
    fn no_input_or_no_verbs_goes_idle() {
        let mut o = Orchestrator::new();
        o.edit(EditStamp(1), edit(&[]));
        assert!(o.fire().is_none());
        assert_eq!(o.state(), &PreviewState::Idle { stamp: EditStamp(1) });

        let mut blank = edit(&["cat"]);
        blank.text = "  \n".into();
        o.edit(EditStamp(2), blank);
        assert!(o.fire().is_none());
        assert_eq!(o.state(), &PreviewState::Idle { stamp: EditStamp(2) });
    }

    #[test]
    fn old_stamps_are_rejected() {
        let mut o = Orchestrator::new();
        o.edit(EditStamp(5), edit(&["cat"]));
        o.edit(EditStamp(3), edit(&["head"]));
        assert_eq!(o.latest(), EditStamp(5));
        let job = o.fire().unwrap();
        assert_eq!(job.edit.config.verbs[0].text, "cat");
    }

    /* ---- actor ---- */

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_run() {
        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings());

        session.submit(edit(&["head -n 1"])).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.submit(edit(&["head -n 2"])).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let last = session.submit(edit(&["head -n 3"])).unwrap();

        let state = session.settled(last).await.unwrap();
        assert_eq!(success_output(&state), "--icsv head -n 3");
        assert_eq!(invoker.calls().len(), 1);
        assert_eq!(
            invoker.calls()[0].payload,
            Payload::Stdin("a,b\n1,2\n".into())
        );

        let saved = store.saves();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].verbs[0].text, "head -n 3");
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn later_edit_wins_over_slow_run() {
        let invoker = Arc::new(FakeInvoker::slow(Duration::from_secs(2)));
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings());
        let mut rx = session.subscribe();

        let first = session.submit(edit(&["cat"])).unwrap();
        rx.wait_for(|s| *s == PreviewState::Running { stamp: first })
            .await
            .unwrap();

        let second = session.submit(edit(&["tac"])).unwrap();
        let state = session.settled(second).await.unwrap();

        assert_eq!(state.stamp(), second);
        assert_eq!(success_output(&state), "--icsv tac");
        assert_eq!(invoker.calls().len(), 2);
        assert_eq!(store.saves().len(), 1, "superseded run never persisted");
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pipeline_is_idle_without_invoking() {
        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings());

        let stamp = session.submit(edit(&[])).unwrap();
        let state = session.settled(stamp).await.unwrap();
        assert_eq!(state, PreviewState::Idle { stamp });
        assert!(invoker.calls().is_empty());
        assert!(store.saves().is_empty());
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tool_failure_is_shown_and_not_persisted() {
        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings());

        let stamp = session.submit(edit(&["boom"])).unwrap();
        let state = session.settled(stamp).await.unwrap();
        match state {
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { message, transport },
                ..
            } => {
                assert!(message.contains("status 1"));
                assert!(message.contains("boom"));
                assert!(!transport);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(store.saves().is_empty());
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missing_tool_is_a_transport_failure() {
        let invoker = Arc::new(FakeInvoker {
            missing: true,
            ..FakeInvoker::default()
        });
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker, store.clone(), settings());

        let stamp = session.submit(edit(&["cat"])).unwrap();
        let state = session.settled(stamp).await.unwrap();
        assert!(matches!(
            state,
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { transport: true, .. },
                ..
            }
        ));
        assert!(store.saves().is_empty());
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_file_fails_the_cycle() {
        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store, settings());

        let config = edit(&["cat"])
            .config
            .with_input_file("/definitely/not/here.csv");
        let stamp = session.submit(Edit::new(config, "")).unwrap();
        let state = session.settled(stamp).await.unwrap();
        match state {
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { message, .. },
                ..
            } => assert!(message.contains("/definitely/not/here.csv")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(invoker.calls().is_empty());
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn file_sample_is_bounded_and_sent_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n5,6\n").unwrap();

        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let settings = PreviewSettings {
            sample_lines: 2,
            ..settings()
        };
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings);

        let config = edit(&["cat"])
            .config
            .with_input_file(path.display().to_string());
        let stamp = session.submit(Edit::new(config, "")).unwrap();
        let state = session.settled(stamp).await.unwrap();

        assert_eq!(success_output(&state), "--icsv cat");
        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload, Payload::Stdin("a,b\n1,2\n".into()));
        assert!(!calls[0].args.iter().any(|a| a.ends_with("in.csv")), "path never passed to the tool");

        let saved = store.saves();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].file_input(), Some(path.display().to_string().as_str()));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unsplittable_verb_fails_without_invoking() {
        let invoker = Arc::new(FakeInvoker::default());
        let store = Arc::new(MemoryStateStore::default());
        let mut session = PreviewSession::spawn(invoker.clone(), store.clone(), settings());

        let stamp = session.submit(edit(&["put '$x = 1"])).unwrap();
        let state = session.settled(stamp).await.unwrap();
        match state {
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { message, transport },
                ..
            } => {
                assert!(message.contains("put '$x = 1"), "{message}");
                assert!(!transport);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(invoker.calls().is_empty());
        assert!(store.saves().is_empty());
        session.shutdown().await;
    }
}
