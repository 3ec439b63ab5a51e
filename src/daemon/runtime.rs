//! Panel runtime: UI loop on the calling thread plus one fetch worker.
//!
//! Threads:
//! - **UI thread** (caller): owns the host surface, the reconcile engine, the
//!   scheduler and the notice center. Polls input, dispatches clicks, applies
//!   completed fetches.
//! - **Fetch worker** (`deckmaster-fetch`): owns the store connection and runs
//!   one fetch per request.
//! - **Logger thread**: writes the JSONL activity log (see `logger::activity`).
//!
//! UI → worker is a rendezvous channel. When the worker is still busy the
//! request is abandoned and retried on the next loop iteration, so the worker
//! never starts a fetch for a page the UI has already left.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};

use crate::actions::registry::{CommandRegistry, PanelControl};
use crate::actions::resolver::{ActionResolver, ExecutionReport};
use crate::core::config::Config;
use crate::core::errors::{DeckError, Result};
use crate::daemon::scheduler::{Disposition, Navigation, Scheduler, TickRequest};
use crate::daemon::signals::SignalHandler;
use crate::daemon::state::{PanelState, SharedCounters, StateWriter, shared_counters};
use crate::host::{Host, HostEvent};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::reconcile::engine::{ComponentOutcome, ReconcileEngine, TickReport};
use crate::reconcile::fingerprint::Fingerprint;
use crate::reconcile::notices::{NoticeCenter, NoticeLevel};
use crate::store::{ConfigStore, FetchOutcome, SnapshotFetcher};

/// UI → worker: rendezvous. The worker only accepts a request while idle.
const REQUEST_CHANNEL_CAP: usize = 0;
/// Worker → UI. At most one fetch is in flight, so one slot is enough.
const RESULT_CHANNEL_CAP: usize = 1;
/// Upper bound on how long the UI thread waits for input per iteration.
const UI_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why [`PanelRuntime::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user quit from the host.
    Quit,
    /// SIGTERM/SIGINT or an embedder called `request_shutdown`.
    Signal,
    /// The host surface went away.
    HostClosed,
    /// The fetch worker exited unexpectedly.
    WorkerLost,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quit => "quit",
            Self::Signal => "signal",
            Self::HostClosed => "host closed",
            Self::WorkerLost => "fetch worker lost",
        }
    }
}

/// `PanelControl` over the live scheduler, handed to context handlers.
struct PanelContext<'a> {
    scheduler: &'a mut Scheduler,
}

impl PanelControl for PanelContext<'_> {
    fn current_page(&self) -> u32 {
        self.scheduler.page()
    }

    fn switch_page(&mut self, page: u32) {
        self.scheduler.navigate(Navigation::To(page));
    }

    fn next_page(&mut self) {
        self.scheduler.navigate(Navigation::Next);
    }

    fn previous_page(&mut self) {
        self.scheduler.navigate(Navigation::Previous);
    }

    fn request_refresh(&mut self) {
        self.scheduler.request_refresh();
    }
}

pub struct PanelRuntime<H: Host> {
    config: Config,
    host: H,
    store: Option<Box<dyn ConfigStore>>,
    store_label: String,
    engine: ReconcileEngine,
    scheduler: Scheduler,
    resolver: ActionResolver,
    notices: NoticeCenter,
    signal_handler: SignalHandler,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    state_writer: StateWriter,
    counters: SharedCounters,
    start_time: Instant,
}

impl<H: Host> PanelRuntime<H> {
    /// Wire up every component. Spawns the logger thread and registers OS
    /// signal hooks; the fetch worker starts in [`PanelRuntime::run`].
    pub fn new(
        config: Config,
        store: Box<dyn ConfigStore>,
        host: H,
        registry: CommandRegistry,
    ) -> Result<Self> {
        Self::with_signals(config, store, host, registry, SignalHandler::new())
    }

    /// Like [`PanelRuntime::new`] with caller-supplied signal flags.
    pub fn with_signals(
        config: Config,
        store: Box<dyn ConfigStore>,
        host: H,
        registry: CommandRegistry,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        let (logger_handle, logger_join) =
            spawn_logger(JsonlConfig::for_path(config.paths.activity_log.clone()))?;

        Ok(Self {
            store_label: config.store.sqlite_path.display().to_string(),
            engine: ReconcileEngine::new(config.display.default_background.clone()),
            scheduler: Scheduler::new(&config.scheduler),
            resolver: ActionResolver::new(Arc::new(registry)),
            notices: NoticeCenter::new(&config.notices),
            state_writer: StateWriter::new(config.paths.state_file.clone()),
            signal_handler,
            logger_handle,
            logger_join: Some(logger_join),
            counters: shared_counters(),
            start_time: Instant::now(),
            store: Some(store),
            host,
            config,
        })
    }

    /// Label written to the state file's `store` field.
    pub fn set_store_label(&mut self, label: impl Into<String>) {
        self.store_label = label.into();
    }

    #[must_use]
    pub fn signal_handler(&self) -> SignalHandler {
        self.signal_handler.clone()
    }

    #[must_use]
    pub fn counters(&self) -> SharedCounters {
        Arc::clone(&self.counters)
    }

    #[must_use]
    pub const fn engine(&self) -> &ReconcileEngine {
        &self.engine
    }

    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Run until quit, signal, or the host closes. Consumes the store; a
    /// runtime runs once.
    pub fn run(&mut self) -> Result<StopReason> {
        let store = self.store.take().ok_or_else(|| DeckError::Runtime {
            details: "panel runtime already ran".to_string(),
        })?;

        self.logger_handle.send(ActivityEvent::PanelStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
            page: self.scheduler.page(),
        });
        eprintln!(
            "[DM-RUNTIME] panel starting on page {} (interval={}ms)",
            self.scheduler.page(),
            self.scheduler.interval().as_millis()
        );

        let (request_tx, request_rx) = bounded::<TickRequest>(REQUEST_CHANNEL_CAP);
        let (result_tx, result_rx) = bounded::<(TickRequest, FetchOutcome)>(RESULT_CHANNEL_CAP);
        let worker = spawn_fetch_worker(
            store,
            request_rx,
            result_tx,
            Arc::clone(&self.counters),
        )?;

        let reason = self.ui_loop(&request_tx, &result_rx);

        self.shutdown(request_tx, result_rx, worker, reason);
        Ok(reason)
    }

    fn ui_loop(
        &mut self,
        request_tx: &Sender<TickRequest>,
        result_rx: &Receiver<(TickRequest, FetchOutcome)>,
    ) -> StopReason {
        let poll_timeout = self.scheduler.interval().min(UI_POLL_INTERVAL);

        loop {
            // 1. Signals.
            if self.signal_handler.should_shutdown() {
                eprintln!("[DM-RUNTIME] shutdown requested");
                return StopReason::Signal;
            }
            if self.signal_handler.should_refresh() {
                eprintln!("[DM-SIGNAL] forced refresh");
                self.engine.reset();
                self.scheduler.request_refresh();
            }

            // 2. Host input.
            if !self.host.is_alive() {
                return StopReason::HostClosed;
            }
            let events = match self.host.poll_events(poll_timeout) {
                Ok(events) => events,
                Err(err) => {
                    eprintln!("[DM-RUNTIME] host input failed: {err}");
                    self.logger_handle.error(&err);
                    return StopReason::HostClosed;
                }
            };
            for event in events {
                match event {
                    HostEvent::Quit => return StopReason::Quit,
                    HostEvent::Click(id) => self.handle_click(id),
                    HostEvent::Navigate(navigation) => {
                        let from = self.scheduler.page();
                        self.scheduler.navigate(navigation);
                        self.after_navigation(from);
                    }
                    HostEvent::Resize => {}
                }
            }

            // 3. Completed fetches.
            match result_rx.try_recv() {
                Ok((request, outcome)) => self.handle_fetch(request, outcome),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    let err = DeckError::ChannelClosed {
                        component: "fetch worker",
                    };
                    eprintln!("[DM-RUNTIME] {err}");
                    self.logger_handle.error(&err);
                    return StopReason::WorkerLost;
                }
            }

            // 4. Timer. Runs after input so a navigation's extra tick goes out
            //    in the same iteration when the worker is idle.
            let now = Instant::now();
            if let Some(request) = self.scheduler.on_timer(now) {
                match request_tx.try_send(request) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => self.scheduler.abandon(request.seq),
                    Err(TrySendError::Disconnected(_)) => {
                        self.scheduler.abandon(request.seq);
                        return StopReason::WorkerLost;
                    }
                }
            }

            // 5. Notices.
            if self.notices.expire(now) {
                self.host.show_notices(self.notices.visible());
            }

            // 6. State file.
            let snapshot = self.state_fill();
            self.state_writer.maybe_write(now, snapshot);
        }
    }

    fn handle_click(&mut self, id: u64) {
        let Some(binding) = self.engine.binding(id).cloned() else {
            return;
        };
        let from = self.scheduler.page();
        let report = {
            let mut context = PanelContext {
                scheduler: &mut self.scheduler,
            };
            self.resolver.execute(binding.action.as_deref(), &mut context)
        };
        self.record_actions(&binding.label, &report);
        self.after_navigation(from);
    }

    fn record_actions(&mut self, label: &str, report: &ExecutionReport) {
        if report.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut shown = false;
        {
            let mut counters = self.counters.lock();
            counters.actions += report.tokens.len() as u64;
            counters.action_errors += report.errors().count() as u64;
        }
        for token in &report.tokens {
            let err = token.error();
            self.logger_handle.send(ActivityEvent::ActionInvoked {
                command: token.command.clone(),
                parameter: token.parameter.clone(),
                ok: err.is_none(),
                error_code: err.map(|e| e.code().to_string()),
                error_message: err.map(ToString::to_string),
            });
            if let Some(err) = err {
                shown |= self.notices.push_error(err, now).is_some();
            }
        }
        if report.errors().next().is_some() {
            eprintln!(
                "[DM-ACTION] button '{label}': {} of {} commands failed",
                report.errors().count(),
                report.tokens.len()
            );
        }
        if shown {
            self.host.show_notices(self.notices.visible());
        }
    }

    /// Page changed since `from`: force a full apply of the new page.
    fn after_navigation(&mut self, from: u32) {
        let to = self.scheduler.page();
        if to == from {
            return;
        }
        self.engine.reset();
        self.logger_handle.send(ActivityEvent::PageChanged { from, to });
    }

    fn handle_fetch(&mut self, request: TickRequest, outcome: FetchOutcome) {
        match self.scheduler.complete(request.seq) {
            Disposition::Apply => {}
            Disposition::DiscardStale => {
                self.counters.lock().stale_discards += 1;
                return;
            }
            Disposition::Ignore => return,
        }

        let report = self.engine.apply(outcome, &mut self.host);
        self.record_tick(&report);
    }

    fn record_tick(&mut self, report: &TickReport) {
        {
            let mut counters = self.counters.lock();
            counters.applies += 1;
            if report.buttons == ComponentOutcome::Applied {
                counters.rebuilds += 1;
            }
            counters.malformed_rows += report.malformed as u64;
        }

        if report.buttons == ComponentOutcome::Applied {
            self.logger_handle.send(ActivityEvent::ButtonsApplied {
                page: report.page_number,
                fingerprint: fingerprint_hex(self.engine.buttons_fingerprint()),
                created: report.created,
                destroyed: report.destroyed,
                malformed: report.malformed,
            });
        }
        if report.page == ComponentOutcome::Applied {
            self.logger_handle.send(ActivityEvent::PageApplied {
                page: report.page_number,
                fingerprint: fingerprint_hex(self.engine.page_fingerprint()),
                web_url: self.engine.loaded_url().map(str::to_string),
            });
        }

        if report.problems.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut shown = false;
        for problem in &report.problems {
            self.logger_handle.error(problem);
            shown |= self.notices.push_error(problem, now).is_some();
        }
        if report.malformed > 0 {
            shown |= self
                .notices
                .push(
                    NoticeLevel::Warning,
                    format!(
                        "{} button record(s) on page {} were skipped",
                        report.malformed, report.page_number
                    ),
                    now,
                )
                .is_some();
        }
        if shown {
            self.host.show_notices(self.notices.visible());
        }
    }

    /// Closure that fills the panel-specific state fields.
    fn state_fill(&self) -> impl FnOnce(&mut PanelState) + use<H> {
        let mut counters = self.counters.lock().clone();
        counters.coalesced_ticks = self.scheduler.coalesced_ticks();
        counters.dropped_log_events = self.logger_handle.dropped_events();
        let store = self.store_label.clone();
        let page = self.scheduler.page();
        let materialized = self.engine.materialized().len();
        let buttons_fp = self.engine.buttons_fingerprint().map(|fp| fp.to_hex());
        let page_fp = self.engine.page_fingerprint().map(|fp| fp.to_hex());
        let web_url = self
            .engine
            .current_page()
            .and_then(|p| p.visible_web_url())
            .map(str::to_string);
        move |state| {
            state.store = store;
            state.page = page;
            state.materialized_buttons = materialized;
            state.buttons_fingerprint = buttons_fp;
            state.page_fingerprint = page_fp;
            state.web_url = web_url;
            state.counters = counters;
        }
    }

    fn shutdown(
        &mut self,
        request_tx: Sender<TickRequest>,
        result_rx: Receiver<(TickRequest, FetchOutcome)>,
        worker: thread::JoinHandle<()>,
        reason: StopReason,
    ) {
        let uptime_secs = self.start_time.elapsed().as_secs();

        // 1. No more ticks; late results are ignored.
        self.scheduler.shutdown();

        // 2. Dropping both ends unblocks the worker wherever it is.
        drop(request_tx);
        drop(result_rx);
        if worker.join().is_err() {
            eprintln!("[DM-RUNTIME] fetch worker panicked");
        }

        // 3. Clear the surface and release the host.
        self.engine.teardown(&mut self.host);
        self.host.close();

        // 4. Final state snapshot.
        let snapshot = self.state_fill();
        self.state_writer.write_now(snapshot);

        // 5. Log and stop the logger.
        self.logger_handle.send(ActivityEvent::PanelStopped {
            reason: reason.as_str().to_string(),
            uptime_secs,
        });
        self.logger_handle.shutdown();
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }

        eprintln!(
            "[DM-RUNTIME] panel stopped: {} (uptime={uptime_secs}s)",
            reason.as_str()
        );
    }
}

fn fingerprint_hex(fp: Option<Fingerprint>) -> String {
    fp.map(|fp| fp.to_hex()).unwrap_or_default()
}

// ──────────────────── fetch worker ────────────────────

fn spawn_fetch_worker(
    store: Box<dyn ConfigStore>,
    request_rx: Receiver<TickRequest>,
    result_tx: Sender<(TickRequest, FetchOutcome)>,
    counters: SharedCounters,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("deckmaster-fetch".to_string())
        .spawn(move || {
            fetch_worker_main(SnapshotFetcher::new(store), &request_rx, &result_tx, &counters);
        })
        .map_err(|source| DeckError::Runtime {
            details: format!("failed to spawn fetch worker: {source}"),
        })
}

fn fetch_worker_main<S: ConfigStore>(
    mut fetcher: SnapshotFetcher<S>,
    request_rx: &Receiver<TickRequest>,
    result_tx: &Sender<(TickRequest, FetchOutcome)>,
    counters: &SharedCounters,
) {
    while let Ok(request) = request_rx.recv() {
        let outcome = fetcher.fetch(request.page);
        {
            let mut counters = counters.lock();
            counters.fetches += 1;
            if outcome.page.is_err() || outcome.buttons.is_err() {
                counters.fetch_failures += 1;
            }
        }
        if result_tx.send((request, outcome)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{ButtonRow, PageConfig};

    struct CountingStore;

    impl ConfigStore for CountingStore {
        fn fetch_page(&mut self, _page: u32) -> Result<Option<PageConfig>> {
            Ok(None)
        }

        fn fetch_buttons(&mut self, page: u32) -> Result<Vec<ButtonRow>> {
            if page == 9 {
                return Err(DeckError::Connectivity {
                    context: "test",
                    details: "down".to_string(),
                });
            }
            Ok(Vec::new())
        }
    }

    #[test]
    fn worker_answers_requests_and_counts_failures() {
        let (request_tx, request_rx) = bounded(REQUEST_CHANNEL_CAP);
        let (result_tx, result_rx) = bounded(RESULT_CHANNEL_CAP);
        let counters = shared_counters();
        let worker = spawn_fetch_worker(
            Box::new(CountingStore),
            request_rx,
            result_tx,
            Arc::clone(&counters),
        )
        .unwrap();

        request_tx.send(TickRequest { page: 1, seq: 1 }).unwrap();
        let (request, outcome) = result_rx.recv().unwrap();
        assert_eq!(request.seq, 1);
        assert!(outcome.buttons.is_ok());

        request_tx.send(TickRequest { page: 9, seq: 2 }).unwrap();
        let (_, outcome) = result_rx.recv().unwrap();
        assert!(outcome.buttons.is_err());

        drop(request_tx);
        worker.join().unwrap();
        let counters = counters.lock();
        assert_eq!(counters.fetches, 2);
        assert_eq!(counters.fetch_failures, 1);
    }

    #[test]
    fn context_navigation_goes_through_scheduler() {
        let mut scheduler = Scheduler::new(&crate::core::config::SchedulerConfig::default());
        let mut context = PanelContext {
            scheduler: &mut scheduler,
        };
        context.switch_page(0);
        assert_eq!(context.current_page(), 1);
        context.next_page();
        context.next_page();
        context.previous_page();
        assert_eq!(context.current_page(), 2);
        assert!(scheduler.has_pending_extra());
    }

    #[test]
    fn stop_reasons_have_stable_labels() {
        assert_eq!(StopReason::Quit.as_str(), "quit");
        assert_eq!(StopReason::HostClosed.as_str(), "host closed");
    }
}
