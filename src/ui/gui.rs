// GUI Controller - wires the Slint window to the terminal controller
//
// Threading:
// - The Slint event loop (main thread) owns the MainWindow and the
//   UiController. Nothing else ever touches either.
// - The bridge and the shutdown joins run on tokio. They hand their results
//   over through a crate channel and wake the event loop with
//   `upgrade_in_event_loop`, which invokes the `events-pending` callback.
//   The callback drains the channel without waiting.

use crate::channel::{MessageReceiver, MessageSender, Received, StopSignal, channel};
use crate::models::{ConnectionConfig, InboundChunk, SessionSettings};
use crate::services::{WorkerLauncher, start_session};
use crate::ui::bridge::{Bridge, BridgeExit, NotifyError, UiNotifier};
use crate::ui::controller::{JoinReport, PendingJoin, Renderer, ShutdownReason, UiController};
use anyhow::{Context, Result};
use slint::{CloseRequestResponse, ComponentHandle, Model, ModelRc, SharedString, VecModel, Weak};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

// Include the generated Slint code
slint::include_modules!();

/// How long to wait for the bridge task after the window is gone
const BRIDGE_EXIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Work handed from tokio to the event loop
#[derive(Debug)]
pub enum UiEvent {
    Inbound(InboundChunk),
    Joined(JoinReport),
}

/// Posts [`UiEvent`]s to the event loop from any thread
#[derive(Clone)]
pub struct EventLoopNotifier {
    queue: MessageSender<UiEvent>,
    ui: Weak<MainWindow>,
}

impl EventLoopNotifier {
    fn post(&self, event: UiEvent) -> Result<(), NotifyError> {
        self.queue
            .send(event)
            .map_err(|_| NotifyError("event queue closed".to_string()))?;

        self.ui
            .upgrade_in_event_loop(|ui| ui.invoke_events_pending())
            .map_err(|e| NotifyError(e.to_string()))
    }
}

impl UiNotifier for EventLoopNotifier {
    fn notify(&self, chunk: InboundChunk) -> Result<(), NotifyError> {
        self.post(UiEvent::Inbound(chunk))
    }
}

/// [`Renderer`] backed by the MainWindow properties
pub struct SlintRenderer {
    ui: Weak<MainWindow>,
    lines: Rc<VecModel<SharedString>>,
    limit: usize,
}

impl SlintRenderer {
    fn new(ui: &MainWindow, limit: usize) -> Self {
        let lines = Rc::new(VecModel::<SharedString>::default());
        ui.set_scrollback(ModelRc::from(lines.clone()));

        Self {
            ui: ui.as_weak(),
            lines,
            limit: limit.max(1),
        }
    }
}

impl Renderer for SlintRenderer {
    fn append_line(&mut self, line: &str) {
        self.lines.push(SharedString::from(line));
        while self.lines.row_count() > self.limit {
            self.lines.remove(0);
        }
    }

    fn take_input(&mut self) -> String {
        match self.ui.upgrade() {
            Some(ui) => {
                let text = ui.get_command_text();
                ui.set_command_text(SharedString::new());
                text.to_string()
            }
            None => String::new(),
        }
    }

    fn set_status(&mut self, status: &str) {
        if let Some(ui) = self.ui.upgrade() {
            ui.set_status_text(status.into());
        }
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        if let Some(ui) = self.ui.upgrade() {
            ui.set_input_enabled(enabled);
        }
    }
}

/// Take the next queued event without waiting.
///
/// The borrow ends before the event is handled, so handlers may post again.
fn next_event(queue: &RefCell<MessageReceiver<UiEvent>>) -> Option<UiEvent> {
    match queue.borrow_mut().try_recv() {
        Received::Item(event) => Some(event),
        Received::Empty | Received::Closed => None,
    }
}

type SharedController = Rc<RefCell<UiController<SlintRenderer>>>;

/// GUI Controller that wires the Slint window to one terminal session
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let controller = GuiController::new(
///     &user_config.session,
///     user_config.connection_config()?,
///     WorkerLauncher::Process(WorkerCommand::current_exe()?),
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until the window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,
    controller: SharedController,
    runtime: Handle,
    bridge: Option<JoinHandle<BridgeExit>>,
}

impl GuiController {
    /// Create the window, start the worker and the bridge.
    ///
    /// A worker that cannot be started is reported in the scrollback; the
    /// window still comes up so the user can read the error and quit.
    pub fn new(
        settings: &SessionSettings,
        config: ConnectionConfig,
        launcher: WorkerLauncher,
        runtime: Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;
        let renderer = SlintRenderer::new(&ui, settings.scrollback_limit);

        let (queue_tx, queue_rx) = channel::<UiEvent>();
        let notifier = EventLoopNotifier {
            queue: queue_tx,
            ui: ui.as_weak(),
        };

        let (controller, bridge, start_error) =
            match start_session(&runtime, config.clone(), settings.worker_idle(), launcher) {
                Ok(session) => {
                    let bridge = Bridge::new(session.inbound, session.stop.clone(), notifier.clone())
                        .with_poll_interval(settings.bridge_poll())
                        .with_metrics(session.metrics)
                        .spawn(&runtime);

                    let controller = UiController::new(
                        renderer,
                        config,
                        session.outbound,
                        session.stop,
                        Some(session.worker),
                        settings.join_timeout(),
                    );
                    (controller, Some(bridge), None)
                }
                Err(e) => {
                    tracing::error!("Could not start the serial worker: {}", e);
                    // Nobody reads this channel; the controller refuses commands anyway
                    let (outbound, _) = channel();
                    let controller = UiController::new(
                        renderer,
                        config,
                        outbound,
                        StopSignal::new(),
                        None,
                        settings.join_timeout(),
                    );
                    (controller, None, Some(e))
                }
            };

        let controller = Rc::new(RefCell::new(controller));
        Self::setup_callbacks(&ui, &controller, &runtime, notifier, queue_rx);

        {
            let mut controller = controller.borrow_mut();
            controller.start();
            if let Some(e) = start_error {
                controller.handle_inbound(InboundChunk::open_failed(e));
            }
        }

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            controller,
            runtime,
            bridge,
        })
    }

    /// Run the GUI (blocks until the event loop quits).
    ///
    /// Whatever way the loop ended, the session is shut down before returning.
    pub fn run(mut self) -> Result<()> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run().context("GUI event loop failed");

        // Normally already done by the quit path; this covers every other exit
        let pending = self
            .controller
            .borrow_mut()
            .request_shutdown(ShutdownReason::UserQuit);
        let report = self.runtime.block_on(pending.wait());
        self.controller.borrow_mut().finish_shutdown(&report);

        if let Some(bridge) = self.bridge.take() {
            match self
                .runtime
                .block_on(tokio::time::timeout(BRIDGE_EXIT_TIMEOUT, bridge))
            {
                Ok(Ok(exit)) => tracing::debug!("Bridge finished: {:?}", exit),
                Ok(Err(e)) => tracing::warn!("Bridge task failed: {}", e),
                Err(_) => tracing::warn!("Bridge still running after {:?}", BRIDGE_EXIT_TIMEOUT),
            }
        }

        {
            let controller = self.controller.borrow();
            let session = controller.session();
            tracing::info!(
                "Session closed: {} commands sent, {} chunks ({} bytes) received",
                session.commands_sent(),
                session.chunks_received(),
                session.bytes_received()
            );
        }
        result
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(
        ui: &MainWindow,
        controller: &SharedController,
        runtime: &Handle,
        notifier: EventLoopNotifier,
        queue: MessageReceiver<UiEvent>,
    ) {
        let quitting = Rc::new(Cell::new(false));

        // Relayed chunks and finished joins
        let queue = RefCell::new(queue);
        let c = Rc::clone(controller);
        let rt = runtime.clone();
        let n = notifier.clone();
        ui.on_events_pending(move || {
            while let Some(event) = next_event(&queue) {
                match event {
                    UiEvent::Inbound(chunk) => {
                        let pending = c.borrow_mut().handle_inbound(chunk);
                        if let Some(pending) = pending {
                            Self::spawn_join(&rt, &n, pending);
                        }
                    }
                    UiEvent::Joined(report) => {
                        c.borrow_mut().finish_shutdown(&report);
                        if report.reason == ShutdownReason::UserQuit {
                            if let Err(e) = slint::quit_event_loop() {
                                tracing::error!("Failed to quit the event loop: {}", e);
                            }
                        }
                    }
                }
            }
        });

        let c = Rc::clone(controller);
        ui.on_command_submitted(move || {
            c.borrow_mut().submit_command();
        });

        let c = Rc::clone(controller);
        let rt = runtime.clone();
        let n = notifier.clone();
        let q = Rc::clone(&quitting);
        ui.on_quit_requested(move || {
            Self::begin_quit(&c, &rt, &n, &q);
        });

        // Closing the window goes through the same shutdown; the window stays
        // up until the join reports back.
        let c = Rc::clone(controller);
        let rt = runtime.clone();
        let q = quitting;
        ui.window().on_close_requested(move || {
            Self::begin_quit(&c, &rt, &notifier, &q);
            CloseRequestResponse::KeepWindowShown
        });
    }

    fn begin_quit(
        controller: &SharedController,
        runtime: &Handle,
        notifier: &EventLoopNotifier,
        quitting: &Cell<bool>,
    ) {
        if quitting.replace(true) {
            tracing::debug!("Quit already in progress");
            return;
        }

        tracing::info!("Quit requested");
        let pending = controller
            .borrow_mut()
            .request_shutdown(ShutdownReason::UserQuit);
        Self::spawn_join(runtime, notifier, pending);
    }

    /// Await the join on tokio and post the report back to the event loop.
    fn spawn_join(runtime: &Handle, notifier: &EventLoopNotifier, pending: PendingJoin) {
        let notifier = notifier.clone();
        runtime.spawn(async move {
            let report = pending.wait().await;
            if let Err(e) = notifier.post(UiEvent::Joined(report)) {
                tracing::warn!("Join finished after the event loop stopped: {}", e);
            }
        });
    }
}
