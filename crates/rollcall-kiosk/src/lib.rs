//! The kiosk: one cooperative task driving capture, overlay, attendance and
//! registration over a single channel to the recognition service.

use std::path::PathBuf;

use futures::stream::BoxStream;
use rollcall_capture::FrameSource;
use rollcall_network::{ChannelTransport, EventHub, TransportEvent};
use rollcall_ops::ActivityLog;
use rollcall_overlay::RasterSurface;
use rollcall_types::{
    attendance::{AttendanceEvent, AttendanceRow},
    config::KioskConfig,
    events::{
        ActivityLine, Condition, ConnectionState, EventPayload, KioskEvent, LifecycleEvent, LifecyclePhase,
        OverlayEvent, StatusMessage,
    },
    protocol::{ClientMessage, RecognitionResults, ServiceMessage},
    registration::{Outcome, RegistrationResponse},
    telemetry::LoopStats,
    RegistrationError, Result, RollcallError,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{interval, sleep_until, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

mod attendance;
mod capture_loop;
mod registration;

pub use attendance::AttendanceFeed;
pub use capture_loop::{CaptureLoop, Reconciled, TickOutcome};
pub use registration::{validate_identity, ExchangeState, RegistrationExchange};

const COMMAND_CAPACITY: usize = 32;

/// Requests from a display surface to the running kiosk.
#[derive(Debug)]
pub enum KioskCommand {
    Register {
        identity: String,
        reply: oneshot::Sender<Result<Outcome>>,
    },
    SetIdentityInput(String),
    SetDisplayScale(f32),
    Shutdown,
}

/// Operator-editable state shared with the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPanel {
    pub identity_input: String,
}

/// Cloneable handle for talking to a running [`Kiosk`].
#[derive(Clone)]
pub struct KioskHandle {
    commands: mpsc::Sender<KioskCommand>,
    hub: EventHub,
}

impl KioskHandle {
    /// Register `identity` from a fresh still. Resolves when the service
    /// answers, the request times out, or it is refused locally.
    pub async fn register(&self, identity: impl Into<String>) -> Result<Outcome> {
        let (reply, response) = oneshot::channel();
        self.send(KioskCommand::Register {
            identity: identity.into(),
            reply,
        })
        .await?;
        response
            .await
            .map_err(|_| kiosk_error("kiosk stopped before the registration finished"))?
    }

    pub async fn set_identity_input(&self, text: impl Into<String>) -> Result<()> {
        self.send(KioskCommand::SetIdentityInput(text.into())).await
    }

    pub async fn set_display_scale(&self, scale: f32) -> Result<()> {
        self.send(KioskCommand::SetDisplayScale(scale)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(KioskCommand::Shutdown).await
    }

    pub fn events(&self) -> BoxStream<'static, KioskEvent> {
        self.hub.subscribe()
    }

    async fn send(&self, command: KioskCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| kiosk_error("kiosk is not running"))
    }
}

pub struct Kiosk<S, T>
where
    S: FrameSource,
    T: ChannelTransport,
{
    config: KioskConfig,
    source: S,
    transport: T,
    hub: EventHub,
    commands: mpsc::Receiver<KioskCommand>,
    capture: CaptureLoop,
    attendance: AttendanceFeed,
    registration: RegistrationExchange,
    pending_reply: Option<oneshot::Sender<Result<Outcome>>>,
    activity: ActivityLog,
    panel: ControlPanel,
    connection: ConnectionState,
    transport_open: bool,
    capture_failing: bool,
    snapshot_dir: Option<PathBuf>,
}

impl<S, T> Kiosk<S, T>
where
    S: FrameSource,
    T: ChannelTransport,
{
    pub fn new(config: KioskConfig, source: S, transport: T, hub: EventHub) -> (Self, KioskHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let handle = KioskHandle {
            commands: commands_tx,
            hub: hub.clone(),
        };
        let kiosk = Self {
            capture: CaptureLoop::new(&config.capture),
            attendance: AttendanceFeed::new(config.attendance.max_rows),
            registration: RegistrationExchange::new(config.registration.timeout()),
            activity: ActivityLog::new(config.ops.activity_log_capacity),
            snapshot_dir: config.ops.snapshot_dir.as_ref().map(PathBuf::from),
            pending_reply: None,
            panel: ControlPanel::default(),
            connection: ConnectionState::Connecting,
            transport_open: true,
            capture_failing: false,
            config,
            source,
            transport,
            hub,
            commands,
        };
        (kiosk, handle)
    }

    /// Open the frame source. A failure leaves the kiosk running without
    /// video and is shown as a persistent status.
    pub async fn boot(&mut self) -> Result<()> {
        self.publish(EventPayload::Lifecycle(LifecycleEvent {
            phase: LifecyclePhase::Boot,
            details: Some(format!("service {}", self.config.channel.url)),
        }));

        if let Some(dir) = &self.snapshot_dir {
            rollcall_ops::ensure_dir(&dir.to_string_lossy())?;
        }

        match self.source.open().await {
            Ok(()) => {
                self.record_activity("Camera started");
            }
            Err(err) => {
                error!(error = %err, "Frame source failed to open");
                self.record_activity(format!("Camera unavailable: {err}"));
                self.publish(EventPayload::Status(
                    StatusMessage::error(format!("Camera unavailable: {err}")).about(Condition::Camera),
                ));
            }
        }

        self.publish(EventPayload::Lifecycle(LifecycleEvent {
            phase: LifecyclePhase::Ready,
            details: None,
        }));
        info!("Kiosk ready");
        Ok(())
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(self.config.capture.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.registration.deadline();
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                event = self.transport.recv(), if self.transport_open => match event {
                    Some(event) => self.handle_transport(event),
                    None => {
                        warn!("Channel transport closed");
                        self.transport_open = false;
                        self.handle_transport(TransportEvent::Disconnected {
                            reason: "transport closed".into(),
                        });
                    }
                },
                command = self.commands.recv() => match command {
                    Some(KioskCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_registration(Instant::now());
                }
            }
        }

        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(Err(kiosk_error("kiosk shut down")));
        }
        self.publish(EventPayload::Lifecycle(LifecycleEvent {
            phase: LifecyclePhase::Shutdown,
            details: Some(format!("{:?}", self.capture.stats())),
        }));
        info!("Kiosk stopped");
        Ok(())
    }

    async fn on_tick(&mut self) {
        match self
            .capture
            .tick(&mut self.source, &self.transport, Instant::now())
            .await
        {
            Ok(_) => {
                if self.capture_failing {
                    self.capture_failing = false;
                    self.publish(EventPayload::Status(
                        StatusMessage::info("Camera recovered").about(Condition::Camera),
                    ));
                }
            }
            Err(err) => {
                warn!(error = %err, "Capture tick failed");
                if !self.capture_failing {
                    self.capture_failing = true;
                    self.publish(EventPayload::Status(
                        StatusMessage::error(format!("Camera error: {err}")).about(Condition::Camera),
                    ));
                }
            }
        }
    }

    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("Connected to recognition service");
                self.set_connection(ConnectionState::Connected);
                self.publish(EventPayload::Status(
                    StatusMessage::info("Connected to recognition service").about(Condition::Channel),
                ));
            }
            TransportEvent::Disconnected { reason } => {
                if matches!(self.connection, ConnectionState::Disconnected { .. }) {
                    debug!(%reason, "Still disconnected");
                }
                self.set_connection(ConnectionState::Disconnected {
                    reason: reason.clone(),
                });
                self.publish(EventPayload::Status(
                    StatusMessage::error(format!("Disconnected from recognition service: {reason}"))
                        .about(Condition::Channel),
                ));
            }
            TransportEvent::Message(message) => self.handle_service_message(message),
        }
    }

    fn handle_service_message(&mut self, message: ServiceMessage) {
        match message {
            ServiceMessage::RecognitionResults(results) => self.apply_results(results),
            ServiceMessage::UpdateAttendance(event) => {
                self.apply_attendance(&event);
            }
            ServiceMessage::AddPersonResponse(response) => self.apply_registration_response(response),
        }
    }

    fn apply_results(&mut self, results: RecognitionResults) {
        if let Reconciled::Accepted { set, viewport } = self.capture.reconcile(results, Instant::now()) {
            self.save_snapshot(set.seq, viewport.surface_size());
            self.publish(EventPayload::Overlay(OverlayEvent {
                annotations: set,
                width: viewport.width,
                height: viewport.height,
            }));
        }
    }

    fn apply_attendance(&mut self, event: &AttendanceEvent) -> Option<AttendanceRow> {
        let row = self.attendance.receive(event, &mut self.activity);
        if let Some(row) = &row {
            self.publish(EventPayload::Attendance(row.clone()));
        }
        self.publish_latest_activity();
        row
    }

    fn apply_registration_response(&mut self, response: RegistrationResponse) {
        if let Some(outcome) = self.registration.complete(response) {
            self.finish_registration(outcome);
        }
    }

    pub async fn handle_command(&mut self, command: KioskCommand) {
        match command {
            KioskCommand::Register { identity, reply } => {
                match self.start_registration(&identity).await {
                    Ok(()) => {
                        self.panel.identity_input = identity;
                        self.pending_reply = Some(reply);
                    }
                    Err(err) => {
                        self.publish(EventPayload::Status(StatusMessage::error(err.to_string())));
                        let _ = reply.send(Err(err.into()));
                    }
                }
            }
            KioskCommand::SetIdentityInput(text) => self.panel.identity_input = text,
            KioskCommand::SetDisplayScale(scale) => self.capture.set_display_scale(scale),
            KioskCommand::Shutdown => {}
        }
    }

    async fn start_registration(&mut self, identity: &str) -> Result<(), RegistrationError> {
        self.registration.ensure_idle()?;
        let name = validate_identity(identity)?.to_string();

        self.record_activity(format!("Capturing image for {name}..."));
        let still = self
            .capture
            .capture_still(&mut self.source)
            .await
            .map_err(|err| RegistrationError::Capture(err.to_string()))?;

        let live_dims = self.source.dimensions().or(self.capture.video_dims());
        let request = self.registration.begin(&name, still, live_dims, Instant::now())?;
        let request_id = request.request_id;
        if let Err(failure) = self.transport.try_send(ClientMessage::AddNewPerson(request)) {
            self.registration.abort();
            warn!(%request_id, %failure, "Registration request not sent");
            return Err(RegistrationError::Transport(failure.to_string()));
        }
        self.publish(EventPayload::Status(StatusMessage::info(format!(
            "Registering {name}..."
        ))));
        Ok(())
    }

    pub fn expire_registration(&mut self, now: Instant) {
        if let Some(outcome) = self.registration.expire(now) {
            self.finish_registration(outcome);
        }
    }

    fn finish_registration(&mut self, outcome: Outcome) {
        let message = outcome.message();
        info!(name = outcome.name(), success = outcome.is_success(), "Registration finished");
        if outcome.is_success() {
            self.record_activity(format!("SUCCESS: {message}"));
            self.publish(EventPayload::Status(StatusMessage::success(message)));
            self.panel.identity_input.clear();
            self.publish(EventPayload::IdentityInput(String::new()));
        } else {
            self.record_activity(format!("ERROR: {message}"));
            self.publish(EventPayload::Status(StatusMessage::error(message)));
        }

        match self.pending_reply.take() {
            Some(reply) => {
                if reply.send(Ok(outcome)).is_err() {
                    debug!("Registration caller went away before the outcome");
                }
            }
            None => debug!("Registration finished with no caller waiting"),
        }
    }

    fn save_snapshot(&self, seq: u64, (width, height): (u32, u32)) {
        let Some(dir) = self.snapshot_dir.clone() else {
            return;
        };
        let mut surface = RasterSurface::new(width, height);
        if !self.capture.repaint(&mut surface) {
            return;
        }
        tokio::task::spawn_blocking(move || match surface.save_png(&dir, seq) {
            Ok(path) => debug!(?path, "Overlay snapshot written"),
            Err(err) => warn!(error = %err, "Overlay snapshot failed"),
        });
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state.clone();
        self.publish(EventPayload::Connection(state));
    }

    fn record_activity(&mut self, message: impl Into<String>) {
        self.activity.record(message);
        self.publish_latest_activity();
    }

    fn publish_latest_activity(&self) {
        if let Some(entry) = self.activity.latest() {
            self.publish(EventPayload::Activity(ActivityLine { line: entry.line() }));
        }
    }

    fn publish(&self, payload: EventPayload) {
        self.hub.publish(KioskEvent::new(payload));
    }

    pub fn attendance(&self) -> &AttendanceFeed {
        &self.attendance
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn capture(&self) -> &CaptureLoop {
        &self.capture
    }

    pub fn registration(&self) -> &RegistrationExchange {
        &self.registration
    }

    pub fn control_panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn stats(&self) -> &LoopStats {
        self.capture.stats()
    }
}

pub fn kiosk_error(message: impl Into<String>) -> RollcallError {
    RollcallError::Kiosk(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rollcall_capture::ScriptedSource;
    use rollcall_network::{local_pair, LocalChannel, ServiceEndpoint};
    use rollcall_types::annotation::{BoundingBox, Detection};

    fn kiosk() -> (
        Kiosk<ScriptedSource, LocalChannel>,
        ServiceEndpoint,
        rollcall_capture::ScriptedControl,
    ) {
        let (source, control) = ScriptedSource::new(32, 24);
        let (channel, service) = local_pair(8);
        let (kiosk, _handle) = Kiosk::new(KioskConfig::default(), source, channel, EventHub::new(64));
        (kiosk, service, control)
    }

    #[tokio::test]
    async fn attendance_pushes_become_rows_and_activity() {
        let (mut kiosk, _service, _control) = kiosk();
        for (name, time) in [("Bob", "09:00"), ("Carol", "09:01")] {
            kiosk.handle_transport(TransportEvent::Message(ServiceMessage::UpdateAttendance(
                AttendanceEvent::new(name, time),
            )));
        }
        let names: Vec<_> = kiosk.attendance().rows().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Carol", "Bob"]);
        assert_eq!(
            kiosk.activity().latest().map(|entry| entry.message.as_str()),
            Some("Attendance marked for Carol at 09:01")
        );
    }

    #[tokio::test]
    async fn disconnect_is_tracked() {
        let (mut kiosk, _service, _control) = kiosk();
        kiosk.handle_transport(TransportEvent::Connected);
        assert_eq!(kiosk.connection(), &ConnectionState::Connected);
        kiosk.handle_transport(TransportEvent::Disconnected {
            reason: "closed by service".into(),
        });
        assert!(matches!(
            kiosk.connection(),
            ConnectionState::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn blank_identity_fails_without_transmitting() {
        let (mut kiosk, mut service, control) = kiosk();
        kiosk.boot().await.expect("boot");
        control.set_ready(true);
        let (reply, response) = oneshot::channel();
        kiosk
            .handle_command(KioskCommand::Register {
                identity: "   ".into(),
                reply,
            })
            .await;

        let err = response.await.expect("reply").unwrap_err();
        assert!(matches!(
            err,
            RollcallError::Registration(RegistrationError::Validation(ref msg)) if msg == "Please enter a name."
        ));
        assert!(service.drain_requests().is_empty());
        assert_eq!(control.grabs(), 0);
        assert!(!kiosk.registration().is_pending());
    }

    #[tokio::test]
    async fn success_clears_identity_input_and_failure_keeps_it() {
        let (mut kiosk, mut service, control) = kiosk();
        kiosk.boot().await.expect("boot");
        control.set_ready(true);

        for success in [false, true] {
            let (reply, response) = oneshot::channel();
            kiosk
                .handle_command(KioskCommand::Register {
                    identity: "Alice".into(),
                    reply,
                })
                .await;
            let Some(ClientMessage::AddNewPerson(request)) = service.try_next_request() else {
                panic!("expected registration request");
            };
            assert_eq!(request.name, "Alice");
            kiosk.handle_transport(TransportEvent::Message(ServiceMessage::AddPersonResponse(
                RegistrationResponse {
                    success,
                    message: if success {
                        "Alice was added successfully!".into()
                    } else {
                        "No face could be detected. Please try again.".into()
                    },
                    request_id: Some(request.request_id),
                },
            )));
            let outcome = response.await.expect("reply").expect("outcome");
            assert_eq!(outcome.is_success(), success);
            let expected_input = if success { "" } else { "Alice" };
            assert_eq!(kiosk.control_panel().identity_input, expected_input);
        }

        assert_eq!(
            kiosk.activity().latest().map(|entry| entry.message.as_str()),
            Some("SUCCESS: Alice was added successfully!")
        );
        assert!(kiosk
            .activity()
            .entries()
            .any(|entry| entry.message == "ERROR: No face could be detected. Please try again."));
    }

    #[tokio::test]
    async fn still_at_a_different_size_than_the_feed_is_refused() {
        let (mut kiosk, mut service, control) = kiosk();
        kiosk.boot().await.expect("boot");
        control.set_ready(true);
        kiosk.on_tick().await;
        assert_eq!(service.drain_requests().len(), 1);

        control.set_grab_size(Some((16, 12)));
        let (reply, response) = oneshot::channel();
        kiosk
            .handle_command(KioskCommand::Register {
                identity: "Alice".into(),
                reply,
            })
            .await;

        let err = response.await.expect("reply").unwrap_err();
        assert!(matches!(
            err,
            RollcallError::Registration(RegistrationError::Validation(ref msg))
                if msg == registration::NO_STILL
        ));
        assert!(service.drain_requests().is_empty());
        assert!(!kiosk.registration().is_pending());
        assert_eq!(kiosk.capture().video_dims(), Some((32, 24)));
    }

    #[tokio::test]
    async fn busy_registration_leaves_the_pending_identity_alone() {
        let (mut kiosk, mut service, control) = kiosk();
        kiosk.boot().await.expect("boot");
        control.set_ready(true);

        let (first_reply, first_response) = oneshot::channel();
        kiosk
            .handle_command(KioskCommand::Register {
                identity: "Alice".into(),
                reply: first_reply,
            })
            .await;
        let Some(ClientMessage::AddNewPerson(request)) = service.try_next_request() else {
            panic!("expected registration request");
        };

        let (second_reply, second_response) = oneshot::channel();
        kiosk
            .handle_command(KioskCommand::Register {
                identity: "Bob".into(),
                reply: second_reply,
            })
            .await;
        let err = second_response.await.expect("reply").unwrap_err();
        assert!(matches!(
            err,
            RollcallError::Registration(RegistrationError::Busy)
        ));
        assert_eq!(kiosk.control_panel().identity_input, "Alice");

        kiosk.handle_transport(TransportEvent::Message(ServiceMessage::AddPersonResponse(
            RegistrationResponse {
                success: true,
                message: "Alice was added successfully!".into(),
                request_id: Some(request.request_id),
            },
        )));
        assert!(first_response.await.expect("reply").expect("outcome").is_success());
        assert_eq!(kiosk.control_panel().identity_input, "");
    }

    #[tokio::test]
    async fn camera_failure_is_not_fatal() {
        let (mut kiosk, _service, control) = kiosk();
        control.deny_open();
        let mut events = kiosk.hub.subscribe();
        kiosk.boot().await.expect("boot keeps going");

        let mut camera_fault = false;
        while let Some(event) = events.next().await {
            match event.payload {
                EventPayload::Status(status) if status.raises() == Some(Condition::Camera) => {
                    camera_fault = true
                }
                EventPayload::Lifecycle(LifecycleEvent {
                    phase: LifecyclePhase::Ready,
                    ..
                }) => break,
                _ => {}
            }
        }
        assert!(camera_fault);
    }

    #[tokio::test]
    async fn accepted_results_publish_overlay() {
        let (mut kiosk, _service, control) = kiosk();
        kiosk.boot().await.expect("boot");
        control.set_ready(true);
        kiosk.on_tick().await;
        kiosk.handle_transport(TransportEvent::Message(ServiceMessage::RecognitionResults(
            RecognitionResults {
                results: vec![Detection::new(BoundingBox::new(1.0, 1.0, 20.0, 20.0), "Alice")],
                seq: Some(1),
            },
        )));
        assert_eq!(kiosk.capture().rendered_seq(), Some(1));
        assert_eq!(kiosk.stats().sets_accepted, 1);
    }
}
