//! End-to-end runs of the kiosk against an in-process recognition service.

use futures::{stream::BoxStream, StreamExt};
use rollcall_capture::{ScriptedControl, ScriptedSource};
use rollcall_kiosk::{Kiosk, KioskHandle};
use rollcall_network::{local_pair, EventHub, ServiceEndpoint};
use rollcall_types::{
    annotation::{BoundingBox, Detection},
    attendance::AttendanceEvent,
    config::KioskConfig,
    events::{EventPayload, KioskEvent, Tone},
    protocol::{ClientMessage, ProcessFrame, RecognitionResults, ServiceMessage},
    registration::{Outcome, RegistrationRequest, RegistrationResponse},
    RegistrationError, Result, RollcallError,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, timeout, Duration},
};

struct Harness {
    handle: KioskHandle,
    service: ServiceEndpoint,
    control: ScriptedControl,
    events: BoxStream<'static, KioskEvent>,
    task: JoinHandle<Result<()>>,
}

fn start(outbound_capacity: usize) -> Harness {
    let (source, control) = ScriptedSource::new(64, 48);
    let (channel, service) = local_pair(outbound_capacity);
    let (mut kiosk, handle) = Kiosk::new(KioskConfig::default(), source, channel, EventHub::new(512));
    let events = handle.events();
    let task = tokio::spawn(async move {
        kiosk.boot().await?;
        kiosk.run().await
    });
    Harness {
        handle,
        service,
        control,
        events,
        task,
    }
}

impl Harness {
    async fn next_frame(&mut self) -> ProcessFrame {
        loop {
            match self.service.next_request().await {
                Some(ClientMessage::ProcessFrame(frame)) => return frame,
                Some(_) => continue,
                None => panic!("kiosk stopped"),
            }
        }
    }

    async fn next_registration(&mut self) -> RegistrationRequest {
        loop {
            match self.service.next_request().await {
                Some(ClientMessage::AddNewPerson(request)) => return request,
                Some(_) => continue,
                None => panic!("kiosk stopped"),
            }
        }
    }

    /// Events up to and including the first one matching `stop`.
    async fn events_until(&mut self, stop: impl Fn(&EventPayload) -> bool) -> Vec<EventPayload> {
        let mut seen = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(60), self.events.next())
                .await
                .expect("event before timeout")
                .expect("event stream open");
            let done = stop(&event.payload);
            seen.push(event.payload);
            if done {
                return seen;
            }
        }
    }

    async fn stop(self) {
        self.handle.shutdown().await.expect("shutdown");
        self.task.await.expect("join").expect("kiosk run");
    }
}

fn results(seq: u64, name: &str) -> ServiceMessage {
    ServiceMessage::RecognitionResults(RecognitionResults {
        results: vec![Detection::new(BoundingBox::new(4.0, 4.0, 40.0, 40.0), name)],
        seq: Some(seq),
    })
}

fn is_attendance(payload: &EventPayload) -> bool {
    matches!(payload, EventPayload::Attendance(_))
}

#[tokio::test(start_paused = true)]
async fn older_results_never_replace_newer_ones() {
    let mut harness = start(8);
    harness.control.set_ready(true);
    let seqs = [
        harness.next_frame().await.seq,
        harness.next_frame().await.seq,
        harness.next_frame().await.seq,
    ];
    harness.control.set_ready(false);
    assert_eq!(seqs, [1, 2, 3]);

    harness.service.push(results(3, "Carol")).expect("push");
    harness.service.push(results(2, "Bob")).expect("push");
    harness
        .service
        .push(ServiceMessage::UpdateAttendance(AttendanceEvent::new(
            "Zed", "09:00",
        )))
        .expect("push");

    let seen = harness.events_until(is_attendance).await;
    let overlays: Vec<_> = seen
        .iter()
        .filter_map(|payload| match payload {
            EventPayload::Overlay(overlay) => Some(overlay),
            _ => None,
        })
        .collect();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].annotations.seq, 3);
    assert_eq!(overlays[0].annotations.detections[0].name, "Carol");
    assert_eq!((overlays[0].width, overlays[0].height), (64, 48));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn attendance_rows_arrive_in_receipt_order() {
    let mut harness = start(8);
    for (name, time) in [("Bob", "09:00"), ("Carol", "09:01")] {
        harness
            .service
            .push(ServiceMessage::UpdateAttendance(AttendanceEvent::new(
                name, time,
            )))
            .expect("push");
    }

    let mut rows = Vec::new();
    let mut lines = Vec::new();
    while rows.len() < 2 {
        for payload in harness.events_until(is_attendance).await {
            match payload {
                EventPayload::Attendance(row) => rows.push(row),
                EventPayload::Activity(activity) => lines.push(activity.line),
                _ => {}
            }
        }
    }
    let names: Vec<_> = rows.iter().map(|row| (row.receipt, row.name.as_str())).collect();
    assert_eq!(names, vec![(1, "Bob"), (2, "Carol")]);
    assert_eq!(rows[1].time, "09:01");
    assert!(lines
        .iter()
        .any(|line| line.ends_with("Attendance marked for Bob at 09:00")));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn blank_identity_is_refused_without_sending() {
    let mut harness = start(8);
    let err = harness.handle.register("   ").await.unwrap_err();
    assert!(matches!(
        err,
        RollcallError::Registration(RegistrationError::Validation(_))
    ));
    assert!(harness.service.try_next_request().is_none());
    assert_eq!(harness.control.grabs(), 0);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn second_registration_while_pending_is_busy() {
    let mut harness = start(8);
    harness.control.set_ready(true);

    let first = tokio::spawn({
        let handle = harness.handle.clone();
        async move { handle.register("Alice").await }
    });
    let request = harness.next_registration().await;
    assert_eq!(request.name, "Alice");
    assert!(request.image.starts_with("data:image/jpeg;base64,"));

    let err = harness.handle.register("Bob").await.unwrap_err();
    assert!(matches!(
        err,
        RollcallError::Registration(RegistrationError::Busy)
    ));

    harness
        .service
        .push(ServiceMessage::AddPersonResponse(RegistrationResponse {
            success: true,
            message: "Alice was added successfully!".into(),
            request_id: Some(request.request_id),
        }))
        .expect("push");
    let outcome = first.await.expect("join").expect("outcome");
    assert_eq!(
        outcome,
        Outcome::Accepted {
            name: "Alice".into(),
            message: "Alice was added successfully!".into(),
        }
    );

    let seen = harness
        .events_until(|payload| matches!(payload, EventPayload::IdentityInput(_)))
        .await;
    assert!(seen.iter().any(|payload| matches!(
        payload,
        EventPayload::Status(status) if status.tone == Tone::Success
    )));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_registration_times_out_and_late_reply_is_ignored() {
    let mut harness = start(8);
    harness.control.set_ready(true);

    let pending = tokio::spawn({
        let handle = harness.handle.clone();
        async move { handle.register("Alice").await }
    });
    let request = harness.next_registration().await;
    let outcome = pending.await.expect("join").expect("outcome");
    assert_eq!(
        outcome,
        Outcome::TimedOut {
            name: "Alice".into()
        }
    );

    harness
        .service
        .push(ServiceMessage::AddPersonResponse(RegistrationResponse {
            success: true,
            message: "Alice was added successfully!".into(),
            request_id: Some(request.request_id),
        }))
        .expect("push");
    harness
        .service
        .push(ServiceMessage::UpdateAttendance(AttendanceEvent::new(
            "Zed", "09:00",
        )))
        .expect("push");

    let seen = harness.events_until(is_attendance).await;
    assert!(!seen.iter().any(|payload| matches!(
        payload,
        EventPayload::Status(status) if status.tone == Tone::Success
    )));
    assert!(!seen
        .iter()
        .any(|payload| matches!(payload, EventPayload::IdentityInput(_))));

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn source_that_is_never_ready_sends_nothing() {
    let mut harness = start(8);
    sleep(Duration::from_secs(2)).await;
    assert!(harness.service.try_next_request().is_none());
    assert_eq!(harness.control.grabs(), 0);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn full_outbound_queue_drops_frames_without_stalling() {
    let mut harness = start(1);
    harness.control.set_ready(true);
    sleep(Duration::from_secs(2)).await;

    let queued = harness.service.drain_requests();
    assert_eq!(queued.len(), 1);
    assert!(matches!(&queued[0], ClientMessage::ProcessFrame(frame) if frame.seq == 1));
    assert!(harness.control.grabs() > 1);

    let next = harness.next_frame().await;
    assert!(next.seq > 2);

    harness.stop().await;
}
