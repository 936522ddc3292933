//! In-process stand-in for the recognition service, used with `--demo`.
//!
//! Every frame gets one detection in the middle of the picture, labelled
//! with the next enrolled name (or `Unknown` while nobody is enrolled).
//! Every tenth recognized frame also pushes an attendance event.

use chrono::Local;
use rollcall_capture::decode_data_uri;
use rollcall_network::{ServiceEndpoint, TransportEvent};
use rollcall_types::{
    annotation::{BoundingBox, Detection},
    attendance::AttendanceEvent,
    protocol::{ClientMessage, ProcessFrame, RecognitionResults, ServiceMessage},
    registration::{RegistrationRequest, RegistrationResponse},
    Result,
};
use tracing::{debug, info};

const ATTENDANCE_EVERY: u64 = 10;

#[derive(Debug, Default)]
pub struct DemoService {
    enrolled: Vec<String>,
    recognized: u64,
}

impl DemoService {
    pub fn answer(&mut self, request: ClientMessage) -> Vec<ServiceMessage> {
        match request {
            ClientMessage::ProcessFrame(frame) => self.recognize(frame),
            ClientMessage::AddNewPerson(request) => vec![self.enroll(request)],
        }
    }

    fn recognize(&mut self, frame: ProcessFrame) -> Vec<ServiceMessage> {
        let Ok(image) = decode_data_uri(&frame.image) else {
            return vec![ServiceMessage::RecognitionResults(RecognitionResults {
                results: Vec::new(),
                seq: Some(frame.seq),
            })];
        };
        let (width, height) = (image.width as f32, image.height as f32);
        let bbox = BoundingBox::new(width * 0.25, height * 0.25, width * 0.75, height * 0.75);

        let name = if self.enrolled.is_empty() {
            "Unknown".to_string()
        } else {
            let index = (frame.seq as usize / 5) % self.enrolled.len();
            self.enrolled[index].clone()
        };

        let mut replies = vec![ServiceMessage::RecognitionResults(RecognitionResults {
            results: vec![Detection::new(bbox, name.clone())],
            seq: Some(frame.seq),
        })];
        if !self.enrolled.is_empty() {
            self.recognized += 1;
            if self.recognized % ATTENDANCE_EVERY == 0 {
                let time = Local::now().format("%H:%M:%S").to_string();
                replies.push(ServiceMessage::UpdateAttendance(AttendanceEvent::new(name, time)));
            }
        }
        replies
    }

    fn enroll(&mut self, request: RegistrationRequest) -> ServiceMessage {
        let accepted = decode_data_uri(&request.image).is_ok();
        let message = if accepted {
            self.enrolled.push(request.name.clone());
            format!("{} was added successfully!", request.name)
        } else {
            "No face could be detected. Please try again.".to_string()
        };
        info!(name = %request.name, accepted, "Demo enrollment");
        ServiceMessage::AddPersonResponse(RegistrationResponse {
            success: accepted,
            message,
            request_id: Some(request.request_id),
        })
    }
}

pub async fn serve(mut endpoint: ServiceEndpoint) -> Result<()> {
    endpoint.emit(TransportEvent::Connected)?;
    let mut service = DemoService::default();
    while let Some(request) = endpoint.next_request().await {
        debug!(event = request.event_name(), "Demo request");
        for reply in service.answer(request) {
            endpoint.push(reply)?;
        }
    }
    Ok(())
}
