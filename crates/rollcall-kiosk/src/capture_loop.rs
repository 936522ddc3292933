//! Fixed-cadence capture and reconciliation of annotation replies.
//!
//! Each tick grabs at most one frame, stamps it with the next sequence
//! number and hands it to the transport without waiting for a reply. A tick
//! that finds the source not ready is skipped, never queued. Replies are
//! reconciled against the last rendered sequence number: only a strictly
//! newer set reaches the overlay.

use std::collections::BTreeMap;

use chrono::Utc;
use rollcall_capture::{encode_jpeg_data_uri, FrameSource};
use rollcall_network::{ChannelTransport, SendFailure};
use rollcall_overlay::{DrawSurface, OverlayRenderer, SceneRecorder, Viewport};
use rollcall_types::{
    annotation::AnnotationSet,
    config::{AnnotationPolicy, CaptureConfig},
    protocol::{ClientMessage, ProcessFrame, RecognitionResults},
    telemetry::{LatencySample, LoopStats},
    vision::{EncodedStill, Frame},
    Result,
};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Source had nothing buffered; nothing was captured or sent.
    NotReady,
    Sent { seq: u64 },
    /// Captured but refused by the transport; the frame is gone.
    Dropped { seq: u64, failure: SendFailure },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Newer than anything rendered so far; the overlay was redrawn.
    Accepted {
        set: AnnotationSet,
        viewport: Viewport,
    },
    /// At or below the last rendered sequence number.
    Stale { seq: u64, rendered: u64 },
    /// No usable sequence number under the active policy.
    Untagged,
    /// Echoed a sequence number this loop never issued.
    Unissued { seq: u64 },
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    sent_at: Instant,
    width: u32,
    height: u32,
}

pub struct CaptureLoop {
    policy: AnnotationPolicy,
    jpeg_quality: u8,
    frame_ttl: Duration,
    next_seq: u64,
    last_sent: Option<u64>,
    in_flight: BTreeMap<u64, InFlight>,
    video_dims: Option<(u32, u32)>,
    display_scale: f32,
    /// Latest accepted set; only `reconcile` writes it.
    rendered: Option<(AnnotationSet, Viewport)>,
    renderer: OverlayRenderer,
    scene: SceneRecorder,
    stats: LoopStats,
    last_latency: Option<LatencySample>,
}

impl CaptureLoop {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            policy: config.annotation_policy,
            jpeg_quality: config.jpeg_quality,
            frame_ttl: config.frame_ttl(),
            next_seq: 1,
            last_sent: None,
            in_flight: BTreeMap::new(),
            video_dims: None,
            display_scale: 1.0,
            rendered: None,
            renderer: OverlayRenderer::default(),
            scene: SceneRecorder::new(),
            stats: LoopStats::default(),
            last_latency: None,
        }
    }

    /// Capture, encode and queue one frame if the source is ready.
    pub async fn tick<S, T>(&mut self, source: &mut S, transport: &T, now: Instant) -> Result<TickOutcome>
    where
        S: FrameSource + ?Sized,
        T: ChannelTransport + ?Sized,
    {
        self.expire_in_flight(now);
        if !source.poll_ready() {
            self.stats.ticks_not_ready += 1;
            trace!("Frame source not ready; tick skipped");
            return Ok(TickOutcome::NotReady);
        }

        let frame = Frame::new(self.next_seq, source.grab().await?);
        self.next_seq += 1;
        let seq = frame.seq;
        let (width, height) = frame.dimensions();
        self.video_dims = Some((width, height));
        let still = encode_jpeg_data_uri(&frame.image, self.jpeg_quality)?;

        let message = ClientMessage::ProcessFrame(ProcessFrame {
            image: still.data_uri,
            seq,
        });
        match transport.try_send(message) {
            Ok(()) => {
                self.in_flight.insert(
                    seq,
                    InFlight {
                        sent_at: now,
                        width,
                        height,
                    },
                );
                self.last_sent = Some(seq);
                self.stats.frames_sent += 1;
                trace!(seq, "Frame queued");
                Ok(TickOutcome::Sent { seq })
            }
            Err(failure) => {
                self.stats.frames_dropped += 1;
                debug!(seq, %failure, "Frame dropped");
                Ok(TickOutcome::Dropped { seq, failure })
            }
        }
    }

    /// Apply the staleness guard to one `recognition_results` reply and
    /// redraw the overlay when it passes.
    pub fn reconcile(&mut self, results: RecognitionResults, now: Instant) -> Reconciled {
        let seq = match (results.seq, self.policy, self.last_sent) {
            (Some(seq), _, _) => seq,
            (None, AnnotationPolicy::LastReceived, Some(last_sent)) => last_sent,
            (None, _, _) => {
                self.stats.sets_untagged += 1;
                debug!("Dropping recognition results without a sequence number");
                return Reconciled::Untagged;
            }
        };

        if seq == 0 || seq >= self.next_seq {
            self.stats.sets_untagged += 1;
            debug!(seq, "Dropping recognition results for a frame never sent");
            return Reconciled::Unissued { seq };
        }

        if self.policy == AnnotationPolicy::SequenceGuard {
            if let Some(rendered) = self.rendered_seq() {
                if seq <= rendered {
                    self.stats.sets_stale += 1;
                    trace!(seq, rendered, "Stale recognition results dropped");
                    return Reconciled::Stale { seq, rendered };
                }
            }
        }

        let viewport = self.viewport_for(seq);
        if let Some(flight) = self.in_flight.get(&seq) {
            self.last_latency = Some(LatencySample {
                seq,
                round_trip_ms: now.saturating_duration_since(flight.sent_at).as_millis() as u64,
                captured_at: Utc::now(),
            });
        }
        // Frames at or below the accepted one can never be rendered now.
        let newer = self.in_flight.split_off(&(seq + 1));
        let abandoned = self.in_flight.range(..seq).count();
        self.stats.in_flight_abandoned += abandoned as u64;
        self.in_flight = newer;

        let set = AnnotationSet::new(seq, results.results);
        self.renderer.render(&mut self.scene, &set, viewport);
        self.stats.sets_accepted += 1;
        self.rendered = Some((set.clone(), viewport));
        Reconciled::Accepted { set, viewport }
    }

    /// Grab a still for registration at the current video dimensions. No
    /// sequence number is consumed and nothing is sent. `None` when the
    /// source has nothing buffered.
    pub async fn capture_still<S>(&mut self, source: &mut S) -> Result<Option<EncodedStill>>
    where
        S: FrameSource + ?Sized,
    {
        if !source.poll_ready() {
            return Ok(None);
        }
        let image = source.grab().await?;
        encode_jpeg_data_uri(&image, self.jpeg_quality).map(Some)
    }

    /// Redraw the latest accepted set onto another surface.
    pub fn repaint<D: DrawSurface + ?Sized>(&self, surface: &mut D) -> bool {
        match &self.rendered {
            Some((set, viewport)) => {
                self.renderer.render(surface, set, *viewport);
                true
            }
            None => false,
        }
    }

    pub fn set_display_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.display_scale = scale;
        }
    }

    pub fn rendered(&self) -> Option<&AnnotationSet> {
        self.rendered.as_ref().map(|(set, _)| set)
    }

    pub fn rendered_seq(&self) -> Option<u64> {
        self.rendered.as_ref().map(|(set, _)| set.seq)
    }

    pub fn scene(&self) -> &SceneRecorder {
        &self.scene
    }

    pub fn video_dims(&self) -> Option<(u32, u32)> {
        self.video_dims
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn last_latency(&self) -> Option<&LatencySample> {
        self.last_latency.as_ref()
    }

    fn viewport_for(&self, seq: u64) -> Viewport {
        let (width, height) = self
            .in_flight
            .get(&seq)
            .map(|flight| (flight.width, flight.height))
            .or(self.video_dims)
            .unwrap_or((0, 0));
        Viewport::new(width, height).with_scale(self.display_scale)
    }

    fn expire_in_flight(&mut self, now: Instant) {
        let ttl = self.frame_ttl;
        let before = self.in_flight.len();
        self.in_flight
            .retain(|_, flight| now.saturating_duration_since(flight.sent_at) < ttl);
        let expired = before - self.in_flight.len();
        if expired > 0 {
            self.stats.in_flight_expired += expired as u64;
            debug!(expired, "In-flight frames expired without results");
        }
    }
}
