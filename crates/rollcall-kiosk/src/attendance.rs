//! Newest-first attendance display list fed by `update_attendance` pushes.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use rollcall_ops::ActivityLog;
use rollcall_types::attendance::{AttendanceEvent, AttendanceRow};
use tracing::{debug, warn};

/// Rows are never merged or deduplicated: the service gives no key, so two
/// identical events are two rows.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFeed {
    rows: VecDeque<AttendanceRow>,
    received: u64,
    max_rows: Option<usize>,
}

impl AttendanceFeed {
    /// `max_rows` of `None` keeps every row for the life of the session.
    pub fn new(max_rows: Option<usize>) -> Self {
        Self {
            rows: VecDeque::new(),
            received: 0,
            max_rows,
        }
    }

    pub fn receive(&mut self, event: &AttendanceEvent, log: &mut ActivityLog) -> Option<AttendanceRow> {
        self.receive_at(event, Local::now(), log)
    }

    /// Prepend a row dated from `now`, the local wall clock at receipt.
    /// Events without an identity are rejected with one activity line.
    pub fn receive_at(
        &mut self,
        event: &AttendanceEvent,
        now: DateTime<Local>,
        log: &mut ActivityLog,
    ) -> Option<AttendanceRow> {
        let Some(name) = event.identity() else {
            warn!(time = %event.time, "Rejected attendance event without a name");
            log.record_at(
                format!("Rejected attendance event without a name (time {:?})", event.time),
                now,
            );
            return None;
        };

        self.received += 1;
        let row = AttendanceRow {
            receipt: self.received,
            name: name.to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            time: event.time.clone(),
        };
        log.record_at(
            format!("Attendance marked for {} at {}", row.name, row.time),
            now,
        );
        self.rows.push_front(row.clone());

        if let Some(max_rows) = self.max_rows {
            while self.rows.len() > max_rows {
                if let Some(evicted) = self.rows.pop_back() {
                    debug!(receipt = evicted.receipt, name = %evicted.name, "Evicted attendance row");
                }
            }
        }
        Some(row)
    }

    /// Index 0 is the most recent receipt.
    pub fn rows(&self) -> impl Iterator<Item = &AttendanceRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows accepted since start, evicted ones included.
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn rows_are_newest_first() {
        let mut feed = AttendanceFeed::new(None);
        let mut log = ActivityLog::new(None);
        feed.receive_at(&AttendanceEvent::new("Bob", "09:00"), at(9, 0), &mut log);
        feed.receive_at(&AttendanceEvent::new("Carol", "09:01"), at(9, 1), &mut log);

        let names: Vec<_> = feed.rows().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Carol", "Bob"]);
        let latest = log.latest().expect("log line");
        assert_eq!(latest.message, "Attendance marked for Carol at 09:01");
    }

    #[test]
    fn date_comes_from_receipt_and_time_from_event() {
        let mut feed = AttendanceFeed::new(None);
        let mut log = ActivityLog::new(None);
        // Embedded time is not monotonic and not parsed.
        let row = feed
            .receive_at(&AttendanceEvent::new("Dan", "23:59:59"), at(0, 5), &mut log)
            .expect("row");
        assert_eq!(row.date, "2026-03-02");
        assert_eq!(row.time, "23:59:59");
    }

    #[test]
    fn every_event_is_kept_in_reverse_receipt_order() {
        let mut feed = AttendanceFeed::new(None);
        let mut log = ActivityLog::new(None);
        let events: Vec<_> = ["Eve", "Eve", "Finn", "Eve", "Gus"]
            .iter()
            .enumerate()
            .map(|(i, name)| AttendanceEvent::new(*name, format!("10:0{i}")))
            .collect();
        for event in &events {
            feed.receive_at(event, at(10, 0), &mut log);
        }

        assert_eq!(feed.len(), events.len());
        for (row, event) in feed.rows().zip(events.iter().rev()) {
            assert_eq!(Some(row.name.as_str()), event.identity());
            assert_eq!(row.time, event.time);
        }
        assert_eq!(log.len(), events.len());
    }

    #[test]
    fn blank_identity_is_rejected_with_one_line() {
        let mut feed = AttendanceFeed::new(None);
        let mut log = ActivityLog::new(None);
        let blank = AttendanceEvent {
            name: Some("   ".into()),
            time: "09:00".into(),
        };
        let missing = AttendanceEvent {
            name: None,
            time: "09:01".into(),
        };

        assert!(feed.receive_at(&blank, at(9, 0), &mut log).is_none());
        assert_eq!(log.len(), 1);
        assert!(feed.receive_at(&missing, at(9, 1), &mut log).is_none());
        assert_eq!(log.len(), 2);
        assert!(feed.is_empty());
        assert_eq!(feed.received(), 0);
    }

    #[test]
    fn max_rows_evicts_oldest() {
        let mut feed = AttendanceFeed::new(Some(2));
        let mut log = ActivityLog::new(None);
        for (name, time) in [("A", "08:00"), ("B", "08:01"), ("C", "08:02")] {
            feed.receive_at(&AttendanceEvent::new(name, time), at(8, 0), &mut log);
        }
        let names: Vec<_> = feed.rows().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
        assert_eq!(feed.received(), 3);
    }
}
