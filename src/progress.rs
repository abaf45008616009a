// Copyright 2026 Modscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for crawl telemetry.
//!
//! The orchestrator emits `ProgressEvent`s as it walks countries and
//! universities; they flow through a `tokio::sync::broadcast` channel to all
//! subscribers (CLI progress bar, log sink, remote relays). Ordering is FIFO
//! within one job. When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Store job id this event belongs to. Cache-backed targeted searches
    /// have no job row and use 0.
    pub job_id: i64,
    /// Monotonically increasing sequence number within the job.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
///
/// A closed set of variants, one per crawl milestone, each carrying only the
/// fields relevant to that milestone so consumers pattern-match exhaustively
/// instead of probing optional keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// The crawl has started.
    Started { message: String },
    /// Country/university discovery finished; totals are now known.
    Discovery {
        total_countries: usize,
        total_universities: usize,
    },
    /// Entering a country.
    CountryStart {
        country: String,
        universities_count: usize,
        completed_countries: usize,
        total_countries: usize,
    },
    /// Starting one university's search.
    UniversityStart {
        country: String,
        university: String,
        completed_universities: usize,
        total_universities: usize,
    },
    /// One university finished (possibly with zero mappings).
    UniversityComplete {
        country: String,
        university: String,
        mappings_found: usize,
    },
    /// One university's search failed after retries; the crawl continues.
    UniversityError {
        country: String,
        university: String,
        error: String,
    },
    /// A country's universities are all done.
    CountryComplete {
        country: String,
        completed_countries: usize,
        total_countries: usize,
    },
    /// The crawl finished successfully.
    Completed {
        total_countries: usize,
        total_universities: usize,
        total_mappings: usize,
        duration_ms: u64,
    },
    /// The crawl failed; the job row carries the same message.
    Error { error: String },
}

/// Sender handle for emitting progress events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an
/// error which we silently ignore.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 512 events buffers a full country comfortably (a university emits at most
/// three events, and consumers drain far faster than the rate-limited crawl
/// produces).
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(512)
}

/// Emit a progress event, silently ignoring send errors (which occur when
/// no receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, job_id: i64, seq: &mut u64, event: ProgressEventKind) {
    if let Some(sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            job_id,
            seq: *seq,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent {
            job_id: 7,
            seq: 3,
            event: ProgressEventKind::UniversityComplete {
                country: "Denmark".to_string(),
                university: "Technical University of Denmark".to_string(),
                mappings_found: 12,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("university_complete"));
        assert!(json.contains("Denmark"));

        // Roundtrip
        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job_id, 7);
        assert_eq!(parsed.seq, 3);
    }

    #[test]
    fn test_events_are_tagged_snake_case() {
        let json = serde_json::to_string(&ProgressEventKind::CountryStart {
            country: "Australia".to_string(),
            universities_count: 14,
            completed_countries: 0,
            total_countries: 40,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"country_start\""));
    }

    #[test]
    fn test_emit_preserves_order() {
        let (tx, mut rx) = channel();
        let mut seq = 0;
        emit(
            &Some(tx.clone()),
            1,
            &mut seq,
            ProgressEventKind::Started {
                message: "go".to_string(),
            },
        );
        emit(
            &Some(tx),
            1,
            &mut seq,
            ProgressEventKind::Discovery {
                total_countries: 2,
                total_universities: 5,
            },
        );

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert!(matches!(first.event, ProgressEventKind::Started { .. }));
    }

    #[test]
    fn test_emit_no_receivers_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        emit(
            &Some(tx),
            1,
            &mut 0,
            ProgressEventKind::Error {
                error: "boom".to_string(),
            },
        );
    }

    #[test]
    fn test_emit_none_sender_is_noop() {
        let mut seq = 0;
        emit(
            &None,
            1,
            &mut seq,
            ProgressEventKind::Started {
                message: "ignored".to_string(),
            },
        );
        assert_eq!(seq, 0);
    }
}
