//! Event recording for approval outcomes

use certapprover_types::{ApprovalEvent, CertificateRequest, EventSeverity};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Sink for operator-facing events about a request
pub trait EventRecorder: Send + Sync {
    fn record(
        &self,
        request: &CertificateRequest,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    );
}

/// Records events to the log, a broadcast channel, and a bounded history
#[derive(Debug)]
pub struct BroadcastRecorder {
    event_tx: broadcast::Sender<ApprovalEvent>,
    recent: Mutex<VecDeque<ApprovalEvent>>,
    capacity: usize,
}

impl BroadcastRecorder {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            event_tx,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.event_tx.subscribe()
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> Vec<ApprovalEvent> {
        match self.recent.lock() {
            Ok(recent) => recent.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl EventRecorder for BroadcastRecorder {
    fn record(
        &self,
        request: &CertificateRequest,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        let event = ApprovalEvent::new(request.key(), severity, reason, message);

        match severity {
            EventSeverity::Normal => tracing::info!(
                request = %event.involved_object,
                reason = %event.reason,
                "{}", event.message
            ),
            EventSeverity::Warning => tracing::warn!(
                request = %event.involved_object,
                reason = %event.reason,
                "{}", event.message
            ),
        }

        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            if self.capacity > 0 {
                recent.push_back(event.clone());
            }
        }

        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certapprover_types::CertificateRequestSpec;

    #[test]
    fn test_history_is_bounded_newest_first() {
        let recorder = BroadcastRecorder::new(2);
        let request = CertificateRequest::new("prod", "web", CertificateRequestSpec::default());

        recorder.record(&request, EventSeverity::Normal, "Approval", "one");
        recorder.record(&request, EventSeverity::Normal, "Approval", "two");
        recorder.record(&request, EventSeverity::Warning, "Approval", "three");

        let recent = recorder.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[0].severity, EventSeverity::Warning);
        assert_eq!(recent[1].message, "two");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let recorder = BroadcastRecorder::new(8);
        let mut rx = recorder.subscribe();
        let request = CertificateRequest::new("prod", "web", CertificateRequestSpec::default());

        recorder.record(&request, EventSeverity::Normal, "Approval", "Accepted by policy");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.involved_object, request.key());
        assert_eq!(event.reason, "Approval");
    }
}
