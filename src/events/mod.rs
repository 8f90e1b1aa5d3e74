//! Domain events emitted by the services and drained by a background task.

use crate::errors::ServiceError;
use crate::metrics::{self, names};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Like [`send`](Self::send), but a closed channel is only logged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    WorkOrderImported {
        work_order_id: Uuid,
        order_no: String,
    },
    WorkOrderStatusChanged {
        work_order_id: Uuid,
        order_no: String,
        old_status: String,
        new_status: String,
        actor: String,
    },
    WorkOrderNotesUpdated(Uuid),
    WorkOrderDeleted {
        work_order_id: Uuid,
        order_no: String,
    },
    ImportCompleted {
        imported: usize,
        duplicates: usize,
        errors: usize,
    },
    ReportsSynced {
        date: NaiveDate,
        updated: usize,
    },
    AttendanceRecorded {
        group_id: String,
        date: NaiveDate,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkOrderImported { .. } => "work_order_imported",
            Event::WorkOrderStatusChanged { .. } => "work_order_status_changed",
            Event::WorkOrderNotesUpdated(_) => "work_order_notes_updated",
            Event::WorkOrderDeleted { .. } => "work_order_deleted",
            Event::ImportCompleted { .. } => "import_completed",
            Event::ReportsSynced { .. } => "reports_synced",
            Event::AttendanceRecorded { .. } => "attendance_recorded",
        }
    }
}

/// Creates the event channel and its sender.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::increment_counter(names::EVENTS_PROCESSED);

        match &event {
            Event::WorkOrderStatusChanged {
                work_order_id,
                order_no,
                old_status,
                new_status,
                actor,
            } => {
                info!(
                    event = event.name(),
                    %work_order_id,
                    order_no = %order_no,
                    old_status = %old_status,
                    new_status = %new_status,
                    actor = %actor,
                    "Work order status changed"
                );
            }
            Event::ImportCompleted {
                imported,
                duplicates,
                errors,
            } => {
                if *errors > 0 {
                    warn!(
                        event = event.name(),
                        imported, duplicates, errors, "Import finished with errors"
                    );
                } else {
                    info!(
                        event = event.name(),
                        imported, duplicates, "Import finished"
                    );
                }
            }
            other => info!(event = other.name(), details = ?other, "Domain event"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_to_processor() {
        let (sender, rx) = channel(8);
        let handle = tokio::spawn(process_events(rx));

        sender
            .send(Event::WorkOrderNotesUpdated(Uuid::new_v4()))
            .await
            .unwrap();
        drop(sender);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closed_channel_is_an_event_error() {
        let (sender, rx) = channel(1);
        drop(rx);
        let result = sender
            .send(Event::ImportCompleted {
                imported: 1,
                duplicates: 0,
                errors: 0,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::EventError(_))));
    }
}
