//! Push fan-out of workflow state to connected observers.
//!
//! Each observer owns a bounded channel of serialized [`PushMessage`]s and a
//! small session: the spec it selected and the last value it successfully
//! received on each channel. Changes are recomputed from disk and pushed as
//! whole values, never as deltas, so an observer that missed a push is
//! brought up to date by the next one.

use crate::approvals::ApprovalRecord;
use crate::classify::{ChangeEvent, Subsystem};
use crate::error::Result;
use crate::paths::SpecLocation;
use crate::specs::{self, SpecSummary};
use crate::steering::SteeringStatus;
use crate::tasks::{TaskRecord, TaskSummary};
use crate::SpecWorkflow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type ObserverId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub specs: Vec<SpecSummary>,
    pub archived_specs: Vec<SpecSummary>,
    pub approvals: Vec<ApprovalRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecsView {
    pub specs: Vec<SpecSummary>,
    pub archived_specs: Vec<SpecSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusView {
    pub spec_name: String,
    pub tasks: Vec<TaskRecord>,
    pub summary: TaskSummary,
    pub in_progress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SteeringView {
    pub status: SteeringStatus,
}

/// Server-to-observer messages, framed as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum PushMessage {
    Initial(Snapshot),
    SpecUpdate(SpecsView),
    ApprovalUpdate(Vec<ApprovalRecord>),
    TaskStatusUpdate(TaskStatusView),
    SteeringUpdate(SteeringView),
}

/// Observer-to-server messages. Anything unrecognized parses as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe { spec_name: String },
    Unsubscribe,
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Self {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            spec_name: Option<String>,
            #[serde(default)]
            data: Option<RawData>,
        }
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawData {
            spec_name: Option<String>,
        }

        let Ok(raw) = serde_json::from_str::<Raw>(text) else {
            return ClientMessage::Unknown;
        };
        match raw.kind.as_str() {
            "subscribe" => raw
                .spec_name
                .or_else(|| raw.data.and_then(|d| d.spec_name))
                .map(|spec_name| ClientMessage::Subscribe { spec_name })
                .unwrap_or(ClientMessage::Unknown),
            "unsubscribe" => ClientMessage::Unsubscribe,
            _ => ClientMessage::Unknown,
        }
    }
}

/// De-duplication key: one last-delivered value per kind of message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Channel {
    Specs,
    Approvals,
    Tasks,
    Steering,
}

struct Observer {
    tx: mpsc::Sender<String>,
    selected: Option<String>,
    last: HashMap<Channel, String>,
}

/// Who a push is addressed to.
enum Audience<'a> {
    All,
    Selected(&'a str),
    One(ObserverId),
}

pub struct NotificationHub {
    workflow: SpecWorkflow,
    observers: Mutex<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl NotificationHub {
    /// `buffer` is the per-observer queue length.
    pub fn new(workflow: SpecWorkflow, buffer: usize) -> Self {
        Self {
            workflow,
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn workflow(&self) -> &SpecWorkflow {
        &self.workflow
    }

    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    /// Registers an observer and queues its `initial` snapshot.
    ///
    /// The snapshot is read while the registry is locked, so any push that
    /// `deliver`s after it also reaches the new observer.
    pub fn connect(&self) -> Result<(ObserverId, mpsc::Receiver<String>)> {
        let mut observers = self.lock();
        let view = self.specs_view()?;
        let approvals = self.workflow.approvals().list()?;
        // Recorded in the same form `deliver` compares against.
        let specs_json = serde_json::to_value(&view)?.to_string();
        let approvals_json = serde_json::to_value(&approvals)?.to_string();
        let message = serde_json::to_string(&PushMessage::Initial(Snapshot {
            specs: view.specs,
            archived_specs: view.archived_specs,
            approvals,
        }))?;

        let (tx, rx) = mpsc::channel(self.buffer);
        // Fresh channel with capacity of at least one.
        let _ = tx.try_send(message);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut last = HashMap::new();
        last.insert(Channel::Specs, specs_json);
        last.insert(Channel::Approvals, approvals_json);
        observers.insert(
            id,
            Observer {
                tx,
                selected: None,
                last,
            },
        );
        drop(observers);
        debug!(observer = id, "Observer connected");
        Ok((id, rx))
    }

    pub fn disconnect(&self, id: ObserverId) {
        if self.lock().remove(&id).is_some() {
            debug!(observer = id, "Observer disconnected");
        }
    }

    /// Changes which spec an observer follows and pushes that spec's tasks.
    pub fn select_spec(&self, id: ObserverId, spec_name: Option<String>) -> Result<()> {
        let view = match spec_name {
            Some(ref name) => Some(self.task_view(name, Some(self.workflow.require_location(name)?))?),
            None => None,
        };
        {
            let mut observers = self.lock();
            let Some(observer) = observers.get_mut(&id) else {
                return Ok(());
            };
            observer.selected = spec_name;
            observer.last.remove(&Channel::Tasks);
        }
        if let Some(view) = view {
            self.deliver(
                Audience::One(id),
                Channel::Tasks,
                &PushMessage::TaskStatusUpdate(view),
            )?;
        }
        Ok(())
    }

    /// Applies an inbound observer message. Unknown messages are ignored.
    pub fn handle_client_message(&self, id: ObserverId, text: &str) {
        let result = match ClientMessage::parse(text) {
            ClientMessage::Subscribe { spec_name } => self.select_spec(id, Some(spec_name)),
            ClientMessage::Unsubscribe => self.select_spec(id, None),
            ClientMessage::Unknown => {
                debug!(observer = id, "Ignoring unrecognized client message");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(observer = id, error = %e, "Client message failed");
        }
    }

    /// Recomputes the projection a change affects and pushes it.
    pub fn apply(&self, event: &ChangeEvent) -> Result<()> {
        match &event.subsystem {
            Subsystem::TaskDocument => {
                if let Some(name) = &event.spec_name {
                    let view = self.task_view(name, event.location)?;
                    self.deliver(
                        Audience::Selected(name),
                        Channel::Tasks,
                        &PushMessage::TaskStatusUpdate(view),
                    )?;
                }
                self.push_specs()
            }
            Subsystem::SpecDirectory => {
                if let Some(name) = &event.spec_name
                    && self.is_selected(name)
                {
                    let location = self.workflow.locate(name)?;
                    let view = self.task_view(name, location)?;
                    self.deliver(
                        Audience::Selected(name),
                        Channel::Tasks,
                        &PushMessage::TaskStatusUpdate(view),
                    )?;
                }
                self.push_specs()
            }
            Subsystem::SpecDocument(_) => self.push_specs(),
            Subsystem::ApprovalRecord { .. } => {
                let approvals = self.workflow.approvals().list()?;
                self.deliver(
                    Audience::All,
                    Channel::Approvals,
                    &PushMessage::ApprovalUpdate(approvals),
                )
            }
            Subsystem::Steering(_) => {
                let status = self.workflow.steering_status();
                self.deliver(
                    Audience::All,
                    Channel::Steering,
                    &PushMessage::SteeringUpdate(SteeringView { status }),
                )
            }
        }
    }

    /// Applies every event from `rx` until the sender side closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChangeEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.apply(&event) {
                warn!(path = %event.path.display(), error = %e, "Failed to apply change");
            }
        }
        debug!("Change stream closed");
    }

    fn push_specs(&self) -> Result<()> {
        let view = self.specs_view()?;
        self.deliver(Audience::All, Channel::Specs, &PushMessage::SpecUpdate(view))
    }

    fn specs_view(&self) -> Result<SpecsView> {
        Ok(SpecsView {
            specs: self.workflow.list_specs(SpecLocation::Active)?,
            archived_specs: self.workflow.list_specs(SpecLocation::Archived)?,
        })
    }

    /// Task list of `name`; a spec found in neither root reads as empty.
    fn task_view(&self, name: &str, location: Option<SpecLocation>) -> Result<TaskStatusView> {
        let parsed = match location {
            Some(location) => specs::read_tasks(self.workflow.paths(), name, location)?,
            None => Default::default(),
        };
        Ok(TaskStatusView {
            spec_name: name.to_string(),
            tasks: parsed.tasks,
            summary: parsed.summary,
            in_progress: parsed.in_progress,
        })
    }

    fn is_selected(&self, name: &str) -> bool {
        self.lock()
            .values()
            .any(|o| o.selected.as_deref() == Some(name))
    }

    /// Sends `message` to its audience, skipping observers whose last
    /// delivered value on `channel` is identical. Observers whose receiver
    /// is gone are dropped; a full queue only skips that observer.
    fn deliver(&self, audience: Audience<'_>, channel: Channel, message: &PushMessage) -> Result<()> {
        let encoded = serde_json::to_value(message)?;
        let data = encoded
            .get("data")
            .map(|d| d.to_string())
            .unwrap_or_default();
        let text = encoded.to_string();

        let mut observers = self.lock();
        let mut closed = Vec::new();
        for (&id, observer) in observers.iter_mut() {
            let addressed = match audience {
                Audience::All => true,
                Audience::Selected(name) => observer.selected.as_deref() == Some(name),
                Audience::One(target) => id == target,
            };
            if !addressed || observer.last.get(&channel) == Some(&data) {
                continue;
            }
            match observer.tx.try_send(text.clone()) {
                Ok(()) => {
                    observer.last.insert(channel, data.clone());
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(observer = id, channel = ?channel, "Observer queue full; push skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }
        for id in closed {
            observers.remove(&id);
            debug!(observer = id, "Pruned closed observer");
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, Observer>> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::{ApprovalType, Decision, NewApproval};
    use crate::classify::ChangeKind;
    use crate::paths::{SteeringKind, WorkflowPaths};
    use crate::tasks::TaskStatus;
    use serde_json::Value;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup(buffer: usize) -> (TempDir, NotificationHub) {
        let temp = TempDir::new().unwrap();
        let paths = WorkflowPaths::new(temp.path());
        let dir = paths.specs_dir().join("auth");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tasks.md"), "- [ ] 1. Login\n- [ ] 2. Logout\n").unwrap();
        (temp, NotificationHub::new(SpecWorkflow::new(paths), buffer))
    }

    fn event(subsystem: Subsystem, spec: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Modified,
            subsystem,
            spec_name: spec.map(str::to_string),
            location: spec.map(|_| SpecLocation::Active),
            path: PathBuf::from("unused"),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn types(messages: &[Value]) -> Vec<&str> {
        messages
            .iter()
            .map(|m| m["type"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_initial_snapshot_exactly_once() {
        let (_temp, hub) = setup(8);
        let (_id, mut rx) = hub.connect().unwrap();
        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["initial"]);
        assert_eq!(messages[0]["data"]["specs"][0]["name"], "auth");
        assert!(messages[0]["data"]["archivedSpecs"].as_array().unwrap().is_empty());

        // An unchanged tree produces nothing further.
        hub.apply(&event(Subsystem::SpecDocument(crate::DocumentKind::Design), Some("auth")))
            .unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(hub.observer_count(), 1);
    }

    #[test]
    fn test_observers_connecting_during_changes_end_current() {
        let (_temp, hub) = setup(1024);
        let hub = Arc::new(hub);

        let writer = {
            let hub = Arc::clone(&hub);
            std::thread::spawn(move || {
                for round in 0..40 {
                    let status = if round % 2 == 0 {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Pending
                    };
                    hub.workflow().set_task_status("auth", "1", status).unwrap();
                    hub.apply(&event(Subsystem::TaskDocument, Some("auth"))).unwrap();
                }
                hub.workflow()
                    .set_task_status("auth", "2", TaskStatus::Completed)
                    .unwrap();
                hub.apply(&event(Subsystem::TaskDocument, Some("auth"))).unwrap();
            })
        };
        let receivers: Vec<_> = (0..20).map(|_| hub.connect().unwrap().1).collect();
        writer.join().unwrap();

        let current = serde_json::to_value(hub.specs_view().unwrap()).unwrap();
        for mut rx in receivers {
            let latest = drain(&mut rx)
                .into_iter()
                .filter(|m| m["type"] == "initial" || m["type"] == "spec-update")
                .last()
                .unwrap();
            assert_eq!(latest["data"]["specs"], current["specs"]);
            assert_eq!(latest["data"]["archivedSpecs"], current["archivedSpecs"]);
        }
    }

    #[test]
    fn test_task_updates_reach_selected_observers_only() {
        let (_temp, hub) = setup(8);
        let (watching, mut rx_watching) = hub.connect().unwrap();
        let (_other, mut rx_other) = hub.connect().unwrap();
        drain(&mut rx_watching);
        drain(&mut rx_other);

        hub.select_spec(watching, Some("auth".to_string())).unwrap();
        let selected = drain(&mut rx_watching);
        assert_eq!(types(&selected), vec!["task-status-update"]);
        assert_eq!(selected[0]["data"]["specName"], "auth");

        hub.workflow()
            .set_task_status("auth", "1", TaskStatus::Completed)
            .unwrap();
        hub.apply(&event(Subsystem::TaskDocument, Some("auth"))).unwrap();

        let watching_msgs = drain(&mut rx_watching);
        assert_eq!(types(&watching_msgs), vec!["task-status-update", "spec-update"]);
        assert_eq!(watching_msgs[0]["data"]["tasks"][0]["status"], "completed");
        assert_eq!(watching_msgs[0]["data"]["summary"]["completed"], 1);

        let other_msgs = drain(&mut rx_other);
        assert_eq!(types(&other_msgs), vec!["spec-update"]);
    }

    #[test]
    fn test_full_queue_self_heals() {
        let (_temp, hub) = setup(1);
        let (_id, mut rx) = hub.connect().unwrap();

        // Queue holds the unread snapshot, so this push is skipped.
        hub.workflow()
            .set_task_status("auth", "1", TaskStatus::Completed)
            .unwrap();
        hub.apply(&event(Subsystem::TaskDocument, Some("auth"))).unwrap();
        assert_eq!(types(&drain(&mut rx)), vec!["initial"]);

        // The skipped value was never recorded, so the next push carries it.
        hub.apply(&event(Subsystem::SpecDocument(crate::DocumentKind::Design), Some("auth")))
            .unwrap();
        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["spec-update"]);
        assert_eq!(messages[0]["data"]["specs"][0]["taskProgress"]["completed"], 1);
    }

    #[test]
    fn test_closed_observers_pruned_without_affecting_others() {
        let (_temp, hub) = setup(8);
        let (_gone, rx_gone) = hub.connect().unwrap();
        let (_kept, mut rx_kept) = hub.connect().unwrap();
        drain(&mut rx_kept);
        drop(rx_gone);

        hub.workflow()
            .approvals()
            .create(NewApproval {
                title: "Requirements".to_string(),
                file_path: "requirements.md".to_string(),
                category_name: "auth".to_string(),
                approval_type: ApprovalType::Document,
            })
            .unwrap();
        hub.apply(&event(
            Subsystem::ApprovalRecord {
                category: Some("auth".to_string()),
            },
            Some("auth"),
        ))
        .unwrap();

        assert_eq!(hub.observer_count(), 1);
        let messages = drain(&mut rx_kept);
        assert_eq!(types(&messages), vec!["approval-update"]);
        assert_eq!(messages[0]["data"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_approval_cycle_pushes_each_change_once() {
        let (_temp, hub) = setup(8);
        let record = hub
            .workflow()
            .approvals()
            .create(NewApproval {
                title: "Design".to_string(),
                file_path: "design.md".to_string(),
                category_name: "auth".to_string(),
                approval_type: ApprovalType::Document,
            })
            .unwrap();
        let (_id, mut rx) = hub.connect().unwrap();
        drain(&mut rx);

        let approval_event = event(Subsystem::ApprovalRecord { category: None }, None);
        hub.workflow()
            .approvals()
            .transition(&record.id, Decision::Approved, "ok", None, None)
            .unwrap();
        hub.apply(&approval_event).unwrap();
        hub.apply(&approval_event).unwrap();

        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["approval-update"]);
        assert_eq!(messages[0]["data"][0]["status"], "approved");
    }

    #[test]
    fn test_steering_update() {
        let (_temp, hub) = setup(8);
        let (_id, mut rx) = hub.connect().unwrap();
        drain(&mut rx);

        let paths = hub.workflow().paths().clone();
        fs::create_dir_all(paths.steering_dir()).unwrap();
        fs::write(paths.steering_file(SteeringKind::Product), "# Product").unwrap();
        hub.apply(&event(Subsystem::Steering(SteeringKind::Product), None))
            .unwrap();

        let messages = drain(&mut rx);
        assert_eq!(types(&messages), vec!["steering-update"]);
        assert_eq!(messages[0]["data"]["status"]["product"]["exists"], true);
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","specName":"auth"}"#),
            ClientMessage::Subscribe {
                spec_name: "auth".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","data":{"specName":"auth"}}"#),
            ClientMessage::Subscribe {
                spec_name: "auth".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"unsubscribe"}"#),
            ClientMessage::Unsubscribe
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#),
            ClientMessage::Unknown
        );
        assert_eq!(ClientMessage::parse("not json"), ClientMessage::Unknown);

        let (_temp, hub) = setup(8);
        let (id, mut rx) = hub.connect().unwrap();
        drain(&mut rx);
        hub.handle_client_message(id, r#"{"type":"subscribe","specName":"missing"}"#);
        assert!(drain(&mut rx).is_empty());
        hub.handle_client_message(id, r#"{"type":"subscribe","specName":"auth"}"#);
        assert_eq!(types(&drain(&mut rx)), vec!["task-status-update"]);
    }

    #[tokio::test]
    async fn test_run_applies_events() {
        let (_temp, hub) = setup(8);
        let hub = Arc::new(hub);
        let (id, mut rx) = hub.connect().unwrap();
        hub.select_spec(id, Some("auth".to_string())).unwrap();
        drain(&mut rx);

        let (tx, events) = mpsc::channel(4);
        let runner = tokio::spawn(hub.clone().run(events));
        hub.workflow()
            .set_task_status("auth", "2", TaskStatus::Completed)
            .unwrap();
        tx.send(event(Subsystem::TaskDocument, Some("auth")))
            .await
            .unwrap();
        drop(tx);
        runner.await.unwrap();

        let messages = drain(&mut rx);
        assert_eq!(messages[0]["type"], "task-status-update");
        assert_eq!(messages[0]["data"]["summary"]["completed"], 1);
    }
}
