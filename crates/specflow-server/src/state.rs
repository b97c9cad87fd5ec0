use specflow::{NotificationHub, SpecWorkflow};
use std::sync::Arc;
use std::time::Instant;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub workflow: SpecWorkflow,
    pub hub: Arc<NotificationHub>,
    started: Instant,
}

impl AppState {
    pub fn new(workflow: SpecWorkflow, observer_buffer: usize) -> Self {
        let hub = Arc::new(NotificationHub::new(workflow.clone(), observer_buffer));
        Self {
            workflow,
            hub,
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
