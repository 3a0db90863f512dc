//! Combined status of the CPU and Heap sessions

use crate::collector::session::SessionController;
use flareprof_shared::types::status::StatusReport;

/// Read-only view over both session controllers
#[derive(Debug, Clone, Copy)]
pub struct StatusReporter<'a> {
    cpu: &'a SessionController,
    heap: &'a SessionController,
}

impl<'a> StatusReporter<'a> {
    pub fn new(cpu: &'a SessionController, heap: &'a SessionController) -> Self {
        Self { cpu, heap }
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            cpu: self.cpu.status(),
            heap: self.heap.status(),
        }
    }
}
