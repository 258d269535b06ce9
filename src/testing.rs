//! Test doubles shared across module tests.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::host::{HostActions, NoticeLog, Notifier};

/// Records every action it is asked to run and fails the configured ones.
#[derive(Debug, Default)]
pub struct RecordingActions {
    calls: RefCell<Vec<String>>,
    failing: Vec<String>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(actions: &[&str]) -> Self {
        Self {
            calls: RefCell::default(),
            failing: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl HostActions for RecordingActions {
    async fn execute(&self, action: &str) -> Result<()> {
        self.calls.borrow_mut().push(action.to_string());
        if self.failing.iter().any(|a| a == action) {
            bail!("{} is not available", action);
        }
        Ok(())
    }
}

/// A notice log that can be shared with a reconciler and inspected afterwards.
pub fn shared_notices() -> (Rc<NoticeLog>, Rc<dyn Notifier>) {
    let log = Rc::new(NoticeLog::new());
    let notifier: Rc<dyn Notifier> = log.clone();
    (log, notifier)
}
