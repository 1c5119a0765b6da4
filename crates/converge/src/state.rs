//! Per-resource lifecycle tracking and event batching.

use crate::bus::Bus;
use crate::event::{Event, ResourceRef};
use shellkit::CommandResult;

/// Lifecycle of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing recorded yet, or deleted
    Transient,
    /// Changes recorded but not committed
    Dirtied,
    /// Matches the last committed snapshot
    Persisted,
}

/// A proposed attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub attribute: String,
    pub old: Option<String>,
    pub new: Option<String>,
    pub privileged: bool,
}

impl Transition {
    pub fn new(attribute: impl Into<String>, old: Option<String>, new: Option<String>) -> Self {
        Self {
            attribute: attribute.into(),
            old,
            new,
            privileged: false,
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Whether anything actually differs.
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

/// Tracks one resource and holds its uncommitted events.
#[derive(Debug)]
pub struct StateMachine {
    resource: ResourceRef,
    state: State,
    pending: Vec<Event>,
}

impl StateMachine {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            state: State::Transient,
            pending: Vec::new(),
        }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Events recorded but not yet published.
    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Point at a new identity, e.g. after a rename.
    pub fn rebind(&mut self, resource: ResourceRef) {
        self.resource = resource;
    }

    fn event(&self, transition: Transition) -> Event {
        Event::new(
            self.resource.clone(),
            transition.attribute,
            transition.old,
            transition.new,
            transition.privileged,
        )
    }

    /// Queue a change without publishing it.
    ///
    /// Ignored when the command failed or the value did not change. Returns
    /// whether an event was queued.
    pub fn update(&mut self, result: &CommandResult, transition: Transition) -> bool {
        if result.failed() || !transition.is_change() {
            return false;
        }
        log::debug!(
            "{} {:?} -> Dirtied ({})",
            self.resource,
            self.state,
            transition.attribute
        );
        let event = self.event(transition);
        self.pending.push(event);
        self.state = State::Dirtied;
        true
    }

    /// Publish everything queued plus `transition`, and mark persisted.
    ///
    /// Nothing happens when the command failed. Returns the number of
    /// events published.
    pub fn persist(
        &mut self,
        result: &CommandResult,
        transition: Option<Transition>,
        bus: &Bus,
    ) -> usize {
        if result.failed() {
            return 0;
        }
        if let Some(transition) = transition.filter(Transition::is_change) {
            let event = self.event(transition);
            self.pending.push(event);
        }
        self.flush(bus)
    }

    /// Publish whatever is queued and mark persisted.
    pub fn commit(&mut self, bus: &Bus) -> usize {
        self.flush(bus)
    }

    fn flush(&mut self, bus: &Bus) -> usize {
        let events = std::mem::take(&mut self.pending);
        let count = events.len();
        for event in events {
            bus.publish(event);
        }
        log::debug!("{} {:?} -> Persisted ({count} events)", self.resource, self.state);
        self.state = State::Persisted;
        count
    }

    /// Announce a deletion right away and reset to transient.
    ///
    /// Uncommitted events are dropped: they describe something that no
    /// longer exists. Nothing happens when the command failed.
    pub fn delete(&mut self, result: &CommandResult, transition: Option<Transition>, bus: &Bus) -> bool {
        if result.failed() {
            return false;
        }
        let dropped = self.discard();
        if !dropped.is_empty() {
            log::debug!("{} dropping {} uncommitted events", self.resource, dropped.len());
        }
        if let Some(transition) = transition.filter(Transition::is_change) {
            bus.publish(self.event(transition));
        }
        self.state = State::Transient;
        true
    }

    /// Drop uncommitted events, returning them.
    pub fn discard(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }
}
