//! Publish/subscribe for change events and command results.
//!
//! Observers subscribe to a type topic ("files"), to a single resource, or
//! to everything. Results of every command go to a separate channel so that
//! audit consumers see skips and failures too, not just changes.

use crate::event::{Event, ResourceRef, ResultRecord};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Topic that receives every event.
pub const ALL: &str = "*";

/// Receiver of change events.
pub trait Observer: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> Observer for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event);
    }
}

/// What to announce when a mutation succeeds.
#[derive(Debug, Clone)]
pub struct Notice {
    pub resource: ResourceRef,
    pub attribute: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub privileged: bool,
}

impl Notice {
    pub fn new(
        resource: ResourceRef,
        attribute: impl Into<String>,
        from: Option<String>,
        to: Option<String>,
    ) -> Self {
        Self {
            resource,
            attribute: attribute.into(),
            from,
            to,
            privileged: false,
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    fn into_event(self) -> Event {
        Event::new(
            self.resource,
            self.attribute,
            self.from,
            self.to,
            self.privileged,
        )
    }
}

#[derive(Default)]
struct Subscribers {
    topics: HashMap<String, Vec<Arc<dyn Observer>>>,
    instances: HashMap<ResourceRef, Vec<Arc<dyn Observer>>>,
    results: Vec<Sender<ResultRecord>>,
    log: Vec<Event>,
}

/// Notification bus shared by every resource on a host.
#[derive(Default)]
pub struct Bus {
    inner: Mutex<Subscribers>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Bus")
            .field("topics", &inner.topics.keys().collect::<Vec<_>>())
            .field("instances", &inner.instances.len())
            .field("results", &inner.results.len())
            .field("events", &inner.log.len())
            .finish()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive events for a type topic such as "files", or [`ALL`].
    pub fn subscribe(&self, topic: &str, observer: impl Observer + 'static) {
        self.lock()
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(observer));
    }

    /// Receive every event.
    pub fn subscribe_all(&self, observer: impl Observer + 'static) {
        self.subscribe(ALL, observer);
    }

    /// Receive events about one resource.
    pub fn add_observer(&self, resource: &ResourceRef, observer: impl Observer + 'static) {
        self.lock()
            .instances
            .entry(resource.clone())
            .or_default()
            .push(Arc::new(observer));
    }

    /// Open a results channel. Dropping the receiver unsubscribes.
    pub fn subscribe_results(&self) -> Receiver<ResultRecord> {
        let (tx, rx) = mpsc::channel();
        self.lock().results.push(tx);
        rx
    }

    /// Deliver `event` to its topic, its resource and [`ALL`] subscribers.
    ///
    /// Observers run after the bus lock is released, so they may publish.
    pub fn publish(&self, event: Event) {
        let observers: Vec<Arc<dyn Observer>> = {
            let mut inner = self.lock();
            inner.log.push(event.clone());
            let topic = event.resource.topic();
            [ALL, topic.as_str()]
                .iter()
                .filter_map(|t| inner.topics.get(*t))
                .chain(inner.instances.get(&event.resource))
                .flatten()
                .cloned()
                .collect()
        };
        log::debug!("{event} ({} observers)", observers.len());
        for observer in observers {
            observer.handle(&event);
        }
    }

    /// Send a command outcome to every open results channel.
    pub fn publish_result(&self, record: ResultRecord) {
        self.lock()
            .results
            .retain(|tx| tx.send(record.clone()).is_ok());
    }

    /// Run `mutation` and announce `notice` afterwards.
    pub fn notify_about<T>(&self, notice: Notice, mutation: impl FnOnce() -> T) -> (T, bool) {
        self.notify_about_if(notice, |_| true, mutation)
    }

    /// Run `mutation`; announce `notice` only if `criteria` accepts its output.
    ///
    /// Returns the mutation's output and whether the notice went out.
    pub fn notify_about_if<T>(
        &self,
        notice: Notice,
        criteria: impl FnOnce(&T) -> bool,
        mutation: impl FnOnce() -> T,
    ) -> (T, bool) {
        let output = mutation();
        let changed = criteria(&output);
        if changed {
            self.publish(notice.into_event());
        }
        (output, changed)
    }

    /// Every event published so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.lock().log.clone()
    }
}
