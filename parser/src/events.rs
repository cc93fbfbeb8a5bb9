//! Synchronous publish/subscribe for replay notifications.
//!
//! Callbacks run on the decoding thread, in registration order, before the call that triggered
//! them returns.

use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::guid::Guid128;
use crate::packet::Frame;
use crate::state::{CombatSession, EntityKind};
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EventName {
    FrameDecoded,
    EntityCreated,
    CombatSessionOpened,
    CombatSessionClosed,
}

#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    FrameDecoded(&'a Frame),
    EntityCreated { guid: Guid128, kind: EntityKind },
    CombatSessionOpened(&'a CombatSession),
    CombatSessionClosed(&'a CombatSession),
}

impl Event<'_> {
    pub fn name(&self) -> EventName {
        match self {
            Event::FrameDecoded(_) => EventName::FrameDecoded,
            Event::EntityCreated { .. } => EventName::EntityCreated,
            Event::CombatSessionOpened(_) => EventName::CombatSessionOpened,
            Event::CombatSessionClosed(_) => EventName::CombatSessionClosed,
        }
    }

    /// Keys published with the event. Only frames carry any.
    pub fn filter(&self) -> EventFilter {
        match self {
            Event::FrameDecoded(frame) => EventFilter {
                direction: frame.direction,
                opcode: Some(frame.name().to_string()),
            },
            _ => EventFilter::default(),
        }
    }
}

/// Keys a subscriber narrows on. An unset key matches anything; a set key must equal the
/// published value exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub direction: Option<Direction>,
    pub opcode: Option<String>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn opcode(mut self, name: impl Into<String>) -> Self {
        self.opcode = Some(name.into());
        self
    }

    pub fn matches(&self, published: &EventFilter) -> bool {
        let direction_ok = self.direction.is_none() || self.direction == published.direction;
        let opcode_ok = self.opcode.is_none() || self.opcode == published.opcode;
        direction_ok && opcode_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&Event<'_>)>;

struct Subscription {
    id: SubscriptionId,
    event: EventName,
    filter: EventFilter,
    callback: Callback,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, event: EventName, filter: EventFilter, callback: F) -> SubscriptionId
    where
        F: FnMut(&Event<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            event,
            filter,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn publish(&mut self, event: &Event<'_>) {
        let name = event.name();
        let published = event.filter();
        for subscription in &mut self.subscriptions {
            if subscription.event == name && subscription.filter.matches(&published) {
                (subscription.callback)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
