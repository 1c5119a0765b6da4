//! Policy plus bus: everything a command needs besides its target.

use crate::bus::Bus;
use crate::policy::Policy;

/// Execution engine owned by a host.
#[derive(Debug, Default)]
pub struct Engine {
    policy: Policy,
    bus: Bus,
}

impl Engine {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            bus: Bus::new(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }
}
