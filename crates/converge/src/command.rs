//! One guarded, verified, reported mutation.
//!
//! A [`Command`] is built per call and consumed by [`Command::run`]:
//!
//! 1. In idempotent mode, the change criteria decide whether the body runs.
//!    A skip yields a `no_change` result with exit status 0.
//! 2. The body runs and returns a [`CommandResult`].
//! 3. A successful result is checked by the success predicate, if any, and
//!    handed to the after-change callback, if any.
//! 4. The result is published on the results channel, whatever it was.

use crate::changeable::{Change, Changeable, Criteria};
use crate::engine::Engine;
use crate::event::ResultRecord;
use shellkit::{CommandResult, Error};

type Verify<'a, C> = Box<dyn FnOnce(&mut C, &CommandResult) -> bool + 'a>;
type AfterChange<'a, C> = Box<dyn FnOnce(&mut C, &CommandResult) + 'a>;

/// Builder for one mutation. `C` is whatever context the body and
/// callbacks work on.
pub struct Command<'a, C: ?Sized> {
    operation: String,
    arguments: Vec<String>,
    criteria: Option<Criteria<'a, C>>,
    verify: Option<Verify<'a, C>>,
    after_change: Option<AfterChange<'a, C>>,
}

impl<C: ?Sized> std::fmt::Debug for Command<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("operation", &self.operation)
            .field("arguments", &self.arguments)
            .field("criteria", &self.criteria)
            .field("verify", &self.verify.is_some())
            .field("after_change", &self.after_change.is_some())
            .finish()
    }
}

impl<'a, C: ?Sized> Command<'a, C> {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            arguments: Vec::new(),
            criteria: None,
            verify: None,
            after_change: None,
        }
    }

    pub fn arg(mut self, argument: impl ToString) -> Self {
        self.arguments.push(argument.to_string());
        self
    }

    /// Run the body only when `criteria` say a change is needed.
    pub fn change_if(mut self, criteria: Criteria<'a, C>) -> Self {
        self.criteria = Some(criteria);
        self
    }

    /// Reject a successful body result unless `verify` accepts it.
    pub fn succeeds_if(mut self, verify: impl FnOnce(&mut C, &CommandResult) -> bool + 'a) -> Self {
        self.verify = Some(Box::new(verify));
        self
    }

    /// Call `callback` after a successful, verified change.
    pub fn after_change(mut self, callback: impl FnOnce(&mut C, &CommandResult) + 'a) -> Self {
        self.after_change = Some(Box::new(callback));
        self
    }

    /// Decide, run, verify and report. Never panics on failure: everything
    /// is in the returned result.
    pub fn run(
        self,
        engine: &Engine,
        ctx: &mut C,
        body: impl FnOnce(&mut C) -> CommandResult,
    ) -> CommandResult {
        let Self {
            operation,
            arguments,
            criteria,
            verify,
            after_change,
        } = self;
        let policy = engine.policy();

        let mut result = match criteria.filter(|_| policy.idempotent) {
            Some(criteria) => match policy.change_if(ctx, criteria, body) {
                Change::Applied(result) => result,
                Change::Skipped => {
                    log::debug!("{operation} {}: no change needed", arguments.join(" "));
                    CommandResult::no_change()
                }
            },
            None => body(ctx),
        };

        let changed = !result.failed() && !result.is_no_change();
        if changed
            && let Some(verify) = verify
            && !verify(ctx, &result)
        {
            log::warn!("{operation} {} did not take effect", arguments.join(" "));
            result = result.into_failure(Error::VerificationFailed {
                operation: operation.clone(),
            });
        }

        if !result.failed()
            && !result.is_no_change()
            && let Some(after_change) = after_change
        {
            after_change(ctx, &result);
        }

        engine
            .bus()
            .publish_result(ResultRecord::new(operation, arguments, result.clone()));
        result
    }
}
