//! Deciding whether a mutation is needed.
//!
//! Criteria say "a change is needed". They are evaluated lazily, against a
//! caller-supplied context, and only when the policy asks for state checks.

use crate::policy::Policy;

/// A deferred yes/no question about the current state.
pub type Predicate<'a, C> = Box<dyn FnOnce(&mut C) -> bool + 'a>;

/// How a list of predicates is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Change when every predicate holds
    IfAll,
    /// Change when at least one predicate holds
    IfAny,
    /// Change unless every predicate holds
    UnlessAll,
    /// Change unless at least one predicate holds
    UnlessAny,
}

/// When a change is needed.
pub enum Criteria<'a, C: ?Sized> {
    /// Already decided
    Flag(bool),
    /// Decided by one predicate
    Check(Predicate<'a, C>),
    /// Decided by several predicates
    Combined(Combine, Vec<Predicate<'a, C>>),
}

impl<C: ?Sized> std::fmt::Debug for Criteria<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Self::Check(_) => f.write_str("Check(..)"),
            Self::Combined(mode, checks) => f
                .debug_tuple("Combined")
                .field(mode)
                .field(&checks.len())
                .finish(),
        }
    }
}

impl<'a, C: ?Sized> Criteria<'a, C> {
    pub fn flag(needed: bool) -> Self {
        Self::Flag(needed)
    }

    pub fn check(predicate: impl FnOnce(&mut C) -> bool + 'a) -> Self {
        Self::Check(Box::new(predicate))
    }

    pub fn if_all(predicates: Vec<Predicate<'a, C>>) -> Self {
        Self::Combined(Combine::IfAll, predicates)
    }

    pub fn if_any(predicates: Vec<Predicate<'a, C>>) -> Self {
        Self::Combined(Combine::IfAny, predicates)
    }

    pub fn unless_all(predicates: Vec<Predicate<'a, C>>) -> Self {
        Self::Combined(Combine::UnlessAll, predicates)
    }

    pub fn unless_any(predicates: Vec<Predicate<'a, C>>) -> Self {
        Self::Combined(Combine::UnlessAny, predicates)
    }

    /// Evaluate the criteria. Predicate lists short-circuit.
    pub fn evaluate(self, ctx: &mut C) -> bool {
        match self {
            Self::Flag(needed) => needed,
            Self::Check(predicate) => predicate(ctx),
            Self::Combined(mode, predicates) => {
                let mut predicates = predicates.into_iter();
                match mode {
                    Combine::IfAll => predicates.all(|p| p(ctx)),
                    Combine::IfAny => predicates.any(|p| p(ctx)),
                    Combine::UnlessAll => !predicates.all(|p| p(ctx)),
                    Combine::UnlessAny => !predicates.any(|p| p(ctx)),
                }
            }
        }
    }
}

/// Outcome of a guarded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    /// The body ran and returned this
    Applied(T),
    /// Nothing needed to change; the body did not run
    Skipped,
}

impl<T> Change<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Skipped => None,
        }
    }
}

/// Something that can guard a body with change criteria.
pub trait Changeable {
    /// Whether criteria are evaluated at all.
    fn check_state_first(&self) -> bool;

    /// Run `body` unless `criteria` say nothing needs to change.
    fn change_if<C: ?Sized, T>(
        &self,
        ctx: &mut C,
        criteria: Criteria<'_, C>,
        body: impl FnOnce(&mut C) -> T,
    ) -> Change<T> {
        if !self.check_state_first() || criteria.evaluate(ctx) {
            Change::Applied(body(ctx))
        } else {
            Change::Skipped
        }
    }
}

impl Changeable for Policy {
    fn check_state_first(&self) -> bool {
        self.check_state_first
    }
}
