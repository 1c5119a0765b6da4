//! Converge - idempotent mutations with change tracking
//!
//! Building blocks for resources that only touch a host when its state
//! differs from the desired one:
//!
//! - [`Policy`] decides whether change criteria are consulted at all
//! - [`Criteria`] describe when a change is needed
//! - [`Command`] runs one mutation: decide, run, verify, report
//! - [`StateMachine`] batches per-resource change events until commit
//! - [`Bus`] delivers events to observers and results to audit channels
//!
//! # Example
//!
//! ```
//! use converge::{Command, Criteria, Engine};
//! use shellkit::{CommandResult, Value};
//!
//! let engine = Engine::default();
//! let mut mode = 0o644;
//!
//! for _ in 0..2 {
//!     Command::new("chmod")
//!         .change_if(Criteria::check(|mode: &mut u32| *mode != 0o755))
//!         .run(&engine, &mut mode, |mode| {
//!             *mode = 0o755;
//!             CommandResult::applied(Value::Unit)
//!         });
//! }
//! assert_eq!(mode, 0o755);
//! ```

pub mod bus;
pub mod changeable;
pub mod command;
pub mod engine;
pub mod event;
pub mod policy;
pub mod state;

pub use bus::{ALL, Bus, Notice, Observer};
pub use changeable::{Change, Changeable, Combine, Criteria, Predicate};
pub use command::Command;
pub use engine::Engine;
pub use event::{Event, ResourceRef, ResultRecord, pluralize};
pub use policy::Policy;
pub use state::{State, StateMachine, Transition};
