//! The agent loop: observe, plan, act.
//!
//! ```text
//! while !terminal && steps < max_steps:
//!     state  = snapshot.capture()
//!     action = planner.plan_action(goal, state, history)
//!     success | failure -> finish
//!     otherwise         -> execute(action); history.push(state, action)
//! ```

pub mod config;
pub mod controller;
pub mod executor;
pub mod snapshot;

pub use config::AgentConfig;
pub use controller::{AgentOutcome, BrowserAgent};
pub use executor::execute_action;
pub use snapshot::{SnapshotBuilder, TabRegistry};
