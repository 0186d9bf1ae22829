//! Tool-augmented reasoning for a single participant turn.
//!
//! [`ReasoningLoop::run_turn`] drives the model through decide / invoke
//! cycles until it answers or hands off, honoring per-turn bounds and the
//! tool error policy.

mod caller_loop;
mod decision;

pub use caller_loop::{HandoffTarget, LoopConfig, LoopContext, ReasoningLoop, TurnOutcome, TurnRequest};
pub use decision::{interpret, ModelDecision, ParsedResponse, ToolProposal, HANDOFF_PREFIX};
