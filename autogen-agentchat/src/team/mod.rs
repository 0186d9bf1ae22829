//! Teams: participants, termination conditions, declarative team
//! definitions and the coordinator that runs sessions.

mod coordinator;
mod definition;
mod participant;
mod termination;

pub use coordinator::{Advance, CoordinatorConfig, SessionSpec, TeamCoordinator, USER_SOURCE};
pub use definition::{ModelClientProvider, TeamDefinition};
pub use participant::{Participant, ParticipantDefinition};
pub use termination::{MentionScope, TerminationCondition};
