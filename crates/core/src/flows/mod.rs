pub mod engine;
pub mod states;

pub use engine::{transition, IntakeSessions, IntakeTransitionError, DEFAULT_INTAKE_TIMEOUT};
pub use states::{
    IntakeAction, IntakeEvent, IntakeKind, IntakeResult, IntakeState, TransitionOutcome,
};
