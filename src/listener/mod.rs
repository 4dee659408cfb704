//! Voice activation: state machine core and session driver

mod driver;
mod machine;

pub use driver::{EventObserver, VoicePipeline};
pub use machine::{
    Category, DispatchRequest, Mode, TickOutput, VoiceActivationStateMachine, VoiceEvent,
    command_from_utterance,
};
