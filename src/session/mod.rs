pub mod commands;
pub mod controller;
pub mod sampler;
pub mod sleep;
pub mod state;

pub use commands::{dispatch, PlayerCommand};
pub use controller::SessionController;
pub use state::{PlaybackSession, PlaybackSnapshot, SessionPhase};
