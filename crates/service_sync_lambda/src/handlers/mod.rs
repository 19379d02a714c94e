pub mod parameters;
pub mod response;
pub mod state_events;
