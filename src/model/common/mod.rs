mod election;

pub use election::{is_open, ElectionState};
