pub mod common;
pub mod drain;
pub mod health;
pub mod queue;
pub mod rebuild;
pub mod status;
pub mod sync;
pub mod watch;
