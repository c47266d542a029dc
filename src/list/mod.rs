pub mod cancel;
pub mod engine;
pub mod events;
pub mod lock;
pub mod mover;
mod parser;

pub use cancel::CancelToken;
pub use engine::{ListConfig, ListState};
pub use events::{ListEvents, NullEvents};
pub use lock::AdvisoryLock;
pub use mover::Direction;
