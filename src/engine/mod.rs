pub mod dispatcher;
pub mod queue;
pub mod sweeper;
