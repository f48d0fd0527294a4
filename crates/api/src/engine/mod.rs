//! Job execution engine.

pub mod dispatcher;

pub use dispatcher::Dispatcher;
