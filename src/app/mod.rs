// Application layer - Action registry and session dispatch

pub mod dispatcher;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use registry::{ActionFactory, ActionRegistry};
