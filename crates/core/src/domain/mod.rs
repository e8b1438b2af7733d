pub mod busy;
pub mod provider;
pub mod queue;
pub mod slot;
