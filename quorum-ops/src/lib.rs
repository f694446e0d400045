pub mod aws;
pub mod bootstrap;
pub mod errors;
pub mod fleet;
pub mod geth;
pub mod istanbul;
pub mod node;
pub mod orchestrator;
pub mod pool;
pub mod region;
pub mod remote;
pub mod spec;
pub mod wait;
pub mod workdir;

pub use spec::Spec;
