pub mod environment;
pub mod pipeline;
pub mod process;
pub mod registry;
pub mod repo;
pub mod rift;
pub mod supervisor;

pub use pipeline::{BuildContext, Pipeline, PipelineLog};
pub use registry::Registry;
pub use rift::Rift;
pub use supervisor::{Advance, BuildOptions, Outcome, Supervisor};
