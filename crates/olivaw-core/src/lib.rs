pub mod error;
pub mod event;
pub mod merge;
pub mod resolve;
pub mod settings;
pub mod status;

pub use error::{Error, Result};
pub use event::{DependencyRef, Event, Metadata, Production, DEFAULT_CATEGORY};
pub use merge::ConfigMerger;
pub use resolve::{get_all_latest, waiting_on_dependencies};
pub use settings::Settings;
pub use status::{Actor, Status};
