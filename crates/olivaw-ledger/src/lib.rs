pub mod apply;
pub mod backend;
pub mod file;
pub mod git;
pub mod ledger;
pub mod paths;

pub use apply::{apply_documents, parse_documents, read_source, ApplyDocument, ApplyReport};
pub use backend::{LedgerBackend, LedgerDocument, ProjectInfo};
pub use file::FileBackend;
pub use git::GitBackend;
pub use ledger::Ledger;
pub use paths::OlivawPaths;
