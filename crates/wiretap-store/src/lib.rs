pub mod credentials;
pub mod error;
pub mod examples;
mod fs;
pub mod paths;
pub mod provenance;
pub mod session;
pub mod spec_log;
pub mod vcs;

pub use credentials::*;
pub use error::*;
pub use examples::*;
pub use paths::*;
pub use provenance::*;
pub use session::*;
pub use spec_log::*;
pub use vcs::*;
