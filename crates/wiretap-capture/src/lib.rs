pub mod capturer;
pub mod error;
pub mod ignore;
pub mod orchestrator;
pub mod proxy;
pub mod sink;
pub mod supervisor;

pub use capturer::*;
pub use error::*;
pub use ignore::*;
pub use orchestrator::*;
pub use proxy::*;
pub use sink::*;
pub use supervisor::*;
