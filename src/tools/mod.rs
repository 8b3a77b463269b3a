//! Tool naming, local providers, and call routing.
//!
//! Tool names upstream are `<namespace>__<scope>__<tool>`:
//!
//! - `local__<scope>__<tool>` runs through a [`LocalCapabilityProvider`]
//! - `remote__<slug>__<tool>` runs on the live remote integration `<slug>`

pub mod error;
pub mod local;
pub mod name;
pub mod router;
pub mod types;

pub use error::{RoutingError, ToolExecutionError};
pub use local::{LocalCapabilityProvider, LocalTool, LocalToolRegistry};
pub use name::{Namespace, ToolName};
pub use router::ToolRouter;
pub use types::ToolDescriptor;
