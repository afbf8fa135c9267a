//! Agent definitions and conversational sessions.

pub mod context;
pub mod definition;
pub mod session;

pub use context::ContextState;
pub use definition::AgentDefinition;
pub use session::{build_toolset, AgentSession, SessionEnv, SessionHandle};
