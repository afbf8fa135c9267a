//! Swarmflow: multi-agent orchestration.
//!
//! Three pieces share one set of sessions and bookkeeping:
//!
//! - [`Swarm`]: a delegation graph. Agents call each other through
//!   `delegate_to_<name>` tools; circular delegation is detected per run.
//! - [`Workflow`]: a DAG of nodes, each backed by a small swarm or a pure
//!   transform, with skip / halt / goto control flow.
//! - [`snapshot`]: versioned capture and validated restore of either.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarmflow::prelude::*;
//!
//! # async fn example(provider: Arc<dyn ModelProvider>) -> swarmflow::error::Result<()> {
//! let registry = Registry::new();
//! registry.register_provider(provider);
//!
//! let lead = AgentDefinition::builder()
//!     .name("lead")
//!     .model(ModelConfig::new("openai", "gpt-4o"))
//!     .delegates_to(vec!["backend".to_string()])
//!     .build();
//! let backend = AgentDefinition::builder()
//!     .name("backend")
//!     .model(ModelConfig::new("openai", "gpt-4o"))
//!     .build();
//!
//! let swarm = Swarm::new(SwarmDefinition::new("lead", vec![lead, backend]), registry)?;
//! let result = swarm.execute("Build the login endpoint").await;
//! println!("{}", result.content);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod prelude;
pub mod provider;
pub mod read_tracking;
pub mod registry;
pub mod result;
pub mod scratchpad;
pub mod snapshot;
pub mod swarm;
pub mod tools;
pub mod types;
pub mod util;
pub mod workflow;

pub use agent::AgentDefinition;
pub use error::SwarmError;
pub use registry::Registry;
pub use result::ExecutionResult;
pub use swarm::{Swarm, SwarmDefinition};
pub use workflow::{Workflow, WorkflowNode, WorkflowRun};
