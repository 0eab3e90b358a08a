//! Agent Core — the design-to-theme workflow.
//!
//! Submodules:
//! - `conversation`: ConversationState, the append-only history of one run
//! - `gateway`: ModelGateway trait (tool-aware and tool-blind model calls)
//! - `executor`: ToolExecutor trait, implemented by the MCP tool catalog
//! - `routing`: where to go after a model turn
//! - `orchestrator`: the state machine driving one run to `Done`
//! - `synthesizer`: model text → ArtifactBundle
//! - `publisher`: ArtifactBundle → files on disk → external publish command
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod orchestrator;
pub mod publisher;
pub mod routing;
pub mod synthesizer;
pub mod types;

// Re-exports for convenience
pub use conversation::ConversationState;
pub use errors::{AgentError, PublishError, SynthesisError};
pub use executor::ToolExecutor;
pub use gateway::ModelGateway;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use publisher::{CommandPublisher, Publisher};
pub use synthesizer::ArtifactSynthesizer;
pub use types::{ArtifactBundle, Message, PublishOutcome, RunOutcome, RunState};
