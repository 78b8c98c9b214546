pub mod agent;
mod agent_loop;
pub mod catalog;
pub mod error;
pub mod llm;
pub mod memory;
pub mod scripted;
pub mod sink;
pub mod suspend;
pub mod tools;

pub use agent::{Agent, AgentBuilder};
pub use agent_loop::SegmentEnd;
pub use error::AgentError;
pub use llm::{AnthropicClient, LanguageModel};
pub use memory::ThreadMemory;
pub use scripted::{ScriptedModel, ScriptedTurn};
pub use sink::{EventSink, RawEventStream};
