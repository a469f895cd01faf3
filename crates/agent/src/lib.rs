//! Agent runtime: the model client, the catalog tools the model may call,
//! per-sender chat sessions and the bounded tool-calling loop.
//!
//! The model never decides prices, stock or order outcomes. It picks tools
//! and phrases their results; `threadline-core` pricing and the catalog
//! repository decide everything else.

pub mod embedding;
pub mod llm;
pub mod runtime;
pub mod session;
pub mod tools;

pub use embedding::{Embedder, EmbeddingTask, GeminiEmbedder};
pub use llm::{ChatModel, FunctionDeclaration, GeminiChatModel, LlmError, ModelReply, RetryPolicy};
pub use runtime::{AgentError, AgentRuntime, TurnOutcome, DEFAULT_SYSTEM_INSTRUCTION};
pub use session::{ChatSession, SessionGuard, SessionStore};
pub use tools::{OrderOutcome, OrderStatus, ToolContext, ToolKind, ToolSettings, Toolbox};
