// ABOUTME: Agent call-graph runtime: registries, callable tools, run contexts and chat sessions.
// ABOUTME: Also hosts the LLM adapters, retry policy, coded-tool registry and session interface.

pub mod chat_session;
pub mod client;
pub mod coded_tool;
pub mod connectivity;
pub mod error;
pub mod invocation;
pub mod llm;
pub mod registry;
pub mod retry;
pub mod run_context;
pub mod services;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tools;

pub use chat_session::{ChatSession, final_answer};
pub use client::{DefaultLlmFactory, LlmFactory, create_llm_client};
pub use coded_tool::{BranchContext, CodedTool, CodedToolCtor, CodedToolRegistry, MethodFn};
pub use connectivity::report_network_connectivity;
pub use error::AgentError;
pub use invocation::{CallLimits, InvocationContext, ParentContext};
pub use llm::{LlmClient, LlmError};
pub use registry::ToolRegistry;
pub use retry::{RetryDecision, RetryPolicy};
pub use run_context::{Run, RunContext, RunState, RunStatus, ToolOutput};
pub use services::{AgentServices, DefaultSessionFactory};
pub use session::{
    AgentSession, ChatRequest, ChatResponse, ChatStarted, ConnectivityInfo, ConnectivityResponse,
    DirectAgentSession, HttpAgentSession,
    ExternalAgentRef, FunctionResponse, LogsResponse, SessionError, SessionFactory,
    SessionManager, SessionRequest, TurnStatus,
};
pub use tools::AgentTool;
