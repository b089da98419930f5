// ABOUTME: Per-conversation invocation context shared by every tool instance in one call graph.
// ABOUTME: Holds the registry, origin counter, factories, chat context and teardown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use switchboard_core::{AgentSpec, ChatContext, Journal, Origin, OriginEntry, Origination};

use crate::client::LlmFactory;
use crate::coded_tool::CodedToolRegistry;
use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::session::SessionFactory;

/// Bounds on how deep one conversation's call graph may nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimits {
    /// Longest origin a new tool instance may have.
    pub max_depth: usize,
    /// How many times one tool may already appear in its caller's origin.
    pub max_repeats: usize,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            max_depth: 16,
            max_repeats: 2,
        }
    }
}

impl CallLimits {
    /// Why calling `tool` beneath `origin` would exceed these limits, if it would.
    pub fn check(&self, origin: &[OriginEntry], tool: &str) -> Option<String> {
        if origin.len() >= self.max_depth {
            return Some(format!("call depth limit of {} reached", self.max_depth));
        }
        let repeats = origin.iter().filter(|entry| entry.tool == tool).count();
        if repeats >= self.max_repeats {
            return Some(format!(
                "recursion limit reached, '{tool}' is already active {repeats} times"
            ));
        }
        None
    }
}

/// Everything a tool instance needs from the conversation it runs in.
pub struct InvocationContext {
    pub registry: Arc<ToolRegistry>,
    pub origination: Origination,
    pub llm_factory: Arc<dyn LlmFactory>,
    pub session_factory: Arc<dyn SessionFactory>,
    pub coded_tools: Arc<CodedToolRegistry>,
    pub retry_policy: RetryPolicy,
    pub call_limits: CallLimits,
    /// Conversation-wide sink; tools wrap it with their own origin.
    pub journal: Arc<dyn Journal>,
    /// Context the conversation was resumed from, if any.
    pub chat_context: Option<ChatContext>,
    torn_down: AtomicBool,
}

impl InvocationContext {
    pub fn new(
        registry: Arc<ToolRegistry>,
        llm_factory: Arc<dyn LlmFactory>,
        session_factory: Arc<dyn SessionFactory>,
        coded_tools: Arc<CodedToolRegistry>,
        journal: Arc<dyn Journal>,
        chat_context: Option<ChatContext>,
    ) -> Self {
        Self {
            registry,
            origination: Origination::new(),
            llm_factory,
            session_factory,
            coded_tools,
            retry_policy: RetryPolicy::default(),
            call_limits: CallLimits::default(),
            journal,
            chat_context,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_call_limits(mut self, call_limits: CallLimits) -> Self {
        self.call_limits = call_limits;
        self
    }

    /// Mark the conversation as being torn down. Running loops stop at
    /// their next check.
    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

/// The calling side of a tool invocation.
#[derive(Clone)]
pub struct ParentContext {
    pub invocation: Arc<InvocationContext>,
    /// Spec of the calling agent; `None` when called from outside a network.
    pub spec: Option<Arc<AgentSpec>>,
    pub origin: Origin,
}
