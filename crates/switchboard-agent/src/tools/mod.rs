// ABOUTME: The closed set of callable tool variants an agent network is built from.
// ABOUTME: Dispatches build and teardown by variant; recursion goes through a boxed future.

pub mod branch;
pub mod calling;
pub mod coded;
pub mod external;
pub mod front_man;

use futures::future::BoxFuture;
use switchboard_core::{AgentMessage, OriginEntry};

use crate::error::AgentError;

pub use branch::{BranchTool, build_instructions};
pub use calling::{drive_run, make_tool_function_calls};
pub use coded::{ClassTool, MethodTool};
pub use external::ExternalTool;
pub use front_man::FrontMan;

/// A live tool instance created for one call.
pub enum AgentTool {
    Class(ClassTool),
    Method(MethodTool),
    Branch(BranchTool),
    FrontMan(FrontMan),
    External(ExternalTool),
}

impl AgentTool {
    pub fn origin(&self) -> &[OriginEntry] {
        match self {
            AgentTool::Class(t) => t.origin(),
            AgentTool::Method(t) => t.origin(),
            AgentTool::Branch(t) => t.origin(),
            AgentTool::FrontMan(t) => t.origin(),
            AgentTool::External(t) => t.origin(),
        }
    }

    /// Run the tool and return the messages it produced. The last message
    /// is the tool's answer.
    pub fn build(&mut self) -> BoxFuture<'_, Result<Vec<AgentMessage>, AgentError>> {
        match self {
            AgentTool::Class(t) => Box::pin(t.build()),
            AgentTool::Method(t) => Box::pin(t.build()),
            AgentTool::Branch(t) => Box::pin(t.build()),
            AgentTool::FrontMan(t) => Box::pin(t.build()),
            AgentTool::External(t) => Box::pin(t.build()),
        }
    }

    pub async fn delete_resources(&mut self) {
        match self {
            AgentTool::Class(_) | AgentTool::Method(_) => {}
            AgentTool::Branch(t) => t.delete_resources().await,
            AgentTool::FrontMan(t) => t.delete_resources().await,
            AgentTool::External(t) => t.delete_resources().await,
        }
    }
}
