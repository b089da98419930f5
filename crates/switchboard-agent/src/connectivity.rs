// ABOUTME: Reports which tools each agent of a network can call, walking breadth-first.
// ABOUTME: Cycle-safe via a visited set; external agents are listed but never followed.

use std::collections::{HashSet, VecDeque};

use serde_json::json;
use switchboard_core::{AgentMessage, Journal, OriginEntry};

use crate::error::AgentError;
use crate::registry::ToolRegistry;
use crate::session::ConnectivityInfo;

/// Walk the network from its front man, writing one framework message per
/// agent to `journal`, and return the same information.
pub async fn report_network_connectivity(
    registry: &ToolRegistry,
    journal: &dyn Journal,
) -> Result<Vec<ConnectivityInfo>, AgentError> {
    let front_man = registry.find_front_man()?;

    let mut report = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    visited.insert(front_man.name.clone());
    queue.push_back(front_man.name.clone());

    while let Some(name) = queue.pop_front() {
        let Some(spec) = registry.get(&name) else {
            continue;
        };

        let tools = if spec.allows_connectivity() {
            spec.tools.clone()
        } else {
            Vec::new()
        };
        for tool in &tools {
            if registry.get(tool).is_some() && visited.insert(tool.clone()) {
                queue.push_back(tool.clone());
            }
        }

        let message = AgentMessage::AgentFramework {
            content: String::new(),
            structure: Some(json!({ "tools": tools })),
        };
        journal
            .write_message(&message, Some(&[OriginEntry::new(name.clone(), 0)]))
            .await;
        report.push(ConnectivityInfo { origin: name, tools });
    }

    tracing::debug!(network = %registry.network_name(), agents = report.len(), "connectivity reported");
    Ok(report)
}
