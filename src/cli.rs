// ABOUTME: Interactive chat loop against one agent network, in-process or over HTTP.
// ABOUTME: Streams each turn by default and carries the returned chat context into the next.

use std::io::Write;
use std::time::Duration;

use futures::StreamExt;
use switchboard_agent::{AgentSession, ChatRequest, SessionRequest, TurnStatus};
use switchboard_core::{ChatContext, ChatMessageType, DisplayOrigin, SlyMap};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Input that ends the conversation.
pub const QUIT: &str = "quit";

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Use the polling chat/logs operations instead of streaming.
    pub poll: bool,
    pub poll_interval: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Read user lines from `input` until `quit` or end of input, running one
/// turn per line and writing answers to `out`.
pub async fn run_chat_loop<R, W>(
    session: &dyn AgentSession,
    input: R,
    out: &mut W,
    options: &ChatOptions,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut chat_context: Option<ChatContext> = None;
    let mut sly_data: Option<SlyMap> = None;
    let mut session_id: Option<String> = None;

    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let user_input = line.trim();
        if user_input.is_empty() {
            continue;
        }
        if user_input == QUIT {
            break;
        }

        let request = ChatRequest::new(user_input)
            .with_chat_context(chat_context.take())
            .with_sly_data(sly_data.take());

        if options.poll {
            let mut request = request;
            request.session_id = session_id.clone();
            session_id = Some(polling_turn(session, request, out, options.poll_interval).await?);
        } else {
            let returned = streaming_turn(session, request, out).await?;
            chat_context = returned.chat_context;
            sly_data = returned.sly_data;
        }
    }

    if let Some(session_id) = session_id {
        session.reset(SessionRequest { session_id }).await?;
    }
    Ok(())
}

#[derive(Default)]
struct TurnReturn {
    chat_context: Option<ChatContext>,
    sly_data: Option<SlyMap>,
}

async fn streaming_turn<W: Write>(
    session: &dyn AgentSession,
    request: ChatRequest,
    out: &mut W,
) -> anyhow::Result<TurnReturn> {
    let mut responses = session.streaming_chat(request).await?;
    let mut returned = TurnReturn::default();

    while let Some(item) = responses.next().await {
        let mut message = item?.response;
        if let Some(chat_context) = message.chat_context.take() {
            returned.chat_context = Some(chat_context);
            returned.sly_data = message.sly_data.take();
            continue;
        }
        match message.message_type {
            ChatMessageType::Ai if message.origin.len() <= 1 => writeln!(out, "{}", message.text)?,
            ChatMessageType::AgentFramework if message.text.starts_with("Error:") => {
                writeln!(out, "{}", message.text)?
            }
            _ => tracing::debug!(origin = %DisplayOrigin(&message.origin), "{}", message.text),
        }
    }
    Ok(returned)
}

/// Start a turn and poll its logs until it settles. Returns the session id
/// so later turns continue the same conversation.
async fn polling_turn<W: Write>(
    session: &dyn AgentSession,
    request: ChatRequest,
    out: &mut W,
    interval: Duration,
) -> anyhow::Result<String> {
    let started = session.chat(request).await?;
    loop {
        let logs = session
            .logs(SessionRequest {
                session_id: started.session_id.clone(),
            })
            .await?;
        match logs.status {
            TurnStatus::Completed => {
                writeln!(out, "{}", logs.chat_response.unwrap_or_default())?;
                break;
            }
            TurnStatus::Failed => {
                writeln!(out, "Error: {}", logs.error.unwrap_or_default())?;
                break;
            }
            TurnStatus::Idle | TurnStatus::InProgress => tokio::time::sleep(interval).await,
        }
    }
    Ok(started.session_id)
}
