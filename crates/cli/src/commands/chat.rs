//! `toolrelay chat`: run a single turn and print SSE frames to stdout.

use std::io::Write;

use async_trait::async_trait;
use toolrelay_agent::{EventSink, PromptContext, SinkClosed, StreamEvent, TurnRequest};
use toolrelay_config::AppConfig;
use toolrelay_core::message::Message;

pub async fn run(
    config: AppConfig,
    message: String,
    agent_id: Option<String>,
    session_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = toolrelay_gateway::build_state(&config)?;
    let agent = state.resolver.resolve_or_default(agent_id.as_deref()).await?;
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let turn = TurnRequest {
        prompt: PromptContext {
            session_id: Some(session_id.clone()),
            ..PromptContext::default()
        },
        session_id,
        agent,
        messages: vec![Message::user(message)],
    };

    let mut sink = FrameWriter::new(std::io::stdout());
    let result =
        tokio::time::timeout(state.request_timeout, state.orchestrator.run(turn, &mut sink)).await;
    let error = match result {
        Ok(Ok(_)) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("Request timed out after {}s", state.request_timeout.as_secs()),
    };
    let _ = sink.send(StreamEvent::error(error.clone())).await;
    Err(error.into())
}

/// Writes each event as an SSE frame and flushes after every frame.
pub struct FrameWriter<W> {
    out: W,
}

impl<W: Write + Send> FrameWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for FrameWriter<W> {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.out
            .write_all(event.to_sse_frame().as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|_| SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_written_in_order() {
        let mut sink = FrameWriter::new(Vec::new());
        sink.send(StreamEvent::progress("thinking")).await.unwrap();
        sink.send(StreamEvent::error("boom")).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let frames: Vec<&str> = out.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with(r#"data: {"type":"progress""#));
        assert_eq!(frames[1], r#"data: {"type":"error","error":"boom"}"#);
    }

    #[tokio::test]
    async fn broken_pipe_closes_the_sink() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = FrameWriter::new(Broken);
        assert_eq!(sink.send(StreamEvent::progress("x")).await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn chat_without_credentials_fails() {
        let err = run(AppConfig::default(), "hi".into(), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("provider"));
    }
}
