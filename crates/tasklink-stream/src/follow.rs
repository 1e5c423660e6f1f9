//! Follow a session until the task reaches a terminal status.
//!
//! Sessions never close themselves on a terminal event; this helper is the
//! opt-in policy for callers that only care about the outcome.

use std::time::Duration;

use tasklink_protocol::{TaskEvent, TaskResult, TaskStatus};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument};

use crate::session::StreamSession;

/// What to do with events that arrive after the terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Close as soon as the terminal event is seen.
    #[default]
    Immediate,
    /// Keep delivering trailing events (late logs, final artifacts) for up
    /// to this long, then close.
    Grace(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowOutcome {
    pub events_seen: usize,
    pub terminal_status: Option<TaskStatus>,
    /// The stream ended, or the session was closed, before any terminal
    /// status arrived.
    pub ended_before_terminal: bool,
    pub drained_after_terminal: usize,
}

impl FollowOutcome {
    pub fn reached_terminal(&self) -> bool {
        self.terminal_status.is_some()
    }

    /// True only when the task finished with `success`.
    pub fn succeeded(&self) -> bool {
        self.terminal_status == Some(TaskStatus::Success)
    }
}

/// Pass every event to `on_event` until a terminal status arrives or the
/// stream ends, apply `policy`, then close the session.
///
/// A transport failure closes the session and is returned as the error.
#[instrument(skip(session, on_event), fields(task_id = %session.task_id()))]
pub async fn follow_until_terminal<F>(
    session: &mut StreamSession,
    policy: DrainPolicy,
    mut on_event: F,
) -> TaskResult<FollowOutcome>
where
    F: FnMut(&TaskEvent),
{
    let mut outcome = FollowOutcome::default();
    loop {
        let event = match session.next().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                outcome.ended_before_terminal = true;
                break;
            }
            Err(error) => {
                session.close().await;
                return Err(error);
            }
        };
        outcome.events_seen += 1;
        on_event(&event);
        if let Some(status) = event.terminal_status() {
            outcome.terminal_status = Some(status);
            break;
        }
    }

    if let (Some(status), DrainPolicy::Grace(grace)) = (outcome.terminal_status, policy) {
        info!(%status, grace_ms = grace.as_millis() as u64, "terminal status, draining");
        drain(session, grace, &mut on_event, &mut outcome).await;
    }
    session.close().await;
    Ok(outcome)
}

async fn drain<F>(
    session: &mut StreamSession,
    grace: Duration,
    on_event: &mut F,
    outcome: &mut FollowOutcome,
) where
    F: FnMut(&TaskEvent),
{
    let deadline = Instant::now() + grace;
    loop {
        match timeout_at(deadline, session.next()).await {
            Ok(Ok(Some(event))) => {
                outcome.events_seen += 1;
                outcome.drained_after_terminal += 1;
                on_event(&event);
            }
            Ok(Ok(None)) | Err(_) => break,
            Ok(Err(error)) => {
                debug!(%error, "transport failed while draining");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tasklink_protocol::{TaskError, TaskId};
    use tokio::time::timeout;
    use url::Url;

    use super::*;
    use crate::memory::{MemoryConnector, MemoryPeer};
    use crate::session::SessionState;

    const WAIT: Duration = Duration::from_secs(2);

    async fn open() -> Result<(StreamSession, MemoryPeer)> {
        let connector = MemoryConnector::new();
        let peer = connector.route("/api/tasks/t-9/stream", 16);
        let url = Url::parse("ws://127.0.0.1:8801/api/tasks/t-9/stream")?;
        let session = StreamSession::connect(&connector, TaskId::from_string("t-9"), url, 8).await?;
        Ok((session, peer))
    }

    fn status(status: &str) -> String {
        format!(r#"{{"event":"status","status":{{"status":"{status}"}}}}"#)
    }

    const LATE_LOG: &str = r#"{"event":"log","log":{"message":"uploaded artifacts"}}"#;

    #[tokio::test]
    async fn immediate_policy_stops_at_terminal() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.send_text(status("running")).await?;
        peer.send_text(status("cancelled")).await?;
        peer.send_text(LATE_LOG).await?;

        let mut kinds = Vec::new();
        let outcome = timeout(
            WAIT,
            follow_until_terminal(&mut session, DrainPolicy::Immediate, |event| {
                kinds.push(event.kind().to_owned());
            }),
        )
        .await??;

        assert_eq!(kinds, vec!["status", "status"]);
        assert_eq!(outcome.terminal_status, Some(TaskStatus::Cancelled));
        assert!(!outcome.succeeded());
        assert!(!outcome.ended_before_terminal);
        assert_eq!(outcome.drained_after_terminal, 0);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(peer.is_released());
        Ok(())
    }

    #[tokio::test]
    async fn grace_policy_collects_trailing_events() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.send_text(status("success")).await?;
        peer.send_text(LATE_LOG).await?;
        peer.send_text(LATE_LOG).await?;

        let outcome = timeout(
            WAIT,
            follow_until_terminal(
                &mut session,
                DrainPolicy::Grace(Duration::from_millis(100)),
                |_| {},
            ),
        )
        .await??;

        assert!(outcome.succeeded());
        assert_eq!(outcome.events_seen, 3);
        assert_eq!(outcome.drained_after_terminal, 2);
        assert_eq!(session.state(), SessionState::Closed);
        drop(peer);
        Ok(())
    }

    #[tokio::test]
    async fn stream_ending_early_has_no_terminal_status() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.send_text(status("running")).await?;
        peer.hang_up();

        let outcome = timeout(
            WAIT,
            follow_until_terminal(&mut session, DrainPolicy::Immediate, |_| {}),
        )
        .await??;
        assert!(!outcome.reached_terminal());
        assert!(outcome.ended_before_terminal);
        assert_eq!(outcome.events_seen, 1);
        Ok(())
    }

    #[tokio::test]
    async fn hang_up_during_grace_is_not_an_early_end() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.send_text(status("failed")).await?;
        peer.send_text(LATE_LOG).await?;
        peer.hang_up();

        let outcome = timeout(
            WAIT,
            follow_until_terminal(&mut session, DrainPolicy::Grace(WAIT), |_| {}),
        )
        .await??;
        assert_eq!(outcome.terminal_status, Some(TaskStatus::Failed));
        assert!(!outcome.ended_before_terminal);
        assert_eq!(outcome.drained_after_terminal, 1);
        Ok(())
    }

    #[tokio::test]
    async fn closing_mid_follow_ends_before_terminal() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.send_text(status("running")).await?;
        let closer = session.closer();

        let outcome = timeout(
            WAIT,
            follow_until_terminal(&mut session, DrainPolicy::Immediate, |_| closer.close()),
        )
        .await??;
        assert!(outcome.ended_before_terminal);
        assert_eq!(outcome.terminal_status, None);
        assert_eq!(session.state(), SessionState::Closed);
        drop(peer);
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_is_returned() -> Result<()> {
        let (mut session, peer) = open().await?;
        peer.fail("socket reset").await?;

        let result = timeout(
            WAIT,
            follow_until_terminal(&mut session, DrainPolicy::Immediate, |_| {}),
        )
        .await?;
        assert_eq!(result, Err(TaskError::Connection("socket reset".to_owned())));
        assert_eq!(session.state(), SessionState::Closed);
        Ok(())
    }
}
