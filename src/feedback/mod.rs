//! Human-in-the-loop feedback windows.
//!
//! After a phase's artifact passes the quality gate, the executor may open
//! a time-boxed window during which a human can submit feedback, skip, or
//! cancel. The window is a single `select!` over the cancellation token, an
//! incoming signal, and the timeout; cancellation is checked first so a
//! cancel racing a submission always wins.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::FeedbackKind;

/// A control-surface submission routed into an open window.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSignal {
    pub kind: FeedbackKind,
    pub content: String,
}

impl FeedbackSignal {
    pub fn skip(reason: Option<String>) -> Self {
        Self {
            kind: FeedbackKind::Skip,
            content: reason.unwrap_or_default(),
        }
    }
}

/// How a feedback window was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    /// A signal arrived before the deadline.
    Received(FeedbackSignal),
    /// The deadline passed with no signal.
    TimedOut,
    /// The session was cancelled while the window was open.
    Cancelled,
}

/// Wait for at most `timeout` for a signal on `rx`.
///
/// Exactly one outcome is produced per window. The caller installs the
/// sending half where the control surface can reach it before calling this,
/// and tears it down afterwards.
pub async fn open_window(
    rx: &mut mpsc::Receiver<FeedbackSignal>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WindowOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => WindowOutcome::Cancelled,
        signal = rx.recv() => match signal {
            Some(signal) => WindowOutcome::Received(signal),
            // Sender dropped without a submission; treat as the deadline
            // outcome rather than hanging until the timer fires.
            None => WindowOutcome::TimedOut,
        },
        _ = tokio::time::sleep(timeout) => WindowOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn signal_resolves_window() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        tx.send(FeedbackSignal {
            kind: FeedbackKind::NaturalLanguage,
            content: "warmer palette".into(),
        })
        .await
        .unwrap();

        let outcome = open_window(&mut rx, Duration::from_secs(1800), &cancel).await;
        match outcome {
            WindowOutcome::Received(signal) => {
                assert_eq!(signal.kind, FeedbackKind::NaturalLanguage);
                assert_eq!(signal.content, "warmer palette");
            }
            other => panic!("expected received, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn window_times_out_at_deadline() {
        let (_tx, mut rx) = mpsc::channel::<FeedbackSignal>(1);
        let cancel = CancellationToken::new();
        let outcome = open_window(&mut rx, Duration::from_secs(30), &cancel).await;
        assert_eq!(outcome, WindowOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn long_window_times_out_too() {
        let (_tx, mut rx) = mpsc::channel::<FeedbackSignal>(1);
        let cancel = CancellationToken::new();
        let outcome = open_window(&mut rx, Duration::from_secs(1800), &cancel).await;
        assert_eq!(outcome, WindowOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_pending_signal() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tx.send(FeedbackSignal::skip(None)).await.unwrap();

        let outcome = open_window(&mut rx, Duration::from_secs(1800), &cancel).await;
        assert_eq!(outcome, WindowOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_does_not_hang_the_window() {
        let (tx, mut rx) = mpsc::channel::<FeedbackSignal>(1);
        let cancel = CancellationToken::new();
        drop(tx);
        let outcome = open_window(&mut rx, Duration::from_secs(1800), &cancel).await;
        assert_eq!(outcome, WindowOutcome::TimedOut);
    }
}
