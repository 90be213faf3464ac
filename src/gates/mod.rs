//! Quality gating and retry coordination.
//!
//! The quality gate is a pure function of score, threshold, and remaining
//! budget so it can be tested in isolation. The retry coordinator owns the
//! budget bookkeeping and the pluggable parameter-adjustment strategy.

use crate::gateway::GenerationParams;

/// Outcome of evaluating one generation attempt against the quality bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Score meets the threshold; the phase may proceed.
    Accept,
    /// Score is below the threshold and retry budget remains.
    Retry,
    /// Score is below the threshold and the budget is exhausted; the phase
    /// errors immediately without further attempts.
    Escalate,
}

/// Evaluate a quality score. Pure: no side effects, fully determined by the
/// three inputs.
pub fn evaluate(score: f64, threshold: f64, retries_remaining: u32) -> GateDecision {
    if score >= threshold {
        GateDecision::Accept
    } else if retries_remaining > 0 {
        GateDecision::Retry
    } else {
        GateDecision::Escalate
    }
}

/// Retry decision for a failed or low-quality attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Run another attempt with these parameters.
    Retry(GenerationParams),
    /// Budget exhausted; the phase is terminal.
    GiveUp,
}

/// Pluggable policy for adjusting generation parameters between attempts.
///
/// The adjustment algorithm is deployment-specific; the default strategy
/// passes parameters through unchanged.
pub trait RetryStrategy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt about to run.
    fn adjust(&self, params: &GenerationParams, attempt: u32) -> GenerationParams;
}

/// Default strategy: no adjustment.
#[derive(Debug, Default)]
pub struct NoAdjustment;

impl RetryStrategy for NoAdjustment {
    fn adjust(&self, params: &GenerationParams, _attempt: u32) -> GenerationParams {
        params.clone()
    }
}

/// Tracks one phase's retry budget.
///
/// A phase makes at most `max_retries + 1` attempts: the initial attempt
/// plus `max_retries` retries. `decide` increments the count only when a
/// retry is actually granted, so `retry_count` never exceeds `max_retries`.
pub struct RetryCoordinator<'a> {
    max_retries: u32,
    strategy: &'a dyn RetryStrategy,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(max_retries: u32, strategy: &'a dyn RetryStrategy) -> Self {
        Self {
            max_retries,
            strategy,
        }
    }

    /// Decide whether the phase gets another attempt. On `Retry`, the
    /// caller's `retry_count` has been advanced and the returned parameters
    /// feed the next gateway call.
    pub fn decide(&self, retry_count: &mut u32, params: &GenerationParams) -> RetryDecision {
        if *retry_count < self.max_retries {
            *retry_count += 1;
            // retry_count now names the retry being granted; the attempt
            // about to run is retry_count + 1 overall.
            RetryDecision::Retry(self.strategy.adjust(params, *retry_count + 1))
        } else {
            RetryDecision::GiveUp
        }
    }
}
