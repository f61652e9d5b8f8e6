//! Human-in-the-loop approval.
//!
//! The gate is a pure interface so interactive CLIs, messaging bots, and
//! batch front ends share one contract; the dispatcher invokes it once
//! per call that requires approval.

use async_trait::async_trait;

use crate::parser::ExecCall;

/// Pluggable approval callback. Implementations block (prompt-and-wait)
/// as long as they need; the dispatch loop waits with them.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, call: &ExecCall) -> bool;
}

/// Approves everything. Useful for trusted batch front ends; the
/// `auto_approve` config knob bypasses the gate entirely instead.
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn approve(&self, _call: &ExecCall) -> bool {
        true
    }
}

/// Denies everything.
pub struct DenyAll;

#[async_trait]
impl ApprovalGate for DenyAll {
    async fn approve(&self, _call: &ExecCall) -> bool {
        false
    }
}
