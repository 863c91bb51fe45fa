//! Provider-side plumbing for AgentGate.
//!
//! Completion providers implement `agentgate_core::Provider`; this crate
//! holds what sits in front of them. Every outbound call is gated by the
//! shared [`AdmissionController`].

pub mod admission;

pub use admission::{AdmissionController, AdmissionDecision};
