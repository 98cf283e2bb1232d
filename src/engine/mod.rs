//! Stateless pipeline stages.
//!
//! Schema validation, context firewall scanning and policy evaluation. None
//! of these touch the ledger; they run outside the gate's serialization point.

pub mod evaluator;
pub mod firewall;
pub mod pattern_matcher;
pub mod schema;
