//! # rlm agent
//!
//! The recursive language model loop:
//! 1. The task text is bound as `context` in a fresh Python kernel
//! 2. The model sees only a metadata snapshot and asks for code to run
//! 3. Code runs in the persistent namespace; a new snapshot goes back
//! 4. `sub_rlm(prompt)` inside that code starts a nested loop on `prompt`
//! 5. The loop ends once `FINAL` is set, or at the iteration ceiling

pub mod config;
mod hook;
mod orchestrator;
pub mod prompt;
mod trace;

pub use config::{load_config, RlmConfig, TerminationMode};
pub use hook::RecursionHook;
pub use orchestrator::{Orchestrator, OrchestratorState, RunOutcome};
pub use trace::IterationTrace;
