//! The task orchestration core of simplea2a.
//!
//! An agent works through a **Thought → Action → Observation** loop:
//!
//! 1. **Prompt**: synthesize the system prompt from the agent directory
//! 2. **Invoke**: send the history through the shared rate-limited invoker
//! 3. **Parse**: extract at most one directive from the free-form reply
//! 4. **Dispatch**: call a tool, run another agent inline, hand the task off,
//!    or finish
//! 5. **Observe**: append the outcome to the history and loop
//!
//! Every step is persisted before the model is called. Tasks are queued on a
//! [`Scheduler`] and run independently; no two steps of one task overlap.

pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod scheduler;

#[cfg(test)]
mod test_helpers;

pub use orchestrator::Orchestrator;
pub use parser::{ParseMode, find_task_transfer, parse};
pub use prompt::{PROMPT_FORMAT_VERSION, build_system_prompt};
pub use scheduler::{Scheduler, TaskSubmitter};
