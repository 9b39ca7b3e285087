//! Model invocation for simplea2a.
//!
//! All backends implement `simplea2a_core::Provider`. The router picks a
//! backend from the agent's connection profile, and the invoker puts every
//! call behind one shared rate gate.

mod http;
pub mod invoker;
pub mod openai_compat;
pub mod platform;
pub mod rate_limit;
pub mod router;

pub use invoker::RateLimitedInvoker;
pub use openai_compat::OpenAiCompatProvider;
pub use platform::PlatformProvider;
pub use rate_limit::RateGate;
pub use router::{ProviderResolver, ProviderRouter, SingleProvider};
