//! Child-side agent embedded in every micro-app.

mod agent;


pub use agent::{AgentOptions, AgentPhase, ChildAgent, DEFAULT_INIT_TIMEOUT};
