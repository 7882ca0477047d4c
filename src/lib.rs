//! QuantaLista: dependency-aware task scheduling for simulated agents.
//!
//! Tasks flow from a file queue into a [`Scheduler`], a [`Coordinator`]
//! pairs ready tasks with idle agents from the [`AgentRegistry`], and every
//! state change is published on a synchronous [`EventBus`].

pub mod agent;
pub mod config;
pub mod coordination;
pub mod daemon;
pub mod error;
pub mod queue;
pub mod task;

pub use agent::{Agent, AgentId, AgentState};
pub use config::Config;
pub use coordination::{AgentRegistry, Coordinator, CoordinatorConfig, Event, EventBus, EventKind, Scheduler};
pub use daemon::{Daemon, DaemonConfig};
pub use error::{Error, Result};
pub use queue::FileQueue;
pub use task::{Priority, Task, TaskId, TaskRecord, TaskStatus};
