//! Scheduling and coordination core.
//!
//! - Event bus: synchronous publish-subscribe for state changes
//! - Agent registry: agent availability
//! - Scheduler: dependency gating and priority ordering
//! - Coordinator: pairs ready tasks with idle agents and simulates execution
//! - Clock: real and virtual time sources for the coordinator loop

pub mod clock;
pub mod coordinator;
pub mod events;
pub mod registry;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, CoordinatorConfig, RunOutcome, RunReport, TickReport};
pub use events::{Event, EventBus, EventKind, EventRecorder, LoggingSubscriber, RecordedEvent, Subscriber};
pub use registry::AgentRegistry;
pub use scheduler::{Scheduler, SchedulerConfig, StuckTask};
