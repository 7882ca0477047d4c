//! QuantaLista daemon: runs the queued tasks through the coordinator.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;
use crate::config::Config;
use crate::coordination::{
    AgentRegistry, Coordinator, CoordinatorConfig, EventBus, EventKind, LoggingSubscriber, RunReport, Scheduler,
    SchedulerConfig,
};
use crate::error::Result;
use crate::queue::{FileQueue, QueueSync};
use crate::task::{Priority, Task, TaskRecord};

/// Everything one daemon run needs.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub coordinator: CoordinatorConfig,
    pub scheduler: SchedulerConfig,
    pub agents: Vec<Agent>,
}

impl From<&Config> for DaemonConfig {
    fn from(config: &Config) -> Self {
        Self {
            coordinator: config.to_coordinator_config(),
            scheduler: config.to_scheduler_config(),
            agents: config.to_agents(),
        }
    }
}

/// The daemon.
pub struct Daemon {
    config: DaemonConfig,
    queue: FileQueue,
    bus: Arc<EventBus>,
}

impl Daemon {
    /// Create a daemon over `queue`, creating its directories if needed.
    pub fn new(config: DaemonConfig, queue: FileQueue) -> Result<Self> {
        queue.init()?;

        let bus = Arc::new(EventBus::new());
        bus.subscribe_all(Arc::new(LoggingSubscriber));
        bus.subscribe(EventKind::TaskStatusChanged, Arc::new(QueueSync::new(queue.clone())));

        Ok(Self { config, queue, bus })
    }

    /// The bus the run publishes on, for attaching extra subscribers.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn queue(&self) -> &FileQueue {
        &self.queue
    }

    /// Load pending records, register agents and build the coordinator.
    pub fn prepare(&self) -> Result<Coordinator> {
        let scheduler = Scheduler::with_config(self.bus.clone(), self.config.scheduler.clone());
        let registry = AgentRegistry::new(self.bus.clone());
        let mut coordinator =
            Coordinator::from_parts(self.config.coordinator.clone(), self.bus.clone(), scheduler, registry);

        for agent in &self.config.agents {
            coordinator.register_agent(agent.clone())?;
        }

        let load = self.queue.load_pending()?;
        for record in load.records {
            let task_id = record.task_id.clone();
            let submitted = record.into_task().and_then(|task| coordinator.submit_task(task));
            if let Err(e) = submitted {
                log::warn!("Skipping task {}: {}", task_id, e);
            }
        }

        log::info!(
            "Daemon prepared: {} tasks, {} agents",
            coordinator.scheduler().len(),
            coordinator.registry().len()
        );
        Ok(coordinator)
    }

    /// Run every pending task until the queue drains, stalls or hits the tick limit.
    pub async fn run(&self) -> Result<RunReport> {
        let mut coordinator = self.prepare()?;
        log::info!("Daemon started on {}", self.queue.root().display());
        let report = coordinator.run().await?;
        log::info!("Daemon finished: {:?} after {} ticks", report.outcome, report.ticks);
        Ok(report)
    }
}

/// The built-in demo: four chained tasks from analysis to documentation.
pub fn sample_project() -> Vec<Task> {
    vec![
        Task::new("task1", "Analyze requirements", Priority::High)
            .with_component("analysis")
            .with_max_runtime(Duration::from_secs(10)),
        Task::new("task2", "Design architecture", Priority::High)
            .depends_on("task1")
            .with_component("design")
            .with_max_runtime(Duration::from_secs(20)),
        Task::new("task3", "Implement feature", Priority::Medium)
            .depends_on("task2")
            .with_component("implementation")
            .with_max_runtime(Duration::from_secs(30)),
        Task::new("task4", "Write documentation", Priority::Low)
            .depends_on("task3")
            .with_component("documentation")
            .with_max_runtime(Duration::from_secs(15)),
    ]
}

/// Write the sample project into the pending folder.
pub fn enqueue_sample(queue: &FileQueue) -> Result<usize> {
    let tasks = sample_project();
    for task in &tasks {
        queue.enqueue(&TaskRecord::from(task))?;
    }
    Ok(tasks.len())
}
