//! Coordinator loop pairing ready tasks with idle agents.
//!
//! Execution is simulated: an assigned task finishes when its deadline
//! (`assignment time + max_runtime`) has elapsed. Each [`Coordinator::tick`]
//! performs one completion sweep followed by at most one assignment.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentId, AgentState};
use crate::coordination::clock::Clock;
use crate::coordination::events::EventBus;
use crate::coordination::registry::AgentRegistry;
use crate::coordination::scheduler::{Scheduler, SchedulerConfig, StuckTask};
use crate::error::Result;
use crate::task::{Task, TaskId};

/// Configuration for the coordinator loop.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Wait between ticks.
    pub poll_interval: Duration,
    /// Give up after this many consecutive ticks without possible progress.
    pub stall_ticks: Option<u64>,
    /// Hard bound on the number of ticks in one run.
    pub max_ticks: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stall_ticks: Some(10),
            max_ticks: None,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks whose deadlines elapsed, in completion order.
    pub completed: Vec<TaskId>,
    /// New pairing made this tick.
    pub assigned: Option<(AgentId, TaskId)>,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task submitted before the run finished.
    Completed,
    /// Pending tasks remain but none can ever be assigned.
    Stalled,
    /// `max_ticks` was reached.
    TickLimit,
}

/// Summary of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Ticks executed.
    pub ticks: u64,
    /// Time on the driving clock when the run ended.
    pub elapsed: Duration,
    /// Completion order.
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// Pending tasks that can never become ready.
    pub stuck: Vec<StuckTask>,
}

/// Loop bookkeeping shared by the sync and async drivers.
struct RunProgress {
    target: usize,
    ticks: u64,
    stalled_ticks: u64,
}

/// Drives simulated execution over a scheduler and agent registry.
pub struct Coordinator {
    /// Configuration.
    config: CoordinatorConfig,
    /// Shared event bus.
    bus: Arc<EventBus>,
    scheduler: Scheduler,
    registry: AgentRegistry,
    /// Current task held by each busy agent.
    assignments: BTreeMap<AgentId, TaskId>,
    /// Simulated completion time of each assigned task.
    deadlines: HashMap<TaskId, Duration>,
}

impl Coordinator {
    /// Create a coordinator with its own bus, scheduler and registry.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_scheduler_config(config, SchedulerConfig::default())
    }

    pub fn with_scheduler_config(config: CoordinatorConfig, scheduler_config: SchedulerConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        let scheduler = Scheduler::with_config(bus.clone(), scheduler_config);
        let registry = AgentRegistry::new(bus.clone());
        Self::from_parts(config, bus, scheduler, registry)
    }

    /// Build a coordinator around existing components.
    ///
    /// The scheduler and registry are expected to publish to `bus`.
    pub fn from_parts(
        config: CoordinatorConfig,
        bus: Arc<EventBus>,
        scheduler: Scheduler,
        registry: AgentRegistry,
    ) -> Self {
        Self {
            config,
            bus,
            scheduler,
            registry,
            assignments: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Submit a task to the scheduler.
    pub fn submit_task(&mut self, task: Task) -> Result<()> {
        self.scheduler.submit_task(task)
    }

    /// Register an agent with the registry.
    pub fn register_agent(&mut self, agent: Agent) -> Result<()> {
        self.registry.register_agent(agent)
    }

    /// Task currently held by an agent.
    pub fn assignment(&self, agent_id: &AgentId) -> Option<&TaskId> {
        self.assignments.get(agent_id)
    }

    /// All current assignments, by agent id.
    pub fn assignments(&self) -> &BTreeMap<AgentId, TaskId> {
        &self.assignments
    }

    /// Simulated completion time of an assigned task.
    pub fn deadline(&self, task_id: &TaskId) -> Option<Duration> {
        self.deadlines.get(task_id).copied()
    }

    /// Run one cooperative step at simulated time `now`.
    pub fn tick(&mut self, now: Duration) -> Result<TickReport> {
        let completed = self.sweep(now)?;
        let assigned = self.assign(now)?;
        Ok(TickReport { completed, assigned })
    }

    /// Retire every assignment whose deadline has elapsed.
    fn sweep(&mut self, now: Duration) -> Result<Vec<TaskId>> {
        let mut due: Vec<(Duration, TaskId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect();
        due.sort();

        let mut completed = Vec::with_capacity(due.len());
        for (_, task_id) in due {
            self.scheduler.mark_task_completed(&task_id)?;
            self.release(&task_id)?;
            log::info!("Task {} completed", task_id);
            completed.push(task_id);
        }
        Ok(completed)
    }

    /// Pair the first idle agent with the next ready task, if both exist.
    fn assign(&mut self, now: Duration) -> Result<Option<(AgentId, TaskId)>> {
        let Some(agent_id) = self.registry.idle_agent().map(|a| a.id.clone()) else {
            return Ok(None);
        };
        let Some(task) = self.scheduler.next_available_task() else {
            return Ok(None);
        };

        self.scheduler.start_task(&task.id)?;
        self.registry.set_agent_state(&agent_id, AgentState::Busy)?;

        let deadline = now.saturating_add(task.max_runtime);
        self.assignments.insert(agent_id.clone(), task.id.clone());
        self.deadlines.insert(task.id.clone(), deadline);

        log::info!(
            "Assigned task {} to agent {} (deadline {:?})",
            task.id,
            agent_id,
            deadline
        );
        Ok(Some((agent_id, task.id)))
    }

    /// Drop a task's deadline and assignment and set its agent idle.
    fn release(&mut self, task_id: &TaskId) -> Result<()> {
        self.deadlines.remove(task_id);
        let agent_id = self
            .assignments
            .iter()
            .find(|(_, assigned)| *assigned == task_id)
            .map(|(agent, _)| agent.clone());

        if let Some(agent_id) = agent_id {
            self.assignments.remove(&agent_id);
            self.registry.set_agent_state(&agent_id, AgentState::Idle)?;
        }
        Ok(())
    }

    /// Report an in-progress task as failed and free its agent.
    pub fn fail_task(&mut self, task_id: &TaskId) -> Result<()> {
        self.scheduler.mark_task_failed(task_id)?;
        self.release(task_id)?;
        log::warn!("Task {} failed", task_id);
        Ok(())
    }

    /// Nothing is running and nothing can be assigned, yet work remains.
    fn is_stalled(&self) -> bool {
        self.deadlines.is_empty()
            && !self.scheduler.pending_task_ids().is_empty()
            && (self.registry.idle_agent().is_none() || !self.scheduler.has_ready_task())
    }

    fn step(&mut self, now: Duration, progress: &mut RunProgress) -> Result<Option<RunOutcome>> {
        self.tick(now)?;
        progress.ticks += 1;

        if self.scheduler.finished_count() >= progress.target {
            return Ok(Some(RunOutcome::Completed));
        }

        if self.is_stalled() {
            progress.stalled_ticks += 1;
            if let Some(limit) = self.config.stall_ticks
                && progress.stalled_ticks >= limit
            {
                let stuck = self.scheduler.stuck_tasks();
                log::warn!(
                    "Coordinator stalled with {} pending task(s), {} permanently blocked",
                    self.scheduler.pending_task_ids().len(),
                    stuck.len()
                );
                return Ok(Some(RunOutcome::Stalled));
            }
        } else {
            progress.stalled_ticks = 0;
        }

        if let Some(max) = self.config.max_ticks
            && progress.ticks >= max
        {
            return Ok(Some(RunOutcome::TickLimit));
        }

        Ok(None)
    }

    fn start_run(&self) -> RunProgress {
        let target = self.scheduler.len();
        log::info!(
            "Coordinator started: {} task(s), {} agent(s)",
            target,
            self.registry.len()
        );
        RunProgress {
            target,
            ticks: 0,
            stalled_ticks: 0,
        }
    }

    fn report(&self, outcome: RunOutcome, progress: &RunProgress, elapsed: Duration) -> RunReport {
        log::info!(
            "Coordinator finished: {:?} after {} tick(s), {} completed",
            outcome,
            progress.ticks,
            self.scheduler.completed_task_ids().len()
        );
        RunReport {
            outcome,
            ticks: progress.ticks,
            elapsed,
            completed: self.scheduler.completed_task_ids().to_vec(),
            failed: self.scheduler.failed_task_ids().to_vec(),
            stuck: self.scheduler.stuck_tasks(),
        }
    }

    /// Drive ticks on `clock` until every task submitted so far has finished.
    ///
    /// Deadlines are measured on `clock`, so a run should not be resumed on a
    /// different clock while tasks are in progress.
    pub fn run_with_clock<C: Clock>(&mut self, clock: &mut C) -> Result<RunReport> {
        let mut progress = self.start_run();
        loop {
            let now = clock.now();
            if let Some(outcome) = self.step(now, &mut progress)? {
                return Ok(self.report(outcome, &progress, now));
            }
            clock.sleep(self.config.poll_interval);
        }
    }

    /// Drive ticks in real time on the tokio runtime.
    pub async fn run(&mut self) -> Result<RunReport> {
        let start = tokio::time::Instant::now();
        let mut progress = self.start_run();
        loop {
            let now = start.elapsed();
            if let Some(outcome) = self.step(now, &mut progress)? {
                return Ok(self.report(outcome, &progress, now));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::clock::ManualClock;
    use crate::coordination::events::{Event, EventKind, EventRecorder};
    use crate::error::Error;
    use crate::task::{Priority, TaskStatus};

    fn id(s: &str) -> TaskId {
        TaskId(s.to_string())
    }

    fn task(name: &str, priority: &str, secs: u64) -> Task {
        Task::new(name, format!("{} task", priority), Priority::from_label(priority))
            .with_component("c1")
            .with_max_runtime(Duration::from_secs(secs))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Busy agents are exactly the agents with an assignment.
    fn assert_exclusive(coordinator: &Coordinator) {
        for agent in coordinator.registry().agents() {
            let assigned = coordinator.assignment(&agent.id).is_some();
            assert_eq!(
                agent.state == AgentState::Busy,
                assigned,
                "agent {} is {:?} with assignment={}",
                agent.id,
                agent.state,
                assigned
            );
        }
        let mut held: Vec<_> = coordinator.assignments().values().collect();
        let before = held.len();
        held.sort();
        held.dedup();
        assert_eq!(held.len(), before, "a task is assigned to two agents");
    }

    #[test]
    fn test_priority_and_dependency_completion_order() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("t1", "low", 1)).unwrap();
        coordinator.submit_task(task("t2", "high", 1)).unwrap();
        coordinator.submit_task(task("t3", "medium", 1)).unwrap();
        coordinator.submit_task(task("t4", "high", 1).depends_on("t2")).unwrap();
        coordinator.register_agent(Agent::new("agent1", "TestAgent1")).unwrap();

        let mut clock = ManualClock::new();
        let report = coordinator.run_with_clock(&mut clock).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, vec![id("t2"), id("t4"), id("t3"), id("t1")]);
        assert_eq!(report.elapsed, Duration::from_secs(4));
        assert!(report.failed.is_empty());
        assert!(report.stuck.is_empty());
    }

    #[test]
    fn test_tick_assigns_then_completes_at_deadline() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("t1", "high", 1)).unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let first = coordinator.tick(ms(0)).unwrap();
        assert_eq!(first.assigned, Some((AgentId::from("a1"), id("t1"))));
        assert_eq!(coordinator.deadline(&id("t1")), Some(ms(1000)));
        assert_eq!(coordinator.scheduler().status(&id("t1")), Some(TaskStatus::InProgress));

        let early = coordinator.tick(ms(999)).unwrap();
        assert_eq!(early, TickReport::default());

        let due = coordinator.tick(ms(1000)).unwrap();
        assert_eq!(due.completed, vec![id("t1")]);
        assert_eq!(coordinator.scheduler().status(&id("t1")), Some(TaskStatus::Completed));
        assert!(coordinator.assignments().is_empty());
        assert!(coordinator.deadline(&id("t1")).is_none());
        assert!(coordinator.registry().agent(&AgentId::from("a1")).unwrap().is_idle());
    }

    #[test]
    fn test_at_most_one_assignment_per_tick() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("t1", "high", 5)).unwrap();
        coordinator.submit_task(task("t2", "high", 5)).unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();
        coordinator.register_agent(Agent::new("a2", "B")).unwrap();

        coordinator.tick(ms(0)).unwrap();
        assert_eq!(coordinator.assignments().len(), 1);
        assert_eq!(coordinator.assignment(&AgentId::from("a1")), Some(&id("t1")));

        coordinator.tick(ms(100)).unwrap();
        assert_eq!(coordinator.assignment(&AgentId::from("a2")), Some(&id("t2")));
        assert_eq!(coordinator.deadline(&id("t2")), Some(ms(5100)));
    }

    #[test]
    fn test_busy_iff_assigned_throughout_run() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        for (name, priority, secs) in [("a", "high", 1), ("b", "low", 2), ("c", "medium", 1), ("d", "low", 3)] {
            coordinator.submit_task(task(name, priority, secs)).unwrap();
        }
        coordinator.submit_task(task("e", "high", 1).depends_on("d")).unwrap();
        for agent in ["x", "y", "z"] {
            coordinator.register_agent(Agent::new(agent, agent)).unwrap();
        }

        let mut now = Duration::ZERO;
        while coordinator.scheduler().finished_count() < 5 {
            coordinator.tick(now).unwrap();
            assert_exclusive(&coordinator);
            now += ms(100);
            assert!(now < Duration::from_secs(60), "run did not finish");
        }
        assert_exclusive(&coordinator);
        assert_eq!(coordinator.scheduler().completed_task_ids().last(), Some(&id("e")));
    }

    #[test]
    fn test_full_run_event_sequence() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("t1_bdd", "high", 1)).unwrap();
        coordinator
            .submit_task(task("t2_bdd", "low", 1).depends_on("t1_bdd"))
            .unwrap();

        let recorder = Arc::new(EventRecorder::new());
        coordinator
            .bus()
            .subscribe(EventKind::AgentStateChanged, recorder.clone());
        coordinator
            .bus()
            .subscribe(EventKind::TaskStatusChanged, recorder.clone());

        coordinator.register_agent(Agent::new("bdd_agent", "BDDAgent")).unwrap();
        coordinator.run_with_clock(&mut ManualClock::new()).unwrap();

        let agent = || AgentId::from("bdd_agent");
        assert_eq!(
            recorder.events(),
            vec![
                Event::agent_state_changed(agent(), AgentState::Idle),
                Event::task_status_changed(id("t1_bdd"), TaskStatus::InProgress),
                Event::agent_state_changed(agent(), AgentState::Busy),
                Event::task_status_changed(id("t1_bdd"), TaskStatus::Completed),
                Event::agent_state_changed(agent(), AgentState::Idle),
                Event::task_status_changed(id("t2_bdd"), TaskStatus::InProgress),
                Event::agent_state_changed(agent(), AgentState::Busy),
                Event::task_status_changed(id("t2_bdd"), TaskStatus::Completed),
                Event::agent_state_changed(agent(), AgentState::Idle),
            ]
        );
    }

    #[test]
    fn test_simultaneous_deadlines_complete_in_deadline_then_id_order() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("slow", "high", 3)).unwrap();
        coordinator.submit_task(task("b-fast", "medium", 1)).unwrap();
        coordinator.submit_task(task("a-fast", "low", 1)).unwrap();
        for agent in ["a1", "a2", "a3"] {
            coordinator.register_agent(Agent::new(agent, agent)).unwrap();
        }

        // slow @0 -> 3s, b-fast @0.1 -> 1.1s, a-fast @0.2 -> 1.2s
        for step in 0..3 {
            coordinator.tick(ms(step * 100)).unwrap();
        }
        let report = coordinator.tick(Duration::from_secs(10)).unwrap();

        assert_eq!(report.completed, vec![id("b-fast"), id("a-fast"), id("slow")]);
    }

    #[test]
    fn test_stuck_task_never_completes() {
        let config = CoordinatorConfig {
            stall_ticks: None,
            max_ticks: Some(500),
            ..Default::default()
        };
        let mut coordinator = Coordinator::new(config);
        coordinator.submit_task(task("ok", "low", 1)).unwrap();
        coordinator
            .submit_task(task("blocked", "high", 1).depends_on("missing"))
            .unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let report = coordinator.run_with_clock(&mut ManualClock::new()).unwrap();

        assert_eq!(report.outcome, RunOutcome::TickLimit);
        assert_eq!(report.ticks, 500);
        assert_eq!(report.completed, vec![id("ok")]);
        assert_eq!(
            coordinator.scheduler().status(&id("blocked")),
            Some(TaskStatus::Pending)
        );
        assert_eq!(report.stuck.len(), 1);
        assert_eq!(report.stuck[0].unresolved, vec![id("missing")]);
    }

    #[test]
    fn test_stall_detection_ends_run() {
        let config = CoordinatorConfig {
            stall_ticks: Some(3),
            ..Default::default()
        };
        let mut coordinator = Coordinator::new(config);
        coordinator
            .submit_task(task("blocked", "high", 1).depends_on("missing"))
            .unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let report = coordinator.run_with_clock(&mut ManualClock::new()).unwrap();

        assert_eq!(report.outcome, RunOutcome::Stalled);
        assert_eq!(report.ticks, 3);
        assert_eq!(report.stuck[0].id, id("blocked"));
    }

    #[test]
    fn test_no_agents_stalls() {
        let config = CoordinatorConfig {
            stall_ticks: Some(2),
            ..Default::default()
        };
        let mut coordinator = Coordinator::new(config);
        coordinator.submit_task(task("t1", "high", 1)).unwrap();

        let report = coordinator.run_with_clock(&mut ManualClock::new()).unwrap();

        assert_eq!(report.outcome, RunOutcome::Stalled);
        assert!(report.stuck.is_empty());
        assert_eq!(coordinator.scheduler().pending_task_ids(), vec![id("t1")]);
    }

    #[test]
    fn test_empty_run_completes_immediately() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let report = coordinator.run_with_clock(&mut ManualClock::new()).unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.ticks, 1);
    }

    #[test]
    fn test_unbounded_runtime_saturates_deadline() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator
            .submit_task(Task::new("forever", "never finishes", Priority::High).with_max_runtime(Duration::MAX))
            .unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let report = coordinator.tick(ms(1)).unwrap();
        assert_eq!(report.assigned, Some((AgentId::from("a1"), id("forever"))));
        assert_eq!(coordinator.deadline(&id("forever")), Some(Duration::MAX));

        let later = coordinator.tick(Duration::from_secs(3600)).unwrap();
        assert!(later.completed.is_empty());
        assert_eq!(coordinator.scheduler().status(&id("forever")), Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_fail_task_frees_agent() {
        let mut coordinator = Coordinator::new(CoordinatorConfig::default());
        coordinator.submit_task(task("t1", "high", 10)).unwrap();
        coordinator.submit_task(task("t2", "low", 1)).unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        coordinator.tick(ms(0)).unwrap();
        coordinator.fail_task(&id("t1")).unwrap();

        assert_eq!(coordinator.scheduler().status(&id("t1")), Some(TaskStatus::Failed));
        assert!(coordinator.registry().agent(&AgentId::from("a1")).unwrap().is_idle());
        assert!(coordinator.deadline(&id("t1")).is_none());
        assert_exclusive(&coordinator);

        assert!(matches!(
            coordinator.fail_task(&id("t1")),
            Err(Error::TaskNotInProgress { .. })
        ));

        let mut clock = ManualClock::new();
        clock.advance(ms(100));
        let report = coordinator.run_with_clock(&mut clock).unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, vec![id("t2")]);
        assert_eq!(report.failed, vec![id("t1")]);
    }

    #[tokio::test]
    async fn test_async_run_completes() {
        let config = CoordinatorConfig {
            poll_interval: ms(1),
            ..Default::default()
        };
        let mut coordinator = Coordinator::new(config);
        coordinator.submit_task(task("t1", "low", 0)).unwrap();
        coordinator.submit_task(task("t2", "high", 0)).unwrap();
        coordinator.register_agent(Agent::new("a1", "A")).unwrap();

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.completed, vec![id("t2"), id("t1")]);
    }
}
