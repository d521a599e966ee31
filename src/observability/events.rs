//! Observable events of a rollback run.

use std::fmt;

/// Every event the harness logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Run lifecycle
    ConfigLoaded,
    RunBegin,
    RunComplete,
    FixtureReady,

    // Phase machine
    PhaseTransition,

    // Topology
    IsolateNode,
    ReconnectNode,
    AwaitStepDown,
    StepDownIgnored,
    AwaitElection,
    NewPrimaryElected,
    RbidSnapshot,
    AwaitAppliedSurpass,
    AwaitRollback,
    RollbackComplete,
    UnrecoverableRollback,

    // Node lifecycle
    NodeRestart,
    NodeRestartSkipped,
    ClusterStopped,

    // Consistency
    ConsistencyCheckBegin,
    ConsistencyCheckComplete,
    ConsistencyCheckFailed,
    ArbiterSkipped,
    CountCheckSkipped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RunBegin => "ROLLBACK_RUN_BEGIN",
            Event::RunComplete => "ROLLBACK_RUN_COMPLETE",
            Event::FixtureReady => "FIXTURE_READY",

            Event::PhaseTransition => "PHASE_TRANSITION",

            Event::IsolateNode => "ISOLATE_NODE",
            Event::ReconnectNode => "RECONNECT_NODE",
            Event::AwaitStepDown => "AWAIT_STEP_DOWN",
            Event::StepDownIgnored => "STEP_DOWN_ERROR_IGNORED",
            Event::AwaitElection => "AWAIT_ELECTION",
            Event::NewPrimaryElected => "NEW_PRIMARY_ELECTED",
            Event::RbidSnapshot => "RBID_SNAPSHOT",
            Event::AwaitAppliedSurpass => "AWAIT_APPLIED_SURPASS",
            Event::AwaitRollback => "AWAIT_ROLLBACK",
            Event::RollbackComplete => "ROLLBACK_COMPLETE",
            Event::UnrecoverableRollback => "UNRECOVERABLE_ROLLBACK",

            Event::NodeRestart => "NODE_RESTART",
            Event::NodeRestartSkipped => "NODE_RESTART_SKIPPED",
            Event::ClusterStopped => "CLUSTER_STOPPED",

            Event::ConsistencyCheckBegin => "CONSISTENCY_CHECK_BEGIN",
            Event::ConsistencyCheckComplete => "CONSISTENCY_CHECK_COMPLETE",
            Event::ConsistencyCheckFailed => "CONSISTENCY_CHECK_FAILED",
            Event::ArbiterSkipped => "ARBITER_SKIPPED",
            Event::CountCheckSkipped => "COUNT_CHECK_SKIPPED",
        }
    }

    /// Events after which the run does not continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::UnrecoverableRollback | Event::ConsistencyCheckFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
