//! Consistency Verifier
//!
//! Confirms every data-bearing member holds the same replicated state
//! once the set is back in steady state:
//!
//! 1. wait for two-phase collection drops to finish everywhere
//! 2. compare document counts (skipped after unclean restarts)
//! 3. compare oplogs from the newest entry backwards
//! 4. compare per-database hashes, ignoring capped collections
//! 5. validate every collection
//!
//! The first member passed in is the reference; every other member is
//! compared against it. The verifier never mutates the set.

mod collections;
mod hashes;
mod oplog;
mod report;

pub use report::{CollectionDiff, ConsistencyReport, Mismatch};

use crate::harness::{HarnessError, HarnessResult, WaitConfig};
use crate::node::NodeHandle;
use crate::observability::{log_event, Event, Logger};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierOptions {
    pub allow_unclean_shutdowns: bool,
    pub rollback_shutdowns: bool,
    /// Bound on the drop-pending barrier
    pub wait: WaitConfig,
}

impl VerifierOptions {
    /// Counts are meaningless once a member may have been killed.
    pub fn skips_count_check(&self) -> bool {
        self.allow_unclean_shutdowns && self.rollback_shutdowns
    }
}

pub struct ConsistencyVerifier<'a> {
    test: &'a str,
    options: VerifierOptions,
}

impl<'a> ConsistencyVerifier<'a> {
    pub fn new(test: &'a str, options: VerifierOptions) -> Self {
        Self { test, options }
    }

    /// Run every check and fail with the full report on any mismatch.
    pub fn verify(&self, nodes: &[NodeHandle]) -> HarnessResult<()> {
        let report = self.check(nodes)?;
        if report.is_empty() {
            return Ok(());
        }
        let text = report.to_string();
        let count = report.len().to_string();
        log_event(
            self.test,
            Event::ConsistencyCheckFailed,
            &[("mismatches", &count), ("report", &text)],
        );
        Err(HarnessError::consistency_mismatch(text))
    }

    /// Run every check and return what was found.
    ///
    /// Errors are reserved for failures to talk to the members; mismatches
    /// go in the report.
    pub fn check(&self, nodes: &[NodeHandle]) -> HarnessResult<ConsistencyReport> {
        log_event(self.test, Event::ConsistencyCheckBegin, &[]);
        let members = self.data_bearing(nodes)?;
        let mut report = ConsistencyReport::default();

        collections::await_drop_pending(&members, &self.options.wait)?;

        if self.options.skips_count_check() {
            log_event(
                self.test,
                Event::CountCheckSkipped,
                &[("reason", "unclean shutdowns allowed")],
            );
        } else {
            collections::check_counts(&members, &mut report)?;
        }
        oplog::check_oplogs(&members, &mut report)?;
        hashes::check_replicated_data_hashes(&members, &mut report)?;
        collections::validate_collections(&members, &mut report)?;

        if report.is_empty() {
            let count = members.len().to_string();
            log_event(self.test, Event::ConsistencyCheckComplete, &[("members", &count)]);
        } else {
            Logger::trace("CONSISTENCY_REPORT", &[("test", self.test), ("report", &report.to_string())]);
        }
        Ok(report)
    }

    /// Members that answer as data-bearing, in the order given.
    fn data_bearing(&self, nodes: &[NodeHandle]) -> HarnessResult<Vec<NodeHandle>> {
        let mut members = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.is_arbiter()? {
                log_event(self.test, Event::ArbiterSkipped, &[("host", node.host())]);
            } else {
                members.push(node.clone());
            }
        }
        Ok(members)
    }
}
