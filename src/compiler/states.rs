//! Resource state optimization.
//!
//! For each resource the optimizer walks the passes touching it in schedule
//! order. Consecutive read-only requests are merged into one combined state
//! so the resource is transitioned once into a broad read state instead of
//! once per narrow read. Write requests are never merged.

use crate::graph::{PassHandle, ResourceId, ResourceState};

/// Optimized state of one resource in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassResourceState {
    /// The pass using the resource.
    pub pass: PassHandle,
    /// State the pass asked for.
    pub requested: ResourceState,
    /// State the resource is actually put in for the pass.
    pub optimized: ResourceState,
    /// Optimized state of the previous use, or `COMMON` for the first use.
    pub previous: ResourceState,
    /// An unordered-access hazard barrier is needed before the pass's work.
    pub needs_uav_barrier: bool,
}

impl PassResourceState {
    /// Check if a state transition must be issued before the pass.
    pub fn needs_transition(&self) -> bool {
        self.previous != self.optimized
    }
}

/// Requested and optimized states of one resource across the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResourceSchedulingInfo {
    resource: ResourceId,
    passes: Vec<PassResourceState>,
}

impl PipelineResourceSchedulingInfo {
    /// Optimize the requests of `resource`.
    ///
    /// `requests` must be in schedule order.
    pub fn new(resource: ResourceId, requests: &[(PassHandle, ResourceState)]) -> Self {
        Self {
            resource,
            passes: optimize(requests),
        }
    }

    /// The resource the info belongs to.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    /// Per-pass states in schedule order.
    pub fn passes(&self) -> &[PassResourceState] {
        &self.passes
    }

    /// State of the resource in `pass`, if the pass requested one.
    pub fn pass_state(&self, pass: PassHandle) -> Option<&PassResourceState> {
        self.passes.iter().find(|state| state.pass == pass)
    }
}

/// Merge read-only runs of `requests` and flag UAV barriers.
///
/// `requests` must be in schedule order.
pub fn optimize(requests: &[(PassHandle, ResourceState)]) -> Vec<PassResourceState> {
    let mut states: Vec<PassResourceState> = Vec::with_capacity(requests.len());
    let mut run_start = 0usize;
    let mut accumulated = ResourceState::COMMON;

    for &(pass, requested) in requests {
        if requested.is_read_only() {
            if accumulated.is_empty() {
                run_start = states.len();
            }
            accumulated |= requested;
        } else {
            flush_read_run(&mut states[run_start..], &mut accumulated);
        }

        states.push(PassResourceState {
            pass,
            requested,
            optimized: requested,
            previous: ResourceState::COMMON,
            needs_uav_barrier: requested.needs_uav_barrier(),
        });

        if !requested.is_read_only() {
            run_start = states.len();
        }
    }
    flush_read_run(&mut states[run_start..], &mut accumulated);

    let mut previous = ResourceState::COMMON;
    for state in &mut states {
        state.previous = previous;
        previous = state.optimized;
    }
    states
}

/// Give every pass of the pending read run the accumulated state.
fn flush_read_run(run: &mut [PassResourceState], accumulated: &mut ResourceState) {
    if accumulated.is_empty() {
        return;
    }
    for state in run {
        state.optimized = *accumulated;
    }
    *accumulated = ResourceState::COMMON;
}
