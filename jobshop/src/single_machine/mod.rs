//! Exact `1|r_j|L_max` solver used for the machine subproblems of the shifting bottleneck procedure.
//!
//! Best first branch and bound over sequence prefixes. A prefix is bounded by the preemptive EDD
//! relaxation of [`lower_bound`]; whenever the relaxation needs no preemption it is a complete,
//! optimal completion of that prefix and becomes a candidate solution.

pub mod lower_bound;

use std::cmp::{ Ordering, Reverse };
use std::collections::BinaryHeap;

use log::{ debug, trace };

use crate::error::{ JobShopError, Result };
use self::lower_bound::lower_bound;

/// Processing time, release time and due date of one job on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTiming {
    pub job: usize,
    /// Graph node of the job's operation on the machine.
    pub operation: usize,
    pub processing: u32,
    pub release: u32,
    pub due: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingTable {
    pub machine: u32,
    pub jobs: Vec<JobTiming>,
}

impl TimingTable {
    /// Maximum lateness of processing the jobs in `order` (indices into `jobs`) without idling longer than needed.
    pub fn max_lateness(&self, order: &[usize]) -> u32 {
        let mut time = 0u32;
        let mut lateness = 0u32;
        for job in order.iter().map(|x| &self.jobs[*x]) {
            time = time.max(job.release) + job.processing;
            lateness = lateness.max(time.saturating_sub(job.due));
        }
        lateness
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleMachineSolution {
    pub machine: u32,
    /// Job ids in processing order.
    pub sequence: Vec<usize>,
    /// Operation nodes in processing order.
    pub operations: Vec<usize>,
    pub max_lateness: u32,
    /// Search nodes expanded.
    pub nodes: usize,
}

impl SingleMachineSolution {
    fn from_order(table: &TimingTable, order: &[usize], max_lateness: u32, nodes: usize) -> Self {
        SingleMachineSolution {
            machine: table.machine,
            sequence: order.iter().map(|x| table.jobs[*x].job).collect(),
            operations: order.iter().map(|x| table.jobs[*x].operation).collect(),
            max_lateness,
            nodes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchNode {
    lower_bound: u32,
    complete: bool,
    prefix: Vec<usize>,
    prefix_finish: u32,
}

impl Ord for SearchNode {
    // Smallest bound first, then complete sequences, then deeper prefixes.
    fn cmp(&self, other: &Self) -> Ordering {
        self.lower_bound.cmp(&other.lower_bound)
            .then_with(|| other.complete.cmp(&self.complete))
            .then_with(|| other.prefix.len().cmp(&self.prefix.len()))
            .then_with(|| self.prefix.cmp(&other.prefix))
            .then_with(|| self.prefix_finish.cmp(&other.prefix_finish))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `None` stands for no complete sequence found yet.
fn within(bound: u32, threshold: Option<u32>) -> bool {
    threshold.map_or(true, |x| bound <= x)
}

pub struct SingleMachineSolver {
    node_budget: Option<usize>,
}

impl SingleMachineSolver {
    pub fn new(node_budget: Option<usize>) -> Self {
        SingleMachineSolver { node_budget }
    }

    pub fn solve(&self, table: &TimingTable) -> Result<SingleMachineSolution> {
        let jobs = &table.jobs;

        match jobs.len() {
            0 => return Ok(SingleMachineSolution::from_order(table, &[], 0, 0)),
            1 => return Ok(SingleMachineSolution::from_order(table, &[0], table.max_lateness(&[0]), 0)),
            _ => {}
        }

        let mut queue: BinaryHeap<Reverse<SearchNode>> = BinaryHeap::new();
        let mut threshold: Option<u32> = None;
        let mut best: Option<SearchNode> = None;

        self.branch(jobs, &[], 0, &mut threshold, &mut queue);
        let mut expanded = 1;

        while let Some(Reverse(node)) = queue.pop() {
            if node.complete {
                if best.as_ref().map_or(true, |x| node.lower_bound < x.lower_bound) {
                    best = Some(node);
                }
                continue;
            }

            if !within(node.lower_bound, threshold) {
                continue;
            }

            expanded += 1;
            if let Some(budget) = self.node_budget {
                if expanded > budget {
                    return Err(JobShopError::NodeBudgetExceeded { machine: table.machine, budget });
                }
            }

            self.branch(jobs, &node.prefix, node.prefix_finish, &mut threshold, &mut queue);
        }

        let best = best.ok_or(JobShopError::SearchExhausted { machine: table.machine })?;
        debug!("machine {}: lmax {} after {} nodes", table.machine, best.lower_bound, expanded);
        Ok(SingleMachineSolution::from_order(table, &best.prefix, best.lower_bound, expanded))
    }

    /// Extends `prefix` by every job that isn't dominated, bounding each extension.
    fn branch(&self, jobs: &[JobTiming], prefix: &[usize], prefix_finish: u32, threshold: &mut Option<u32>, queue: &mut BinaryHeap<Reverse<SearchNode>>) {
        let remaining = (0..jobs.len())
            .filter(|x| !prefix.contains(x))
            .collect::<Vec<_>>();

        for candidate in remaining.iter().cloned() {
            // If another job completes before the candidate is even released, it goes first.
            let earliest_completion = remaining.iter()
                .filter(|x| **x != candidate)
                .map(|x| prefix_finish.max(jobs[*x].release) + jobs[*x].processing)
                .min();
            if earliest_completion.map_or(false, |x| jobs[candidate].release >= x) {
                continue;
            }

            let mut extended = prefix.to_vec();
            extended.push(candidate);
            let bound = lower_bound(jobs, &extended);

            if !within(bound.max_lateness, *threshold) {
                continue;
            }

            if bound.preempted {
                trace!("prefix {:?} bounded at {}", extended, bound.max_lateness);
                queue.push(Reverse(SearchNode {
                    lower_bound: bound.max_lateness,
                    complete: false,
                    prefix: extended,
                    prefix_finish: bound.prefix_finish
                }));
            } else {
                trace!("sequence {:?} complete at {}", bound.sequence, bound.max_lateness);
                *threshold = Some(bound.max_lateness);
                queue.push(Reverse(SearchNode {
                    lower_bound: bound.max_lateness,
                    complete: true,
                    prefix: bound.sequence,
                    prefix_finish: bound.makespan
                }));
            }
        }
    }
}
