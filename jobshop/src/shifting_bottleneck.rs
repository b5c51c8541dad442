//! The shifting bottleneck procedure.
//!
//! Machines are sequenced one at a time. Every round solves the single machine problem of each
//! unsequenced machine against the heads and tails of the current graph, commits the machine with
//! the largest maximum lateness and then re-optimizes the machines sequenced before it.

use disjunctgraph::{ Graph, GraphNode, LinkedGraph, NodeId };
use itertools::Itertools;
use log::{ debug, info };
use rayon::prelude::*;

use crate::config::SolverConfig;
use crate::error::Result;
use crate::problem::{ Problem, ProblemNode, ProblemSolver };
use crate::single_machine::{ JobTiming, SingleMachineSolution, SingleMachineSolver, TimingTable };

pub type ShopGraph = LinkedGraph<ProblemNode>;

/// Heads and tails of every node of a graph, taken at one point in time.
#[derive(Debug, Clone)]
pub struct Timings {
    pub heads: Vec<u32>,
    pub tails: Vec<u32>,
    pub makespan: u32,
}

impl Timings {
    pub fn of<G: Graph>(graph: &G) -> Self {
        let heads = graph.heads();
        let makespan = heads[graph.sink().id()];
        Timings { heads, tails: graph.tails(), makespan }
    }

    /// Release times and due dates of the operations on `machine`, one row per job in job order.
    pub fn table<G: Graph>(&self, graph: &G, machine: u32) -> TimingTable {
        let jobs = graph.machine_nodes(machine).into_iter()
            .filter_map(|node| node.job_id().map(|job| (job, node)))
            .sorted_by_key(|(job, _)| *job)
            .map(|(job, node)| {
                let processing = node.weight();
                JobTiming {
                    job,
                    operation: node.id(),
                    processing,
                    release: self.heads[node.id()],
                    due: self.makespan - self.tails[node.id()] + processing
                }
            })
            .collect();

        TimingTable { machine, jobs }
    }
}

/// One round of the procedure: the machine that got sequenced and the makespan after re-optimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottleneckStep {
    pub machine: u32,
    pub max_lateness: u32,
    /// Job ids in processing order.
    pub sequence: Vec<usize>,
    pub makespan: u32,
}

#[derive(Debug, Clone)]
pub struct BottleneckSolution {
    /// Graph with every used machine sequenced.
    pub graph: ShopGraph,
    pub makespan: u32,
    pub steps: Vec<BottleneckStep>,
}

pub struct ShiftingBottleneck {
    config: SolverConfig,
}

impl ShiftingBottleneck {
    pub fn new(config: SolverConfig) -> Self {
        ShiftingBottleneck { config }
    }

    fn solver(&self) -> SingleMachineSolver {
        SingleMachineSolver::new(self.config.node_budget)
    }

    /// Solves every table, on the thread pool if configured. Results keep the order of `tables`.
    fn solve_tables(&self, tables: &[TimingTable]) -> Result<Vec<SingleMachineSolution>> {
        let solver = self.solver();
        if self.config.parallel {
            tables.par_iter().map(|table| solver.solve(table)).collect()
        } else {
            tables.iter().map(|table| solver.solve(table)).collect()
        }
    }

    /// Removes the sequence of `machine`, solves its single machine problem against the rest of
    /// the graph and commits the result.
    /// On error the previous sequence of the machine is restored.
    pub fn reoptimize_machine(&self, graph: &mut ShopGraph, machine: u32) -> Result<SingleMachineSolution> {
        let previous = graph.clear_sequence(machine);
        let table = Timings::of(graph).table(graph, machine);
        let result = self.solver().solve(&table)
            .and_then(|solution| {
                graph.commit_sequence(machine, &solution.operations)?;
                Ok(solution)
            });

        let solution = match result {
            Ok(solution) => solution,
            Err(err) => {
                if let Some(previous) = previous {
                    graph.commit_sequence(machine, &previous)?;
                }
                return Err(err);
            }
        };
        debug!("machine {} re-sequenced as {:?}, lmax {}", machine, solution.sequence, solution.max_lateness);
        Ok(solution)
    }

    /// Runs one round on `graph`, returning `None` once every machine in `machines` is sequenced.
    pub fn step(&self, graph: &mut ShopGraph, machines: &[u32]) -> Result<Option<BottleneckStep>> {
        let unsequenced = machines.iter()
            .cloned()
            .filter(|x| graph.sequence(*x).is_none())
            .collect::<Vec<_>>();
        if unsequenced.is_empty() {
            return Ok(None);
        }

        let timings = Timings::of(graph);
        let tables = unsequenced.iter()
            .map(|x| timings.table(graph, *x))
            .collect::<Vec<_>>();

        // Machines are ascending, so the first of equal latenesses is kept.
        let bottleneck = self.solve_tables(&tables)?.into_iter()
            .fold(None, |best: Option<SingleMachineSolution>, solution| match best {
                Some(best) if best.max_lateness >= solution.max_lateness => Some(best),
                _ => Some(solution)
            });
        let bottleneck = match bottleneck {
            Some(bottleneck) => bottleneck,
            None => return Ok(None),
        };

        graph.commit_sequence(bottleneck.machine, &bottleneck.operations)?;
        info!("bottleneck machine {} with lmax {}: {:?}", bottleneck.machine, bottleneck.max_lateness, bottleneck.sequence);

        for machine in graph.sequenced_machines() {
            if machine != bottleneck.machine {
                self.reoptimize_machine(graph, machine)?;
            }
        }

        let makespan = graph.critical_length();
        info!("makespan {} with {} machines sequenced", makespan, graph.sequenced_machines().len());

        Ok(Some(BottleneckStep {
            machine: bottleneck.machine,
            max_lateness: bottleneck.max_lateness,
            sequence: bottleneck.sequence,
            makespan
        }))
    }
}

impl ProblemSolver for ShiftingBottleneck {
    type Solution = BottleneckSolution;

    fn solve(&self, problem: &Problem) -> Result<Self::Solution> {
        problem.validate()?;

        let machines = problem.used_machines();
        let mut graph: ShopGraph = problem.into_graph();
        let mut steps = Vec::with_capacity(machines.len());
        debug!("{} jobs on {} machines, initial makespan {}", problem.jobs.len(), machines.len(), graph.critical_length());

        while let Some(step) = self.step(&mut graph, &machines)? {
            steps.push(step);
        }

        let makespan = graph.critical_length();
        Ok(BottleneckSolution { graph, makespan, steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Problem {
        Problem::new(3, vec!(
            vec!((1, 10), (2, 8), (3, 4)),
            vec!((2, 8)),
        )).unwrap()
    }

    /// Example of Pinedo, Scheduling: Theory, Algorithms, and Systems, section 7.2.
    fn pinedo() -> Problem {
        Problem::new(4, vec!(
            vec!((1, 10), (2, 8), (3, 4)),
            vec!((2, 8), (1, 3), (4, 5), (3, 6)),
            vec!((1, 4), (2, 7), (4, 3)),
        )).unwrap()
    }

    fn timing(job: usize, operation: usize, processing: u32, release: u32, due: u32) -> JobTiming {
        JobTiming { job, operation, processing, release, due }
    }

    #[test]
    fn scenario_timing_table() {
        let graph: ShopGraph = scenario().into_graph();
        let timings = Timings::of(&graph);

        assert_eq!(22, timings.makespan);
        assert_eq!(
            TimingTable { machine: 2, jobs: vec!(timing(0, 2, 8, 10, 18), timing(1, 4, 8, 0, 22)) },
            timings.table(&graph, 2));
    }

    #[test]
    fn scenario_schedules_unavailable_job_last() {
        let solution = ShiftingBottleneck::new(SolverConfig::default()).solve(&scenario()).unwrap();

        assert_eq!(22, solution.makespan);
        assert_eq!(Some(&[4, 2][..]), solution.graph.sequence(2));
        assert!(solution.steps.iter().all(|x| x.max_lateness == 0 && x.makespan == 22));
        assert_eq!(vec!(1, 2, 3), solution.steps.iter().map(|x| x.machine).sorted().collect::<Vec<_>>());
        let machine_2 = solution.steps.iter().find(|x| x.machine == 2).unwrap();
        assert_eq!(vec!(1, 0), machine_2.sequence);
    }

    #[test]
    fn pinedo_instance() {
        let problem = pinedo();
        let initial: ShopGraph = problem.into_graph();
        assert_eq!(22, initial.critical_length());

        let solution = ShiftingBottleneck::new(SolverConfig::default()).solve(&problem).unwrap();
        assert_eq!(28, solution.makespan);
        assert_eq!(vec!(
            BottleneckStep { machine: 1, max_lateness: 5, sequence: vec!(0, 1, 2), makespan: 27 },
            BottleneckStep { machine: 2, max_lateness: 1, sequence: vec!(1, 0, 2), makespan: 28 },
            BottleneckStep { machine: 3, max_lateness: 0, sequence: vec!(0, 1), makespan: 28 },
            BottleneckStep { machine: 4, max_lateness: 0, sequence: vec!(1, 2), makespan: 28 },
        ), solution.steps);
    }

    #[test]
    fn graph_stays_acyclic_every_round() {
        let problem = pinedo();
        let solver = ShiftingBottleneck::new(SolverConfig { node_budget: None, parallel: false });
        let machines = problem.used_machines();
        let mut graph: ShopGraph = problem.into_graph();
        let mut previous = graph.critical_length();

        while let Some(step) = solver.step(&mut graph, &machines).unwrap() {
            assert!(!graph.is_cyclic());
            assert!(step.makespan >= previous);
            assert_eq!(step.makespan, graph.critical_length());
            previous = step.makespan;
        }

        for machine in machines {
            assert_eq!(graph.machine_nodes(machine).len(), graph.sequence(machine).unwrap().len());
        }
    }

    #[test]
    fn reoptimization_is_idempotent() {
        let solver = ShiftingBottleneck::new(SolverConfig::default());
        let mut graph = solver.solve(&pinedo()).unwrap().graph;

        for machine in 1..=4 {
            let before = graph.sequence(machine).map(|x| x.to_vec());
            let solution = solver.reoptimize_machine(&mut graph, machine).unwrap();
            assert_eq!(before.as_deref(), graph.sequence(machine));
            assert_eq!(0, solution.max_lateness);
            assert_eq!(28, graph.critical_length());
        }
    }

    #[test]
    fn failed_reoptimization_keeps_previous_sequence() {
        use crate::error::JobShopError;

        let mut graph: ShopGraph = pinedo().into_graph();
        graph.commit_sequence(2, &[4, 9, 2]).unwrap();

        // Without its own arcs machine 2 needs more than the root node to be solved.
        let solver = ShiftingBottleneck::new(SolverConfig { node_budget: Some(1), parallel: false });
        let result = solver.reoptimize_machine(&mut graph, 2);
        assert!(matches!(result, Err(JobShopError::NodeBudgetExceeded { machine: 2, budget: 1 })));
        assert_eq!(Some(&[4, 9, 2][..]), graph.sequence(2));
        assert_eq!(vec!(2), graph.sequenced_machines());
    }

    #[test]
    fn large_processing_times_keep_their_makespan() {
        let problem = Problem::new(2, vec!(vec!((1, 1_000_000_000), (2, 1_000_000_000)))).unwrap();
        let solution = ShiftingBottleneck::new(SolverConfig::default()).solve(&problem).unwrap();
        assert_eq!(2_000_000_000, solution.makespan);
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let problem = pinedo();
        let parallel = ShiftingBottleneck::new(SolverConfig { node_budget: None, parallel: true }).solve(&problem).unwrap();
        let sequential = ShiftingBottleneck::new(SolverConfig { node_budget: None, parallel: false }).solve(&problem).unwrap();
        assert_eq!(parallel.steps, sequential.steps);
    }

    #[test]
    fn node_budget_errors_propagate() {
        use crate::error::JobShopError;

        let result = ShiftingBottleneck::new(SolverConfig { node_budget: Some(1), parallel: false }).solve(&pinedo());
        assert!(matches!(result, Err(JobShopError::NodeBudgetExceeded { budget: 1, .. })));
    }
}
