use std::io::{ BufRead, BufReader, Read };
use std::fs::File;
use std::path::Path;

use disjunctgraph::{ Graph, GraphNode, Relation };
use hashbrown::HashSet;
use itertools::Itertools;

use crate::error::{ JobShopError, Result };

/// Upper limit on the summed processing times. A single machine relaxation can count an
/// operation on a longest path twice, so twice the total has to fit in a `u32`.
pub const MAX_TOTAL_PROCESSING: u32 = u32::MAX / 2;

pub trait ProblemSolver {
    type Solution;
    fn solve(&self, problem: &Problem) -> Result<Self::Solution>;
}

/// A job shop instance: every job is an ordered list of activities, one per visited machine.
#[derive(Debug, Clone)]
pub struct Problem {
    pub machines: u32,
    pub activities: Vec<Activity>,
    pub jobs: Vec<Vec<usize>>,
    /// Best known makespan, when the instance comes with one.
    pub optimal: Option<u32>,
}

/// An operation: the part of a job processed on one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: usize,
    pub job_id: usize,
    pub process_time: u32,
    pub machine_id: u32,
}

impl Problem {
    /// Builds a problem from the routing of every job, given as `(machine_id, process_time)` in processing order.
    /// Machines are numbered from 1.
    pub fn new(machines: u32, routings: Vec<Vec<(u32, u32)>>) -> Result<Self> {
        let mut counter = 0usize;
        let mut activities = Vec::new();
        let mut jobs = Vec::with_capacity(routings.len());

        for (job_id, routing) in routings.into_iter().enumerate() {
            let mut job = Vec::with_capacity(routing.len());
            for (machine_id, process_time) in routing {
                activities.push(Activity { id: counter, job_id, process_time, machine_id });
                job.push(counter);
                counter += 1;
            }
            jobs.push(job);
        }

        let problem = Problem { machines, activities, jobs, optimal: None };
        problem.validate()?;
        Ok(problem)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads the instance format:
    /// jobs, machines and best known makespan (0 if unknown) on the first three lines,
    /// then a line of processing times per job and a line of 1-based machine ids per job,
    /// both in routing order.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut lines = Vec::new();
        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push((index + 1, line));
            }
        }
        let end = lines.last().map(|x| x.0 + 1).unwrap_or(1);
        let mut lines = lines.into_iter();

        let jobs = parse_header(lines.next(), end, "number of jobs")?;
        let machines = parse_header(lines.next(), end, "number of machines")?;
        let optimal = parse_header(lines.next(), end, "best known makespan")?;

        let processing_times = (0..jobs)
            .map(|_| parse_row(lines.next(), end, "processing times"))
            .collect::<Result<Vec<_>>>()?;

        let machine_placements = (0..jobs)
            .map(|_| parse_row(lines.next(), end, "machine placements"))
            .collect::<Result<Vec<_>>>()?;

        let routings = processing_times.into_iter().zip(machine_placements)
            .map(|((_, p), (line, m))| {
                if p.len() != m.len() {
                    return Err(JobShopError::Parse {
                        line,
                        reason: format!("{} machines given for {} processing times", m.len(), p.len())
                    });
                }
                Ok(m.into_iter().zip(p).collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut problem = Problem::new(machines, routings)?;
        problem.optimal = Some(optimal).filter(|x| *x > 0);
        Ok(problem)
    }

    /// Rejects instances the procedure can't run on, before any search starts.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| Err(JobShopError::MalformedInstance(reason));

        for (index, activity) in self.activities.iter().enumerate() {
            if activity.id != index {
                return malformed(format!("activity at position {} has id {}", index, activity.id));
            }
            if activity.machine_id == 0 || activity.machine_id > self.machines {
                return malformed(format!("activity {} runs on machine {}, machines are 1..={}", activity.id, activity.machine_id, self.machines));
            }
            if activity.process_time == 0 {
                return malformed(format!("activity {} has no processing time", activity.id));
            }
            if activity.job_id >= self.jobs.len() {
                return malformed(format!("activity {} belongs to unknown job {}", activity.id, activity.job_id));
            }
        }

        let mut routed = vec!(false; self.activities.len());
        let mut keys = HashSet::with_capacity(self.activities.len());
        for (job_id, job) in self.jobs.iter().enumerate() {
            if job.is_empty() {
                return malformed(format!("job {} has no activities", job_id));
            }
            for id in job {
                let activity = match self.activities.get(*id) {
                    Some(activity) => activity,
                    None => return malformed(format!("job {} routes through unknown activity {}", job_id, id)),
                };
                if activity.job_id != job_id || routed[*id] {
                    return malformed(format!("activity {} is routed by job {} but belongs to job {}", id, job_id, activity.job_id));
                }
                if !keys.insert((activity.machine_id, job_id)) {
                    return malformed(format!("job {} visits machine {} more than once", job_id, activity.machine_id));
                }
                routed[*id] = true;
            }
        }

        if let Some(id) = routed.iter().position(|x| !x) {
            return malformed(format!("activity {} is missing from the routing of job {}", id, self.activities[id].job_id));
        }

        let total = self.activities.iter()
            .try_fold(0u32, |total, x| total.checked_add(x.process_time))
            .filter(|x| *x <= MAX_TOTAL_PROCESSING);
        if total.is_none() {
            return malformed(format!("processing times add up to more than {}", MAX_TOTAL_PROCESSING));
        }

        Ok(())
    }

    /// Machines that process at least one activity, ascending.
    pub fn used_machines(&self) -> Vec<u32> {
        self.activities.iter()
            .map(|x| x.machine_id)
            .unique()
            .sorted()
            .collect()
    }

    /// Conjunctive graph of the problem, no machine is sequenced yet.
    /// Node 0 is the source, activity `i` is node `i + 1`, the last node is the sink.
    pub fn into_graph<I: Graph>(&self) -> I {
        let mut nodes: Vec<I::Node> = Vec::with_capacity(self.activities.len() + 2);
        nodes.push(I::Node::create(0, 0, None, None));
        nodes.extend(self.activities.iter()
            .map(|x| I::Node::create(x.id + 1, x.process_time, Some(x.machine_id), Some(x.job_id))));
        let sink = nodes.len();
        nodes.push(I::Node::create(sink, 0, None, None));

        let mut edges: Vec<Vec<Relation>> = nodes.iter().map(|_| Vec::new()).collect();

        for activities in &self.jobs {
            for activity in activities.windows(2) {
                // node_1 -> node_2, skipping the source node
                let node_1 = activity[0] + 1;
                let node_2 = activity[1] + 1;
                edges[node_1].push(Relation::Successor(node_2));
                edges[node_2].push(Relation::Predecessor(node_1));
            }

            if let (Some(first), Some(last)) = (activities.first(), activities.last()) {
                edges[0].push(Relation::Successor(first + 1));
                edges[first + 1].push(Relation::Predecessor(0));

                edges[last + 1].push(Relation::Successor(sink));
                edges[sink].push(Relation::Predecessor(last + 1));
            }
        }

        I::create(nodes, edges)
    }
}

fn parse_header(line: Option<(usize, String)>, end: usize, what: &str) -> Result<u32> {
    let (line, text) = line.ok_or_else(|| JobShopError::Parse { line: end, reason: format!("expected {}", what) })?;
    text.trim().parse::<u32>()
        .map_err(|_| JobShopError::Parse { line, reason: format!("{} is not a number", what) })
}

fn parse_row(line: Option<(usize, String)>, end: usize, what: &str) -> Result<(usize, Vec<u32>)> {
    let (line, text) = line.ok_or_else(|| JobShopError::Parse { line: end, reason: format!("expected a row of {}", what) })?;
    let row = text.split_whitespace()
        .map(|s| s.parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| JobShopError::Parse { line, reason: format!("{} must be numbers", what) })?;
    Ok((line, row))
}

#[derive(Clone, Debug)]
pub struct ProblemNode {
    id: usize,
    weight: u32,
    job_id: Option<usize>,
    machine_id: Option<u32>
}

impl ProblemNode {
    /// The activity this node stands for, `None` for the source and the sink.
    pub fn activity_id(&self) -> Option<usize> {
        self.job_id.map(|_| self.id - 1)
    }
}

impl disjunctgraph::NodeId for ProblemNode {
    fn id(&self) -> usize { self.id }
}

impl disjunctgraph::GraphNode for ProblemNode {
    fn create(id: usize, weight: u32, machine_id: Option<u32>, job_id: Option<usize>) -> Self {
        ProblemNode {
            id, weight, job_id, machine_id
        }
    }
    fn weight(&self) -> u32 { self.weight }
    fn job_id(&self) -> Option<usize> { self.job_id }
    fn machine_id(&self) -> Option<u32> { self.machine_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disjunctgraph::{ Graph, LinkedGraph };

    fn malformed(result: Result<Problem>) -> bool {
        matches!(result, Err(JobShopError::MalformedInstance(_)))
    }

    #[test]
    fn reads_instance() {
        let problem = Problem::from_reader(r"2
3
0
10 8 4
8
1 2 3
2
".as_bytes()).unwrap();

        assert_eq!(3, problem.machines);
        assert_eq!(None, problem.optimal);
        assert_eq!(vec!(vec!(0, 1, 2), vec!(3)), problem.jobs);
        assert_eq!(Activity { id: 3, job_id: 1, process_time: 8, machine_id: 2 }, problem.activities[3]);
        assert_eq!(vec!(1, 2, 3), problem.used_machines());
    }

    #[test]
    fn reports_parse_errors_by_line() {
        let result = Problem::from_reader("2\n3\n0\n10 x 4\n8\n1 2 3\n2".as_bytes());
        assert!(matches!(result, Err(JobShopError::Parse { line: 4, .. })));

        let result = Problem::from_reader("2\n3\n0\n10 8 4\n8\n1 2\n2".as_bytes());
        assert!(matches!(result, Err(JobShopError::Parse { line: 6, .. })));

        let result = Problem::from_reader("2\n3\n0\n10 8 4".as_bytes());
        assert!(matches!(result, Err(JobShopError::Parse { line: 5, .. })));
    }

    #[test]
    fn rejects_job_visiting_a_machine_twice() {
        // Job 0 goes to machine 1 twice.
        assert!(malformed(Problem::from_reader(r"2
2
13
2 7 2
4 3
1 2 1
2 1".as_bytes())));
    }

    #[test]
    fn rejects_malformed_instances() {
        assert!(malformed(Problem::new(2, vec!(vec!((3, 4))))));
        assert!(malformed(Problem::new(2, vec!(vec!((0, 4))))));
        assert!(malformed(Problem::new(2, vec!(vec!((1, 0))))));
        assert!(malformed(Problem::new(2, vec!(vec!((1, 4)), vec!()))));

        let mut problem = Problem::new(2, vec!(vec!((1, 4), (2, 3)))).unwrap();
        problem.jobs[0].pop();
        assert!(matches!(problem.validate(), Err(JobShopError::MalformedInstance(_))));

        let mut problem = Problem::new(2, vec!(vec!((1, 4)), vec!((2, 3)))).unwrap();
        problem.jobs[0].push(1);
        assert!(problem.validate().is_err());
    }

    #[test]
    fn rejects_overflowing_processing_times() {
        assert!(malformed(Problem::new(2, vec!(vec!((1, 3_000_000_000), (2, 3_000_000_000))))));
        assert!(malformed(Problem::new(2, vec!(vec!((1, 1_500_000_000)), vec!((2, 1_500_000_000))))));
        assert!(malformed(Problem::new(1, vec!(vec!((1, MAX_TOTAL_PROCESSING + 1))))));

        let problem = Problem::new(2, vec!(vec!((1, 1_000_000_000), (2, MAX_TOTAL_PROCESSING - 1_000_000_000)))).unwrap();
        assert!(problem.validate().is_ok());
    }

    #[test]
    fn graph_links_jobs_between_source_and_sink() {
        let problem = Problem::new(3, vec!(vec!((1, 10), (2, 8), (3, 4)), vec!((2, 8)))).unwrap();
        let graph: LinkedGraph<ProblemNode> = problem.into_graph();

        assert_eq!(6, graph.nodes().len());
        assert!(graph.has_precedence(&0usize, &1usize));
        assert!(graph.has_precedence(&1usize, &2usize));
        assert!(graph.has_precedence(&2usize, &3usize));
        assert!(graph.has_precedence(&3usize, &5usize));
        assert!(graph.has_precedence(&0usize, &4usize));
        assert!(graph.has_precedence(&4usize, &5usize));
        assert!(!graph.has_precedence(&2usize, &4usize));
        assert_eq!(Some(1), graph[2].activity_id());
        assert_eq!(None, graph.sink().activity_id());
        assert_eq!(22, graph.critical_length());
    }
}
