use std::fmt;

use disjunctgraph::Graph;

use crate::problem::{ Activity, Problem, ProblemNode };

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledActivity {
    pub starting_time: u32,
    /// Latest start that keeps the makespan.
    pub latest_start: u32,
    pub activity: Activity
}

impl ScheduledActivity {
    pub fn finishing_time(&self) -> u32 {
        self.starting_time + self.activity.process_time
    }

    pub fn slack(&self) -> u32 {
        self.latest_start - self.starting_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Indexed by activity id.
    pub activities: Vec<ScheduledActivity>,
    /// Activity ids in processing order, machine 1 first.
    pub machines: Vec<Vec<usize>>
}

/// Explicit processing order of the activities on every machine, machine 1 first.
/// The orders together with the job routings must not contain a cycle.
pub struct OrderedActivities {
    pub problem: Problem,
    pub machines: Vec<Vec<usize>>
}

impl Schedule {
    /// Reads the schedule off a graph of `problem`. Machines without a committed sequence are left empty.
    pub fn from_graph<G: Graph<Node = ProblemNode>>(problem: &Problem, graph: &G) -> Schedule {
        let heads = graph.heads();
        let tails = graph.tails();
        let makespan = graph.critical_length();

        let activities: Vec<ScheduledActivity> = problem.activities.iter()
            .map(|activity| ScheduledActivity {
                starting_time: heads[activity.id + 1],
                latest_start: makespan - tails[activity.id + 1],
                activity: activity.clone()
            })
            .collect();

        let machines: Vec<Vec<usize>> = (1..=problem.machines)
            .map(|machine| graph.sequence(machine)
                .map(|order| order.iter().filter_map(|x| graph[*x].activity_id()).collect::<Vec<_>>())
                .unwrap_or_default())
            .collect();

        Schedule { activities, machines }
    }

    /// Makespan of the schedule.
    pub fn length(&self) -> u32 {
        self.activities.iter()
            .map(|x| x.finishing_time())
            .max()
            .unwrap_or(0)
    }

    /// Activities on the same machine don't overlap and follow their job's routing.
    pub fn is_feasible(&self, problem: &Problem) -> bool {
        let routed = problem.jobs.iter()
            .chain(self.machines.iter())
            .all(|order| order.windows(2).all(|pair| {
                self.activities[pair[0]].finishing_time() <= self.activities[pair[1]].starting_time
            }));

        let complete = self.machines.iter().enumerate().all(|(index, order)| {
            let machine = index as u32 + 1;
            order.len() == problem.activities.iter().filter(|x| x.machine_id == machine).count()
                && order.iter().all(|x| problem.activities[*x].machine_id == machine)
        });

        routed && complete
    }
}

/// One line per machine listing `J<job>[<start>-<finish>|<slack>]` in processing order.
impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, order) in self.machines.iter().enumerate() {
            write!(f, "M{:<3}", index + 1)?;
            for activity in order.iter().map(|x| &self.activities[*x]) {
                write!(f, " J{}[{}-{}|{}]", activity.activity.job_id, activity.starting_time, activity.finishing_time(), activity.slack())?;
            }
            writeln!(f)?;
        }
        write!(f, "Makespan: {}", self.length())
    }
}

impl From<OrderedActivities> for Schedule {
    fn from(ordered_activities: OrderedActivities) -> Schedule {

        // Recursive functions that calculate
        // s_i = max_{j\in P(i)} (s_j + p_j) and q_i = p_i + max_{j\in S(i)} q_j
        struct ActivityOption {
            processing_time: u32,
            precedences: Vec<usize>,
            successors: Vec<usize>
        }
        fn si(index: usize, activity_times: &mut Vec<Option<u32>>, options: &[ActivityOption]) -> u32 {
            match activity_times[index] {
                Some(e) => e,
                None => {
                    let max = options[index].precedences.iter()
                        .map(|x| si(*x, activity_times, options) + options[*x].processing_time)
                        .max()
                        .unwrap_or(0u32);

                    activity_times[index] = Some(max);
                    max
                }
            }
        }
        fn qi(index: usize, tail_times: &mut Vec<Option<u32>>, options: &[ActivityOption]) -> u32 {
            match tail_times[index] {
                Some(e) => e,
                None => {
                    let max = options[index].successors.iter()
                        .map(|x| qi(*x, tail_times, options))
                        .max()
                        .unwrap_or(0u32) + options[index].processing_time;

                    tail_times[index] = Some(max);
                    max
                }
            }
        }

        let OrderedActivities { problem, machines } = ordered_activities;
        let activities = problem.activities;

        let mut options = activities.iter()
            .map(|x| ActivityOption { processing_time: x.process_time, precedences: Vec::new(), successors: Vec::new() })
            .collect::<Vec<_>>();

        // Job routings and machine orders both chain their activities.
        for order in problem.jobs.iter().chain(machines.iter()) {
            for pair in order.windows(2) {
                options[pair[1]].precedences.push(pair[0]);
                options[pair[0]].successors.push(pair[1]);
            }
        }

        let mut activity_times = vec!(None; activities.len());
        let mut tail_times = vec!(None; activities.len());
        let starting_times = (0..activities.len())
            .map(|x| si(x, &mut activity_times, &options))
            .collect::<Vec<_>>();
        let tails = (0..activities.len())
            .map(|x| qi(x, &mut tail_times, &options))
            .collect::<Vec<_>>();
        let makespan = tails.iter().max().cloned().unwrap_or(0);

        let activities = activities.into_iter().enumerate()
            .map(|(i, activity)| ScheduledActivity {
                starting_time: starting_times[i],
                latest_start: makespan - tails[i],
                activity
            })
            .collect();

        Schedule { activities, machines }
    }
}
