
use disjunctgraph::Graph;

use crate::config::SolverConfig;
use crate::problem::{ Problem, ProblemSolver };
use crate::schedule::{ OrderedActivities, Schedule };
use crate::shifting_bottleneck::ShiftingBottleneck;

#[test]
fn test_shifting_bottleneck_small() {
    let problem = small_problem();
    let solution = ShiftingBottleneck::new(SolverConfig::default()).solve(&problem).unwrap();

    let schedule = Schedule::from_graph(&problem, &solution.graph);
    println!("{}", schedule);
    assert!(!solution.graph.is_cyclic());
    assert!(schedule.is_feasible(&problem));
    assert_eq!(Some(13), problem.optimal);
    assert_eq!(13, solution.makespan);
    assert_eq!(13, schedule.length());
}

#[test]
fn test_shifting_bottleneck_big() {
    let problem = big_problem();
    let solution = ShiftingBottleneck::new(SolverConfig::default()).solve(&problem).unwrap();

    let schedule = Schedule::from_graph(&problem, &solution.graph);
    println!("{}", schedule);
    assert!(schedule.is_feasible(&problem));
    assert_eq!(5, solution.steps.len());
    assert_eq!(593, solution.makespan);
    assert_eq!(solution.makespan, solution.graph.critical_length());
}

#[test]
fn graph_and_machine_orders_agree() {
    let problem = big_problem();
    let solution = ShiftingBottleneck::new(SolverConfig { node_budget: None, parallel: false }).solve(&problem).unwrap();

    let from_graph = Schedule::from_graph(&problem, &solution.graph);
    let from_orders: Schedule = OrderedActivities {
        problem: problem.clone(),
        machines: from_graph.machines.clone()
    }.into();

    assert_eq!(from_graph, from_orders);
    assert!(from_graph.activities.iter().all(|x| x.starting_time <= x.latest_start));
}

#[test]
fn test_unknown_machine_is_rejected() {
    let problem = Problem::from_reader(r"2
2
0
2 7
4
1 3
2".as_bytes());
    assert!(problem.is_err());
}

fn small_problem() -> Problem {
    Problem::from_reader(r"3
3
13
3 2 3
3 4
6 3 2
1 2 3
3 2
2 1 3".as_bytes()).unwrap()
}

/// Lawrence LA05.
fn big_problem() -> Problem {
    Problem::from_reader(r"10
5
593
72 87 95 66 60
5 35 48 39 54
46 20 21 97 55
59 19 46 34 37
23 73 25 24 28
28 45 5 78 83
53 71 37 29 12
12 87 33 55 38
49 83 40 48 7
65 17 90 27 23
2 1 5 3 4
5 4 1 3 2
2 4 3 1 5
1 4 5 2 3
5 3 4 2 1
4 1 5 2 3
1 4 2 5 3
5 3 4 2 1
3 4 2 1 5
3 4 1 5 2
".as_bytes()).unwrap()
}
