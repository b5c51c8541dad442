//! Preemptive earliest due date relaxation of `1|r_j|L_max`.
//!
//! The committed prefix runs first, back to back in the given order and without interruption.
//! The remaining jobs are released at `max(r_j, end of prefix)` and dispatched by earliest due
//! date, a newly released job interrupting the running one when its due date is strictly earlier.
//! The maximum lateness of that schedule is the optimum of the relaxed problem and therefore a
//! lower bound for every non-preemptive sequence starting with the prefix. When nothing got
//! interrupted the relaxed schedule is itself such a sequence, and an optimal one.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::JobTiming;

/// Priority tier of an event: committed jobs by position in the prefix, all before free jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Committed(usize),
    Free,
}

/// A completion is handled before a release at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    Finish,
    Release,
}

// Field order is the event order: rank, time, kind, due date, job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Event {
    rank: Rank,
    time: u32,
    kind: EventKind,
    due: u32,
    job: usize,
}

#[derive(Debug, Clone, Copy)]
struct Running {
    job: usize,
    started: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerBound {
    /// Maximum lateness of the relaxed schedule, negative lateness counts as 0.
    pub max_lateness: u32,
    /// A free job was interrupted after it had made progress.
    pub preempted: bool,
    /// Indices of the jobs in order of completion.
    pub sequence: Vec<usize>,
    /// Completion time of the last prefix job, 0 for an empty prefix.
    pub prefix_finish: u32,
    /// Completion time of the last job.
    pub makespan: u32,
}

/// Relaxed lower bound for all sequences of `jobs` that start with `prefix` (indices into `jobs`).
pub fn lower_bound(jobs: &[JobTiming], prefix: &[usize]) -> LowerBound {
    let mut rank = vec!(Rank::Free; jobs.len());
    for (position, job) in prefix.iter().enumerate() {
        rank[*job] = Rank::Committed(position);
    }

    let mut events: BinaryHeap<Reverse<Event>> = jobs.iter().enumerate()
        .map(|(job, timing)| Reverse(Event {
            rank: rank[job],
            time: timing.release,
            kind: EventKind::Release,
            due: timing.due,
            job
        }))
        .collect();

    let mut remaining = jobs.iter().map(|x| x.processing).collect::<Vec<_>>();
    let mut ready: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::with_capacity(jobs.len());
    let mut running: Option<Running> = None;

    let mut clock = 0u32;
    let mut max_lateness = 0u32;
    let mut preempted = false;
    let mut prefix_finish = 0u32;
    let mut sequence = Vec::with_capacity(jobs.len());

    let finish_event = |job: usize, started: u32, remaining: u32| Reverse(Event {
        rank: Rank::Free,
        time: started + remaining,
        kind: EventKind::Finish,
        due: jobs[job].due,
        job
    });

    while let Some(Reverse(event)) = events.pop() {
        match (event.rank, event.kind) {
            (Rank::Committed(_), _) => {
                clock = clock.max(event.time) + remaining[event.job];
                remaining[event.job] = 0;
                max_lateness = max_lateness.max(clock.saturating_sub(event.due));
                sequence.push(event.job);
                prefix_finish = clock;
            },
            (Rank::Free, EventKind::Release) => {
                clock = clock.max(event.time);
                match running {
                    None => {
                        running = Some(Running { job: event.job, started: clock });
                        events.push(finish_event(event.job, clock, remaining[event.job]));
                    },
                    Some(current) if event.due < jobs[current.job].due => {
                        // An interruption without progress just hands the machine over
                        if clock > current.started {
                            preempted = true;
                        }
                        remaining[current.job] -= clock - current.started;
                        ready.push(Reverse((jobs[current.job].due, current.job)));
                        running = Some(Running { job: event.job, started: clock });
                        events.push(finish_event(event.job, clock, remaining[event.job]));
                    },
                    Some(_) => ready.push(Reverse((event.due, event.job))),
                }
            },
            (Rank::Free, EventKind::Finish) => {
                let current = match running {
                    Some(current) if current.job == event.job
                        && current.started + remaining[current.job] == event.time => current,
                    _ => continue, // superseded by a preemption
                };

                clock = event.time;
                remaining[current.job] = 0;
                max_lateness = max_lateness.max(clock.saturating_sub(event.due));
                sequence.push(current.job);

                running = ready.pop().map(|Reverse((_, job))| Running { job, started: clock });
                if let Some(next) = running {
                    events.push(finish_event(next.job, clock, remaining[next.job]));
                }
            },
        }
    }

    LowerBound { max_lateness, preempted, sequence, prefix_finish, makespan: clock }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use rand::{ Rng, SeedableRng };
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    fn timing(job: usize, processing: u32, release: u32, due: u32) -> JobTiming {
        JobTiming { job, operation: job, processing, release, due }
    }

    /// Best non-preemptive maximum lateness over all sequences starting with `prefix`.
    fn brute_force(jobs: &[JobTiming], prefix: &[usize]) -> u32 {
        let free = (0..jobs.len()).filter(|x| !prefix.contains(x)).collect::<Vec<_>>();
        let count = free.len();
        free.into_iter()
            .permutations(count)
            .map(|rest| {
                let mut time = 0;
                let mut lateness = 0;
                for job in prefix.iter().chain(rest.iter()) {
                    time = time.max(jobs[*job].release) + jobs[*job].processing;
                    lateness = lateness.max(time.saturating_sub(jobs[*job].due));
                }
                lateness
            })
            .min()
            .unwrap_or(0)
    }

    #[test]
    fn prefix_runs_back_to_back() {
        let jobs = vec!(timing(0, 4, 0, 8), timing(1, 2, 1, 12), timing(2, 6, 3, 11), timing(3, 5, 5, 10));
        let bound = lower_bound(&jobs, &[2, 0]);

        // Job 2 waits for its release at 3, job 0 follows at 9 although it was available first.
        assert_eq!(13, bound.prefix_finish);
        assert_eq!(&[2, 0], &bound.sequence[..2]);
        // Free jobs start after the prefix: 3 (due 10) then 1, no interruption.
        assert_eq!(vec!(2, 0, 3, 1), bound.sequence);
        assert!(!bound.preempted);
        assert_eq!(20, bound.makespan);
        assert_eq!(8, bound.max_lateness);
    }

    #[test]
    fn free_jobs_preempt_by_due_date() {
        let jobs = vec!(timing(0, 10, 0, 100), timing(1, 2, 3, 6));
        let bound = lower_bound(&jobs, &[]);

        assert!(bound.preempted);
        assert_eq!(vec!(1, 0), bound.sequence);
        assert_eq!(0, bound.max_lateness);
        assert_eq!(12, bound.makespan);
    }

    #[test]
    fn handover_at_start_is_not_a_preemption() {
        // Both jobs become available when the prefix completes.
        let jobs = vec!(timing(0, 5, 0, 5), timing(1, 3, 0, 30), timing(2, 3, 2, 9));
        let bound = lower_bound(&jobs, &[0]);

        assert!(!bound.preempted);
        assert_eq!(vec!(0, 2, 1), bound.sequence);
        assert_eq!(5, bound.prefix_finish);
        assert_eq!(0, bound.max_lateness);
    }

    #[test]
    fn full_prefix_is_evaluated_exactly() {
        let jobs = vec!(timing(0, 8, 10, 18), timing(1, 8, 0, 22));
        let bound = lower_bound(&jobs, &[0, 1]);

        assert!(!bound.preempted);
        assert_eq!(26, bound.makespan);
        assert_eq!(4, bound.max_lateness);
    }

    #[test]
    fn lower_bound_is_sound() {
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..300 {
            let n = rng.gen_range(1..=6);
            let jobs = (0..n)
                .map(|job| timing(job, rng.gen_range(1..10), rng.gen_range(0..20), rng.gen_range(1..40)))
                .collect::<Vec<_>>();
            let mut prefix = (0..n).collect::<Vec<_>>();
            prefix.shuffle(&mut rng);
            prefix.truncate(rng.gen_range(0..=n));

            let bound = lower_bound(&jobs, &prefix);
            let best = brute_force(&jobs, &prefix);
            assert!(bound.max_lateness <= best, "{:?} with prefix {:?}", jobs, prefix);
            if !bound.preempted {
                assert_eq!(best, bound.max_lateness, "{:?} with prefix {:?}", jobs, prefix);
            }
        }
    }
}
