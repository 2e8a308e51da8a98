//! Parallel independence: completion order never changes the observed
//! score set, and N workers give roughly N-fold throughput.
use std::collections::BTreeSet;
use std::time::Instant;
use sweepx_cli::core::params::Params;
use sweepx_cli::core::parallel::{Task, WorkerPool};

fn sleepy_task(index: usize) -> Task {
    // Randomised short sleep so completions interleave across workers.
    Task::new(
        vec![format!("sleep 0.1$((RANDOM % 5)); echo {}", index)],
        Params::new(),
        None,
        None,
    )
}

#[tokio::test]
async fn test_sixteen_tasks_on_four_workers_run_concurrently() {
    let started = Instant::now();
    let mut pool = WorkerPool::new(4);
    for index in 0..16 {
        pool.submit(sleepy_task(index)).unwrap();
    }
    pool.end();

    let mut scores = BTreeSet::new();
    while let Some(task) = pool.next_finished().await {
        let score = task.score.expect("score") as usize;
        assert!(scores.insert(score), "score {} observed twice", score);
    }
    assert_eq!(scores, (0..16).collect::<BTreeSet<_>>());

    // Sixteen ~0.1-0.14s sleeps serially would take over 1.6s; four
    // workers should land well under half of that.
    let elapsed = started.elapsed().as_secs_f64();
    assert!(elapsed < 1.4, "expected parallel speedup, took {:.2}s", elapsed);
}

#[tokio::test]
async fn test_first_empty_queue_wins_submission() {
    let mut pool = WorkerPool::new(3);
    // With fewer tasks than workers every queue stays empty at submit
    // time, so all of them run immediately and independently.
    let started = Instant::now();
    for index in 0..3 {
        pool.submit(Task::new(
            vec![format!("sleep 0.3; echo {}", index)],
            Params::new(),
            None,
            None,
        ))
        .unwrap();
    }
    pool.end();

    let mut seen = 0;
    while let Some(task) = pool.next_finished().await {
        assert!(task.succeeded());
        seen += 1;
    }
    assert_eq!(seen, 3);
    let elapsed = started.elapsed().as_secs_f64();
    assert!(elapsed < 0.8, "three sleeps should overlap, took {:.2}s", elapsed);
}
