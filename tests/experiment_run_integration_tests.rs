//! End-to-end scheduler runs through the library API, with real shell
//! commands on a real worker pool.
use sweepx_cli::commands::run_command::run_tree;
use sweepx_cli::config::Experiment;
use sweepx_cli::core::params::ParamValue;
use sweepx_cli::core::tree::TreeNode;

async fn run(yaml: &str, workers: usize) -> (TreeNode, usize, usize) {
    let experiment = Experiment::from_yaml(yaml).expect("valid experiment");
    let mut root = TreeNode::from_template(&experiment.root, None).expect("tree");
    let outcome = run_tree(&mut root, &experiment.fixed, workers, None)
        .await
        .expect("run");
    (root, outcome.finished, outcome.errored)
}

#[tokio::test]
async fn test_single_axis_comparison_repeat_three() {
    let (root, finished, errored) = run(
        r#"
experiment:
  name: single-axis
  comparison:
    params: {a: [1, 2, 3]}
    commands: ["echo ${a}"]
    repeat: 3
"#,
        2,
    )
    .await;

    assert_eq!(finished, 9);
    assert_eq!(errored, 0);
    // Each axis value scored exactly three times.
    for value in [1.0, 2.0, 3.0] {
        let count = root
            .finished_tasks()
            .iter()
            .filter(|t| t.score == Some(value))
            .count();
        assert_eq!(count, 3, "score {} seen {} times", value, count);
    }
}

#[tokio::test]
async fn test_cartesian_product_combinations_each_repeated() {
    let (root, finished, _) = run(
        r#"
experiment:
  name: product
  comparison:
    params:
      a: [1, 2]
      b: [10, 20]
    commands: ["echo $(( ${a} * ${b} ))"]
    repeat: 2
"#,
        4,
    )
    .await;

    assert_eq!(finished, 8);
    for product in [10.0, 20.0, 40.0] {
        assert!(
            root.finished_tasks()
                .iter()
                .any(|t| t.score == Some(product)),
            "missing product {}",
            product
        );
    }
    // a=2, b=10 and a=1, b=20 both score 20; four tasks in total.
    let twenties = root
        .finished_tasks()
        .iter()
        .filter(|t| t.score == Some(20.0))
        .count();
    assert_eq!(twenties, 4);
}

#[tokio::test]
async fn test_grid_search_optimisation_stays_in_user_coordinates() {
    let (root, finished, errored) = run(
        r#"
experiment:
  name: grid
  optimised:
    optimiser: GridSearch
    opt_params: {gridRes: 5}
    params:
      x: "linear(0, 1)"
      y: "logscale(1, 100)"
    commands: ["echo ${y}"]
"#,
        2,
    )
    .await;

    assert_eq!(finished, 25);
    assert_eq!(errored, 0);
    let TreeNode::Optimised(node) = &root else {
        panic!("expected optimised root");
    };
    // Scores equal y, so the best y is the upper bound, reported in user
    // coordinates rather than log space.
    let best = node.best_params();
    let y = best["y"].as_number().expect("numeric y");
    assert!((y - 100.0).abs() < 1e-6, "best y {} not in user scale", y);
    let score = node.best_score().expect("best score");
    assert!((score - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_nested_comparison_over_optimisation() {
    let (root, finished, errored) = run(
        r#"
experiment:
  name: nested
  comparison:
    params: {method: [methodA, methodB]}
    repeat: 2
    optimised:
      optimiser: GridSearch
      opt_params: {gridRes: 4}
      params:
        u: "linear(0.1, 2.0)"
      commands: ["echo ${method} >/dev/null; echo ${u}"]
"#,
        3,
    )
    .await;

    // Two independent 4-point searches, then each best repeated twice.
    assert_eq!(finished, 12);
    assert_eq!(errored, 0);
    assert_eq!(root.finished_tasks().len(), 4);
    for task in root.finished_tasks() {
        let u = task.params["u"].as_number().expect("numeric u");
        assert!((u - 2.0).abs() < 1e-9, "repeat task used u {}", u);
        assert!(task.params.contains_key("method"));
    }
}

#[tokio::test]
async fn test_threaded_backend_drives_real_commands() {
    let (root, finished, errored) = run(
        r#"
experiment:
  name: swarm
  optimised:
    optimiser: ParticleSwarm
    opt_params: {n_iterations: 12, seed: 5}
    params:
      x: "linear(0, 1)"
    commands: ["echo ${x}"]
"#,
        2,
    )
    .await;

    assert_eq!(finished, 12);
    assert_eq!(errored, 0);
    let TreeNode::Optimised(node) = &root else {
        panic!("expected optimised root");
    };
    let best = node.best_score().expect("best score");
    assert!((0.0..=1.0).contains(&best));
}

#[tokio::test]
async fn test_fixed_params_reach_every_command() {
    let (root, finished, _) = run(
        r#"
experiment:
  name: fixed
  fixed: {offset: 100}
  comparison:
    params: {a: [1, 2]}
    commands: ["echo $(( ${offset} + ${a} ))"]
"#,
        2,
    )
    .await;

    assert_eq!(finished, 2);
    let mut scores: Vec<f64> = root
        .finished_tasks()
        .iter()
        .filter_map(|t| t.score)
        .collect();
    scores.sort_by(f64::total_cmp);
    assert_eq!(scores, vec![101.0, 102.0]);
}

#[tokio::test]
async fn test_errored_tasks_do_not_stall_the_run() {
    let (root, finished, errored) = run(
        r#"
experiment:
  name: flaky
  comparison:
    params: {a: [1, 2, 3]}
    commands: ["test ${a} -ne 2 && echo ${a}"]
"#,
        2,
    )
    .await;

    assert_eq!(finished, 3);
    assert_eq!(errored, 1);
    let scored = root
        .finished_tasks()
        .iter()
        .filter(|t| t.succeeded())
        .count();
    assert_eq!(scored, 2);
}
