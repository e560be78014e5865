//! End-to-end regression tests for pixelforest-rf.
//!
//! These train on procedurally rendered depth scenes and check that accuracy,
//! determinism and persistence do not regress.

use std::thread;

use tempfile::TempDir;

use pixelforest_rf::{
    COORDINATOR_RANK, Coordinator, Evaluation, Forest, FrameSet, PixelRef,
    ToCoordinator, ToWorker, TrainConfig, TrainSet, Worker, channel_pair, evaluate, scene,
    synthetic_scene,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn training_frames() -> FrameSet {
    let frames = (1..=4).map(|seed| synthetic_scene(48, 36, seed)).collect();
    FrameSet::new(frames, 400).with_background(true)
}

fn held_out_frames() -> FrameSet {
    FrameSet::new(vec![synthetic_scene(48, 36, 99)], 1).with_background(true)
}

fn scene_config() -> TrainConfig {
    TrainConfig::new(6)
        .unwrap()
        .with_candidates_per_node(200)
        .with_max_depth(12)
        .with_min_samples_per_node(4)
        .with_offset_range(-40..=40)
        .with_threshold_range(-2.5..=2.5)
        .with_seed(17)
}

/// Error rate of always predicting the most frequent label of `set`.
fn majority_error(set: &FrameSet) -> f64 {
    let mut counts = [0usize; scene::LABEL_COUNT];
    let mut cursor = set.iter();
    while let Some((_, label)) = cursor.value() {
        counts[label.index()] += 1;
        cursor.next();
    }
    let total: usize = counts.iter().sum();
    let majority = counts.iter().copied().max().unwrap_or(0);
    1.0 - majority as f64 / total as f64
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------

/// A forest trained on four scenes must beat the majority baseline on a fifth.
#[test]
fn held_out_scene_beats_majority_baseline() {
    let forest = Forest::train::<PixelRef>(&mut training_frames(), None, &scene_config()).unwrap();
    let test = held_out_frames();
    let error = evaluate(&forest, &test).unwrap();
    let baseline = majority_error(&test);
    assert!(
        error < baseline - 0.05,
        "forest error {error:.3} does not beat majority baseline {baseline:.3}"
    );
}

#[test]
fn report_agrees_with_plain_error_rate() {
    let forest = Forest::train::<PixelRef>(&mut training_frames(), None, &scene_config()).unwrap();
    let test = held_out_frames();
    let report = Evaluation::new().run(&forest, &test).unwrap();
    assert_eq!(report.n_evaluated, 48 * 36);
    assert!((report.error_rate - evaluate(&forest, &test).unwrap()).abs() < 1e-12);
    assert_eq!(report.confusion.label_count(), scene::LABEL_COUNT);

    let objects_only = Evaluation::new()
        .with_skip_background(true)
        .run(&forest, &test)
        .unwrap();
    assert_eq!(objects_only.n_evaluated + objects_only.n_skipped, 48 * 36);
    assert!(objects_only.n_skipped > 0);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn training_is_reproducible() {
    let a = Forest::train::<PixelRef>(&mut training_frames(), None, &scene_config()).unwrap();
    let b = Forest::train::<PixelRef>(&mut training_frames(), None, &scene_config()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn parallel_subtrees_do_not_change_the_forest() {
    let config = scene_config().with_number_of_trees(2).with_search_threads(3);
    let sequential = Forest::train::<PixelRef>(&mut training_frames(), None, &config).unwrap();
    let parallel = Forest::train::<PixelRef>(
        &mut training_frames(),
        None,
        &config.clone().with_parallel_subtrees(true),
    )
    .unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn distributed_training_matches_local_layout() {
    // 1 coordinator + 2 workers, 2 threads each: the same 6 search streams
    // as a local build with 6 threads.
    let config = scene_config()
        .with_number_of_trees(2)
        .with_candidates_per_node(120)
        .with_search_threads(2);
    let mut links = Vec::new();
    let mut handles = Vec::new();
    for rank in 1..=2 {
        let (coordinator_end, worker_end) =
            channel_pair::<ToWorker, ToCoordinator>(COORDINATOR_RANK, rank);
        links.push(coordinator_end);
        let worker_config = config.clone();
        handles.push(thread::spawn(move || {
            Worker::<PixelRef, _, _>::new(rank, 3, &worker_config, training_frames(), worker_end)
                .unwrap()
                .run()
                .unwrap()
        }));
    }
    let distributed = Coordinator::new(&config, links)
        .unwrap()
        .train::<PixelRef>(&mut training_frames())
        .unwrap();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
    let local = Forest::train::<PixelRef>(
        &mut training_frames(),
        None,
        &config.clone().with_search_threads(6),
    )
    .unwrap();
    assert_eq!(distributed, local);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn persisted_forest_classifies_identically() {
    let forest = Forest::train::<PixelRef>(&mut training_frames(), None, &scene_config()).unwrap();
    let dir = TempDir::new().unwrap();
    let trees = dir.path().join("trees");
    let snapshot = dir.path().join("forest.bin");
    forest.write_dir(&trees).unwrap();
    forest.save(&snapshot).unwrap();

    let from_dir = Forest::load_dir(forest.n_trees(), forest.label_count(), &trees).unwrap();
    let from_snapshot = Forest::load(&snapshot).unwrap();

    let probes = held_out_frames();
    let mut cursor = probes.iter();
    while let Some((pixel, _)) = cursor.value() {
        let expected = forest.classify(&pixel);
        assert_eq!(from_dir.classify(&pixel), expected);
        assert_eq!(from_snapshot.classify(&pixel), expected);
        cursor.next();
    }
}
