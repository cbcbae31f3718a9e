//! Integration tests for cold item inference.

use coldvec::storage::npy;
use coldvec::{load_jobs, Config, EmbeddingSet, Job, Orchestrator};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const VOCAB: usize = 50;
const DIM: usize = 8;

/// Row 1 spans axis 0 alone; every other token lies on axes 1..8.
fn create_context() -> Array2<f32> {
    Array2::from_shape_fn((VOCAB, DIM), |(r, c)| {
        let axis = if r == 1 { 0 } else { 1 + r % 7 };
        if c == axis {
            1.0
        } else {
            0.0
        }
    })
}

/// Writes the model files and returns (context path, weights path).
fn write_model(dir: &Path) -> (PathBuf, PathBuf) {
    let context_path = dir.join("word_out.npy");
    let weights_path = dir.join("word_count.npy");
    npy::write_matrix(&context_path, &create_context()).unwrap();
    npy::write_vector(&weights_path, &vec![1.0; VOCAB]).unwrap();
    (context_path, weights_path)
}

fn test_config(num_workers: usize) -> Config {
    let mut config = Config::default();
    config.estimator.num_iters = 10;
    config.estimator.num_negatives = 5;
    config.estimator.neg_table_size = 1000;
    config.estimator.seed = Some(42);
    config.pool.num_workers = num_workers;
    config.pool.max_word_num = 5;
    config.pool.dequeue_timeout_ms = 20;
    config.pool.progress_interval_ms = 50;
    config
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[test]
fn test_end_to_end_inference() {
    let dir = tempdir().unwrap();
    let (context_path, weights_path) = write_model(dir.path());

    let input_path = dir.path().join("items.tsv");
    fs::write(
        &input_path,
        "A\t1,2,3\n\
         B\t\\N\n\
         \t1,2\n\
         C\t\"4,5\"\n\
         TOO_LONG\t1,2,3,4,5,6\n\
         D\t7\n",
    )
    .unwrap();

    let config = test_config(3);
    let jobs = load_jobs(&input_path, &config.input).unwrap();
    assert_eq!(jobs.len(), 4);

    let orchestrator = Orchestrator::load(&context_path, &weights_path, config).unwrap();
    let output = orchestrator.run(jobs).unwrap();

    assert_eq!(output.stats.submitted, 4);
    assert_eq!(output.stats.completed, 3);
    assert_eq!(output.stats.skipped, 1);
    assert_eq!(output.stats.failed, 0);

    let prefix = dir.path().join("result").join("embed");
    output.embeddings.save(&prefix).unwrap();
    assert!(EmbeddingSet::matrix_path(&prefix).exists());
    assert!(EmbeddingSet::index_path(&prefix).exists());

    let loaded = EmbeddingSet::load(&prefix).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.dim(), DIM);
    for id in ["A", "C", "D"] {
        assert!(loaded.index_of(id).is_some(), "missing {}", id);
    }
    assert!(loaded.index_of("B").is_none());
    assert!(loaded.index_of("TOO_LONG").is_none());

    // Rows and index agree.
    let matrix = npy::read_matrix(EmbeddingSet::matrix_path(&prefix)).unwrap();
    assert_eq!(matrix.dim(), (3, DIM));
    for id in loaded.ids() {
        let row = loaded.index_of(id).unwrap();
        assert_eq!(matrix.row(row).to_vec(), loaded.get(id).unwrap().to_vec());
    }

    // The fitted vector points toward its first positive token.
    let row1: Vec<f32> = create_context().row(1).to_vec();
    let a = loaded.get("A").unwrap();
    assert!(cosine(a, &row1) > cosine(&[0.0; DIM], &row1));
}

#[test]
fn test_duplicate_ids_yield_one_row() {
    let dir = tempdir().unwrap();
    let (context_path, weights_path) = write_model(dir.path());

    let orchestrator = Orchestrator::load(&context_path, &weights_path, test_config(2)).unwrap();
    let jobs = vec![
        Job::new("same", vec![1, 2]),
        Job::new("other", vec![3]),
        Job::new("same", vec![4, 5]),
    ];

    let output = orchestrator.run(jobs).unwrap();

    assert_eq!(output.embeddings.len(), 2);
    assert_eq!(output.stats.duplicates, 1);
    assert_eq!(
        output
            .embeddings
            .ids()
            .iter()
            .filter(|id| id.as_str() == "same")
            .count(),
        1
    );
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let dir = tempdir().unwrap();
    let (context_path, weights_path) = write_model(dir.path());
    let jobs = vec![Job::new("x", vec![1, 2, 3]), Job::new("y", vec![10, 20])];

    let run = |jobs: Vec<Job>| {
        Orchestrator::load(&context_path, &weights_path, test_config(1))
            .unwrap()
            .run(jobs)
            .unwrap()
            .embeddings
    };

    let first = run(jobs.clone());
    let second = run(jobs);
    assert_eq!(first.get("x"), second.get("x"));
    assert_eq!(first.get("y"), second.get("y"));
}

#[test]
fn test_out_of_range_item_is_isolated() {
    let dir = tempdir().unwrap();
    let (context_path, weights_path) = write_model(dir.path());

    let orchestrator = Orchestrator::load(&context_path, &weights_path, test_config(2)).unwrap();
    let output = orchestrator
        .run(vec![Job::new("good", vec![1]), Job::new("bad", vec![VOCAB])])
        .unwrap();

    assert_eq!(output.stats.failed, 1);
    assert_eq!(output.embeddings.ids(), &["good".to_string()]);
}

#[test]
fn test_mismatched_model_files_rejected() {
    let dir = tempdir().unwrap();
    let context_path = dir.path().join("word_out.npy");
    let weights_path = dir.path().join("word_count.npy");
    npy::write_matrix(&context_path, &create_context()).unwrap();
    npy::write_vector(&weights_path, &[1.0; 10]).unwrap();

    assert!(Orchestrator::load(&context_path, &weights_path, test_config(1)).is_err());
}

#[test]
fn test_config_file_drives_run() {
    let dir = tempdir().unwrap();
    let (context_path, weights_path) = write_model(dir.path());

    let config_path = dir.path().join("config.json");
    let mut config = test_config(1);
    config.pool.max_word_num = 1;
    config.save(&config_path).unwrap();

    let loaded = Config::load(&config_path).unwrap();
    let orchestrator = Orchestrator::load(&context_path, &weights_path, loaded).unwrap();
    let output = orchestrator
        .run(vec![Job::new("one", vec![1]), Job::new("two", vec![1, 2])])
        .unwrap();

    assert_eq!(output.embeddings.ids(), &["one".to_string()]);
    assert_eq!(output.stats.skipped, 1);
}
