//! End-to-end tests for the index build, using stub embedders.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::Document;
use crate::semantic::{
    ArtifactStorage, BuildError, Embedder, Encoder, EncoderError, EncoderOptions, IndexPipeline,
    NeighborEntry, NeighborList, EMBEDDINGS_FILE, MANIFEST_FILE, NEIGHBORS_FILE,
};
use crate::tests::{FixedEmbedder, StubEmbedder};

fn posts() -> Vec<Document> {
    vec![
        Document::new("1", "rust ownership borrowing lifetimes").with_title("Rust"),
        Document::new("2", "rust traits generics lifetimes").with_title("Rust again"),
        Document::new("3", "spring cherry blossoms walk").with_title("Spring"),
        Document::new("4", "autumn leaves walk park").with_title("Autumn"),
        Document::new("5", "cooking kimchi stew recipe").with_title("Dinner"),
        Document::new("6", "rust async tokio runtime").with_title("Async"),
    ]
}

fn pipeline(embedder: Arc<dyn Embedder>, batch_size: usize, k: usize, out: &Path) -> IndexPipeline {
    let options = EncoderOptions {
        batch_size,
        ..Default::default()
    };
    IndexPipeline::new(
        Encoder::new(embedder, options).unwrap(),
        k,
        ArtifactStorage::new(out.to_path_buf()),
    )
    .unwrap()
}

fn stored_neighbors(dir: &Path) -> BTreeMap<String, NeighborList> {
    ArtifactStorage::new(dir.to_path_buf()).load_neighbors().unwrap()
}

#[test]
fn test_run_writes_all_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("public/data");
    let report = pipeline(Arc::new(StubEmbedder::new(32)), 4, 3, &out)
        .run(&posts())
        .unwrap();

    assert_eq!(report.documents, 6);
    assert_eq!(report.dimensions, 32);
    assert_eq!(report.neighbors, 3);
    assert!(out.join(EMBEDDINGS_FILE).exists());
    assert!(out.join(NEIGHBORS_FILE).exists());
    assert!(out.join(MANIFEST_FILE).exists());

    let neighbors = stored_neighbors(&out);
    assert_eq!(neighbors.len(), 6);
    for (id, list) in &neighbors {
        assert!(list.len() <= 3);
        assert!(!list.iter().any(|e| &e.id == id));
        assert!(list.windows(2).all(|w| w[0].score >= w[1].score));
    }

    let manifest = ArtifactStorage::new(out).load_manifest().unwrap();
    assert_eq!(manifest.model, "stub");
    assert_eq!(manifest.documents, 6);
    assert_eq!(manifest.neighbors, 3);
}

#[test]
fn test_related_posts_share_words() {
    let tmp = tempfile::tempdir().unwrap();
    let built = pipeline(Arc::new(StubEmbedder::new(256)), 2, 1, tmp.path())
        .build(&posts())
        .unwrap();

    // the two "Rust ... lifetimes" posts share the most tokens
    assert_eq!(built.neighbors.get("1").unwrap()[0].id, "2");
    assert_eq!(built.neighbors.get("2").unwrap()[0].id, "1");
}

#[test]
fn test_concrete_tie_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = FixedEmbedder::new(&[
        ("a", vec![1.0, 0.0]),
        ("b", vec![1.0, 0.0]),
        ("c", vec![0.0, 1.0]),
    ]);
    let docs = vec![
        Document::new("A", "a"),
        Document::new("B", "b"),
        Document::new("C", "c"),
    ];

    pipeline(Arc::new(embedder), 2, 1, tmp.path()).run(&docs).unwrap();
    let neighbors = stored_neighbors(tmp.path());

    let entry = |id: &str, score: f32| vec![NeighborEntry { id: id.to_string(), score }];
    assert_eq!(neighbors["A"], entry("B", 1.0));
    assert_eq!(neighbors["B"], entry("A", 1.0));
    assert_eq!(neighbors["C"], entry("A", 0.0));
}

#[test]
fn test_k_exceeding_corpus_returns_all_others() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = posts();
    pipeline(Arc::new(StubEmbedder::new(16)), 8, 10, tmp.path())
        .run(&docs[..3])
        .unwrap();

    for list in stored_neighbors(tmp.path()).values() {
        assert_eq!(list.len(), 2);
    }
}

#[test]
fn test_zero_vector_document() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = FixedEmbedder::new(&[
        ("zero", vec![0.0, 0.0]),
        ("x", vec![1.0, 0.0]),
        ("y", vec![0.6, 0.8]),
    ]);
    let docs = vec![
        Document::new("Z", "zero"),
        Document::new("X", "x"),
        Document::new("Y", "y"),
    ];

    let built = pipeline(Arc::new(embedder), 3, 5, tmp.path()).build(&docs).unwrap();

    let z = built.neighbors.get("Z").unwrap();
    assert_eq!(z.len(), 2);
    assert!(z.iter().all(|e| e.score == 0.0));

    // still a candidate for the others, ranked last
    let x = built.neighbors.get("X").unwrap();
    assert_eq!(x.last().unwrap().id, "Z");
    assert_eq!(x.last().unwrap().score, 0.0);
}

#[test]
fn test_rebuild_is_byte_identical() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    pipeline(Arc::new(StubEmbedder::new(32)), 4, 3, first.path())
        .run(&posts())
        .unwrap();
    pipeline(Arc::new(StubEmbedder::new(32)), 4, 3, second.path())
        .run(&posts())
        .unwrap();

    for file in [EMBEDDINGS_FILE, NEIGHBORS_FILE] {
        let a = std::fs::read(first.path().join(file)).unwrap();
        let b = std::fs::read(second.path().join(file)).unwrap();
        assert_eq!(a, b, "{} differs between runs", file);
    }
}

#[test]
fn test_batch_size_does_not_change_result() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = posts();

    let single = pipeline(Arc::new(StubEmbedder::new(32)), docs.len(), 4, tmp.path())
        .build(&docs)
        .unwrap();
    let singletons = pipeline(Arc::new(StubEmbedder::new(32)), 1, 4, tmp.path())
        .build(&docs)
        .unwrap();

    assert_eq!(single.neighbors, singletons.neighbors);
    for ((_, a), (_, b)) in single.vectors.iter().zip(singletons.vectors.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn test_failed_batch_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let embedder = StubEmbedder::new(16).failing_on("kimchi");

    let result = pipeline(Arc::new(embedder), 2, 3, &out).run(&posts());

    assert!(matches!(
        result,
        Err(BuildError::Encoder(EncoderError::Batch { offset: 4, .. }))
    ));
    assert!(!out.exists());
}

#[test]
fn test_empty_corpus_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");

    let result = pipeline(Arc::new(StubEmbedder::new(8)), 4, 3, &out).run(&[]);
    assert!(matches!(result, Err(BuildError::EmptyCorpus)));
    assert!(!out.exists());
}

#[test]
fn test_single_document_has_no_neighbors() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = vec![Document::new("only", "lonely post")];

    pipeline(Arc::new(StubEmbedder::new(8)), 4, 10, tmp.path())
        .run(&docs)
        .unwrap();

    let neighbors = stored_neighbors(tmp.path());
    assert_eq!(neighbors.len(), 1);
    assert!(neighbors["only"].is_empty());
}

#[test]
fn test_blank_document_fails_build() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = vec![Document::new("a", "text"), Document::new("b", "  ")];

    let result = pipeline(Arc::new(StubEmbedder::new(8)), 4, 3, tmp.path()).build(&docs);
    assert!(matches!(result, Err(BuildError::EmptyDocument(id)) if id == "b"));
}

#[test]
fn test_duplicate_ids_fail_build() {
    let tmp = tempfile::tempdir().unwrap();
    let docs = vec![Document::new("a", "one"), Document::new("a", "two")];

    let result = pipeline(Arc::new(StubEmbedder::new(8)), 4, 3, tmp.path()).build(&docs);
    assert!(matches!(result, Err(BuildError::Index(_))));
}

#[test]
fn test_from_config_rejects_zero_neighbors() {
    let config = Config {
        neighbors: 0,
        ..Default::default()
    };
    let result = IndexPipeline::from_config(&config, Arc::new(StubEmbedder::new(8)));
    assert!(matches!(result, Err(BuildError::Configuration(_))));
}

#[test]
fn test_from_config_uses_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        output_dir: tmp.path().join("data"),
        neighbors: 2,
        batch_size: 3,
        ..Default::default()
    };

    let pipeline = IndexPipeline::from_config(&config, Arc::new(StubEmbedder::new(8))).unwrap();
    assert_eq!(pipeline.output_dir(), tmp.path().join("data"));

    pipeline.run(&posts()).unwrap();
    let neighbors = stored_neighbors(&tmp.path().join("data"));
    assert!(neighbors.values().all(|list| list.len() == 2));
}

#[test]
#[ignore = "requires model download (~470MB)"]
fn test_multilingual_model_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let model = crate::semantic::EmbeddingModel::new(
        "paraphrase-multilingual-minilm-l12-v2",
        tmp.path().to_path_buf(),
        None,
    )
    .expect("Failed to initialize embedding model");

    let docs = vec![
        Document::new("ml", "Introduction to machine learning and neural networks"),
        Document::new("ko-ml", "머신러닝과 인공지능 입문"),
        Document::new("cake", "Best recipes for chocolate cake baking"),
    ];

    let built = pipeline(Arc::new(model), 2, 1, &tmp.path().join("out"))
        .build(&docs)
        .unwrap();

    assert_eq!(built.vectors.dimensions(), 384);
    assert_eq!(built.neighbors.get("ml").unwrap()[0].id, "ko-ml");
}
