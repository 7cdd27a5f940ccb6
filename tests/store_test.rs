mod helpers;

use grokker::db::CODE_VERSION;
use grokker::knowledge::Grokker;
use grokker::GrokError;
use helpers::TestKb;

#[test]
fn save_and_load_round_trip() {
    let kb = TestKb::new();
    kb.write("a.md", "the cat\n\nthe dog");
    kb.write("b.md", "a fish");
    let mut grok = kb.init();
    grok.add_document(kb.path("a.md")).unwrap();
    grok.add_document(kb.path("b.md")).unwrap();
    grok.set_model("gpt-4").unwrap();
    grok.save().unwrap();

    let loaded = kb.load();
    assert_eq!(loaded.documents(), grok.documents());
    assert_eq!(loaded.model().name, "gpt-4");
    assert_eq!(loaded.store_version(), CODE_VERSION);
    assert_eq!(loaded.chunks().len(), grok.chunks().len());
    for (a, b) in loaded.chunks().chunks().iter().zip(grok.chunks().chunks()) {
        assert_eq!(a.key(), b.key());
        assert_eq!((a.offset, a.length), (b.offset, b.length));
        assert_eq!(a.embedding, b.embedding);
        assert!(!a.is_stale());
        assert!(a.text().is_empty(), "chunk text is never persisted");
    }
}

#[test]
fn save_leaves_no_temp_file() {
    let kb = TestKb::new();
    let grok = kb.init();
    grok.save().unwrap();
    assert!(kb.path(".grok").is_file());
    assert!(!kb.path(".grok.tmp").exists());
}

#[test]
fn init_refuses_existing_store() {
    let kb = TestKb::new();
    let _grok = kb.init();
    let err = Grokker::init(kb.root(), "", kb.runtime()).err().unwrap();
    assert!(matches!(err, GrokError::StoreExists(_)));
}

#[test]
fn init_rejects_unknown_model() {
    let kb = TestKb::new();
    let err = Grokker::init(kb.root(), "gpt-9000", kb.runtime()).err().unwrap();
    assert!(matches!(err, GrokError::UnknownModel(_)));
    assert!(!kb.path(".grok").exists());
}

#[test]
fn named_store_is_found_from_subdirectory() {
    let kb = TestKb::new();
    Grokker::init_named(kb.root(), "notes.grok", "", kb.runtime()).unwrap();
    std::fs::create_dir_all(kb.path("deep/er")).unwrap();

    let found = grokker::db::find_store(kb.path("deep/er"), "notes.grok").unwrap();
    let (grok, report) = Grokker::load(&found, kb.runtime()).unwrap();
    assert!(!report.migrated);
    assert_eq!(grok.root(), std::fs::canonicalize(kb.root()).unwrap());
}

#[test]
fn moved_store_uses_its_new_directory_as_root() {
    let kb = TestKb::new();
    kb.write("a.md", "the cat");
    let mut grok = kb.init();
    grok.add_document(kb.path("a.md")).unwrap();
    grok.save().unwrap();

    let moved = TestKb::new();
    std::fs::copy(kb.path(".grok"), moved.path(".grok")).unwrap();
    std::fs::copy(kb.path("a.md"), moved.path("a.md")).unwrap();
    drop(kb);

    let grok = moved.load();
    assert_eq!(grok.root(), std::fs::canonicalize(moved.root()).unwrap());
    let relevant = grok.find_relevant("cat", 100).unwrap();
    assert_eq!(relevant.len(), 1);
    assert_eq!(relevant[0].text, "from a.md:\nthe cat\n");
}

#[test]
fn legacy_store_is_migrated_on_load() {
    let kb = TestKb::new();
    kb.write("a.md", "the cat");
    let root = std::fs::canonicalize(kb.root()).unwrap();
    let abs = root.join("a.md");
    let legacy = serde_json::json!({
        "root": root,
        "model": "gpt-4",
        "documents": [{"path": abs}],
        "chunks": [{
            "document": {"path": abs},
            "offset": 0,
            "length": 7,
            "hash": grokker::knowledge::types::chunk_hash("a.md", "the cat"),
            "embedding": [1.0, 0.0, 0.0, 0.0, 0.01]
        }]
    });
    std::fs::write(kb.path(".grok"), serde_json::to_vec(&legacy).unwrap()).unwrap();

    let (mut grok, report) = Grokker::load(kb.path(".grok"), kb.runtime()).unwrap();
    assert!(report.migrated);
    assert_eq!(report.from, "0.1.0");
    assert_eq!(report.to, CODE_VERSION);
    assert_eq!(grok.list_documents(), vec!["a.md".to_string()]);
    assert_eq!(grok.chunks().chunks()[0].rel_path, "a.md");

    // The migrated chunk keeps its embedding: re-adding embeds nothing.
    grok.add_document(kb.path("a.md")).unwrap();
    assert_eq!(kb.provider.embedding_calls(), 0);
    assert_eq!(grok.chunks().len(), 1);
}

#[test]
fn newer_store_is_refused() {
    let kb = TestKb::new();
    let grok = kb.init();
    grok.save().unwrap();

    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(kb.path(".grok")).unwrap()).unwrap();
    raw["version"] = serde_json::json!("999.0.0");
    std::fs::write(kb.path(".grok"), serde_json::to_vec(&raw).unwrap()).unwrap();

    let err = Grokker::load(kb.path(".grok"), kb.runtime()).err().unwrap();
    match err {
        GrokError::StoreVersionTooNew { store, code } => {
            assert_eq!(store, "999.0.0");
            assert_eq!(code, CODE_VERSION);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_persisted_model_is_fatal() {
    let kb = TestKb::new();
    let grok = kb.init();
    grok.save().unwrap();

    let mut raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(kb.path(".grok")).unwrap()).unwrap();
    raw["model"] = serde_json::json!("retired-model");
    std::fs::write(kb.path(".grok"), serde_json::to_vec(&raw).unwrap()).unwrap();

    let err = Grokker::load(kb.path(".grok"), kb.runtime()).err().unwrap();
    assert!(matches!(err, GrokError::UnknownModel(name) if name == "retired-model"));
}
