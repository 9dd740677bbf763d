use std::sync::{Arc, Barrier};

use super::fixtures::{create_context, FixtureEmbedder};
use crate::history::InsertOutcome;

#[test]
fn test_concurrent_inserts_of_same_url() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = create_context(tmp.path(), Arc::new(FixtureEmbedder::new(2)));
    let store = ctx.store().clone();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = store.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                store
                    .insert("https://example.com/race", &format!("writer {i}"), "t")
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<InsertOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let inserted = outcomes
        .iter()
        .filter(|o| matches!(o, InsertOutcome::Inserted { .. }))
        .count();

    assert_eq!(inserted, 1);
    assert_eq!(outcomes.len() - inserted, threads - 1);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, InsertOutcome::Inserted { .. } | InsertOutcome::Duplicate)));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_categories_follow_config_table() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.yaml"),
        "categories:\n  - name: AI\n    keywords: [LLM]\n  - name: Web Dev\n    keywords: [React]\n",
    )
    .unwrap();

    let ctx = create_context(tmp.path(), Arc::new(FixtureEmbedder::new(2)));
    let outcome = ctx
        .store()
        .insert("https://example.com/1", "New LLM and React features", "t")
        .unwrap();

    let InsertOutcome::Inserted { id, category, .. } = outcome else {
        panic!("expected insert");
    };
    assert_eq!(category, "AI");
    let stored = ctx.store().entries().unwrap();
    assert_eq!((stored[0].id, stored[0].category.as_str()), (id, "AI"));

    // Finance is not in this table
    let outcome = ctx
        .store()
        .insert("https://example.com/2", "Crypto trading", "t")
        .unwrap();
    assert!(matches!(outcome, InsertOutcome::Inserted { ref category, .. } if category == "Other"));
}

#[test]
fn test_custom_exclusions() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("config.yaml"),
        "exclude_domains:\n  - intranet.local\n  - example.com/private\n",
    )
    .unwrap();

    let ctx = create_context(tmp.path(), Arc::new(FixtureEmbedder::new(2)));
    let store = ctx.store();

    assert_eq!(
        store.insert("http://wiki.intranet.local/page", "Wiki", "t").unwrap(),
        InsertOutcome::Excluded
    );
    assert_eq!(
        store.insert("https://example.com/private/notes", "Notes", "t").unwrap(),
        InsertOutcome::Excluded
    );
    assert!(matches!(
        store.insert("https://example.com/public", "Public", "t").unwrap(),
        InsertOutcome::Inserted { .. }
    ));
    // default list no longer applies
    assert!(matches!(
        store.insert("https://twitter.com/home", "Home", "t").unwrap(),
        InsertOutcome::Inserted { .. }
    ));
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn test_disabled_keyphrases() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("config.yaml"), "keyphrases:\n  enabled: false\n").unwrap();

    let ctx = create_context(tmp.path(), Arc::new(FixtureEmbedder::new(2)));
    let outcome = ctx
        .store()
        .insert("https://example.com/1", "Quantum error correction", "t")
        .unwrap();

    assert_eq!(
        outcome,
        InsertOutcome::Inserted {
            id: 1,
            category: "Quantum Computing".to_string(),
            keyphrases: vec![],
        }
    );
}
