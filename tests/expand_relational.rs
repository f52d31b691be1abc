mod common;

use std::{collections::BTreeSet, sync::Arc};

use common::{Fixture, questions_batch, questions_context, questions_descriptor};
use datafusion::{common::TableReference, datasource::MemTable};
use serde_json::json;
use sift::{
    BackendKind, DatasetDescriptor, DatasetHandle, Error, ExpandOptions, ExpansionEngine,
    PassthroughTranslator, ReadError, ReadFailurePolicy, TranslateError,
};

fn ids(expanded: &sift::Expanded) -> Vec<i64> {
    expanded
        .records()
        .iter()
        .map(|r| r.record_data()["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn single_predicate_is_pushed_into_where() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![questions_descriptor()]);

    let expanded = handle
        .sem_filter("questions about algebra")
        .expand()
        .await
        .unwrap();

    assert_eq!(ids(&expanded), vec![1, 3]);
    let first = &expanded.records()[0];
    assert_eq!(first.source_dataset_id(), "mathe");
    assert_eq!(first.source_dataset_desc(), "math exercises");
    assert_eq!(first.source_dataset_type(), BackendKind::RelationalDb);
    assert_eq!(
        serde_json::Value::Object(first.record_data().clone()),
        json!({"id": 1, "subject": "algebra", "level": "basic"})
    );
    assert_eq!(fixture.translator.calls(), 1);
}

#[tokio::test]
async fn empty_predicate_list_reads_everything_without_translating() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![questions_descriptor()]);

    let expanded = handle.expand().await.unwrap();

    assert_eq!(ids(&expanded), vec![1, 2, 3]);
    assert_eq!(fixture.translator.calls(), 0);
}

#[tokio::test]
async fn whole_conjunction_reaches_the_translator_in_order() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![questions_descriptor()]);

    let expanded = handle
        .sem_filter("questions about algebra")
        .sem_filter("basic level")
        .expand()
        .await
        .unwrap();

    assert_eq!(ids(&expanded), vec![1]);
    assert_eq!(
        fixture.translator.seen(),
        vec![vec![
            "questions about algebra".to_string(),
            "basic level".to_string()
        ]]
    );
}

#[tokio::test]
async fn predicate_order_does_not_change_the_result_set() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![questions_descriptor()]);

    let forward = handle
        .sem_filter("questions about algebra")
        .sem_filter("basic level")
        .expand()
        .await
        .unwrap();
    let backward = handle
        .sem_filter("basic level")
        .sem_filter("questions about algebra")
        .expand()
        .await
        .unwrap();

    let forward: BTreeSet<i64> = ids(&forward).into_iter().collect();
    let backward: BTreeSet<i64> = ids(&backward).into_iter().collect();
    assert_eq!(forward, backward);
}

#[tokio::test]
async fn expand_is_not_cached() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture
        .handle(vec![questions_descriptor()])
        .sem_filter("questions about algebra");

    let first = handle.expand().await.unwrap();
    let second = handle.expand().await.unwrap();

    assert_eq!(ids(&first), ids(&second));
    assert_eq!(fixture.translator.calls(), 2);
}

#[tokio::test]
async fn translation_failure_never_falls_back_to_unfiltered_read() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![questions_descriptor()]);

    let err = handle
        .sem_filter("something the translator does not know")
        .expand()
        .await
        .unwrap_err();

    match err {
        Error::Translation { dataset, source } => {
            assert_eq!(dataset, "mathe");
            assert!(matches!(source, TranslateError::EmptyFilter));
        }
        other => panic!("expected translation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn translation_failure_aborts_even_when_skipping_reads() {
    let fixture = Fixture::new(questions_context());
    let options = ExpandOptions::builder()
        .read_failure(ReadFailurePolicy::Skip)
        .build();
    let handle = fixture.handle_with(vec![questions_descriptor()], options);

    let err = handle.sem_filter("unknown").expand().await.unwrap_err();
    assert!(matches!(err, Error::Translation { .. }));
}

#[tokio::test]
async fn missing_table_aborts_by_default() {
    let fixture = Fixture::new(questions_context());
    let handle = fixture.handle(vec![
        questions_descriptor(),
        DatasetDescriptor::relational("gone", "dropped table", "missing"),
    ]);

    let err = handle.expand().await.unwrap_err();
    match err {
        Error::Read { dataset, source } => {
            assert_eq!(dataset, "gone");
            assert!(matches!(source, ReadError::DataFusion(_)));
        }
        other => panic!("expected read failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_table_is_reported_when_skipping() {
    let fixture = Fixture::new(questions_context());
    let options = ExpandOptions::builder()
        .read_failure(ReadFailurePolicy::Skip)
        .build();
    let handle = fixture.handle_with(
        vec![
            DatasetDescriptor::relational("gone", "dropped table", "missing"),
            questions_descriptor(),
        ],
        options,
    );

    let expanded = handle
        .sem_filter("questions about algebra")
        .expand()
        .await
        .unwrap();

    assert_eq!(ids(&expanded), vec![1, 3]);
    assert!(expanded.has_skipped());
    assert_eq!(expanded.skipped().len(), 1);
    assert_eq!(expanded.skipped()[0].dataset(), "gone");
}

#[tokio::test]
async fn concurrent_expansion_keeps_collection_order() {
    let ctx = questions_context();
    ctx.sql("CREATE VIEW algebra AS SELECT * FROM questions WHERE subject = 'algebra'")
        .await
        .unwrap();
    let fixture = Fixture::new(ctx);
    let datasets = vec![
        DatasetDescriptor::relational("a", "algebra only", "algebra"),
        questions_descriptor(),
        DatasetDescriptor::relational("c", "algebra again", "algebra"),
    ];
    let options = ExpandOptions::builder().max_concurrency(3).build();

    let expanded = fixture.handle_with(datasets, options).expand().await.unwrap();

    let sources: Vec<&str> = expanded
        .records()
        .iter()
        .map(|r| r.source_dataset_id())
        .collect();
    assert_eq!(sources, vec!["a", "a", "mathe", "mathe", "mathe", "c", "c"]);
}

#[tokio::test]
async fn generated_queries_cannot_modify_the_catalog() {
    let fixture = Fixture::new(questions_context());
    let engine = ExpansionEngine::new(Arc::new(PassthroughTranslator), fixture.reader.clone());
    let handle = DatasetHandle::new(vec![questions_descriptor()], engine, fixture.probe());

    // Stacked statements are rejected before they reach the engine.
    let err = handle
        .sem_filter("1 = 1; DROP TABLE questions")
        .expand()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Translation { .. }));

    let expanded = handle.expand().await.unwrap();
    assert_eq!(expanded.len(), 3);
}

#[tokio::test]
async fn expand_stream_yields_the_same_envelopes() {
    use futures_util::TryStreamExt;

    let fixture = Fixture::new(questions_context());
    let handle = fixture
        .handle(vec![questions_descriptor()])
        .sem_filter("basic level");

    let streamed: Vec<_> = handle.expand_stream().try_collect().await.unwrap();
    let collected = handle.expand().await.unwrap().into_records();
    assert_eq!(streamed, collected);
}

#[tokio::test]
async fn expand_stream_skips_unreadable_datasets_when_asked() {
    use futures_util::TryStreamExt;

    let fixture = Fixture::new(questions_context());
    let datasets = vec![
        DatasetDescriptor::relational("gone", "dropped table", "missing"),
        questions_descriptor(),
    ];

    let aborting = fixture
        .handle(datasets.clone())
        .sem_filter("questions about algebra");
    let err = aborting
        .expand_stream()
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Read { ref dataset, .. } if dataset == "gone"));

    let options = ExpandOptions::builder()
        .read_failure(ReadFailurePolicy::Skip)
        .build();
    let skipping = fixture
        .handle_with(datasets, options)
        .sem_filter("questions about algebra");
    let streamed: Vec<_> = skipping.expand_stream().try_collect().await.unwrap();
    let sources: BTreeSet<&str> = streamed.iter().map(|r| r.source_dataset_id()).collect();
    assert_eq!(sources, BTreeSet::from(["mathe"]));
    assert_eq!(streamed, skipping.expand().await.unwrap().into_records());
}

#[tokio::test]
async fn table_names_are_quoted_as_identifiers() {
    let ctx = questions_context();
    let batch = questions_batch();
    let table = MemTable::try_new(batch.schema(), vec![vec![batch]]).unwrap();
    ctx.register_table(TableReference::bare("math-questions"), Arc::new(table))
        .unwrap();
    let fixture = Fixture::new(ctx);
    let handle = fixture.handle(vec![DatasetDescriptor::relational(
        "hyphenated",
        "math exercises under an awkward name",
        "math-questions",
    )]);

    assert_eq!(handle.expand().await.unwrap().len(), 3);
    let algebra = handle
        .sem_filter("questions about algebra")
        .expand()
        .await
        .unwrap();
    assert_eq!(ids(&algebra), vec![1, 3]);

    let found = handle.find("basic level", None).await.unwrap();
    assert_eq!(found.ids(), vec!["hyphenated"]);
}
