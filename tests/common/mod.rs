#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use arrow::array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use datafusion::{datasource::MemTable, prelude::SessionContext};
use parquet::arrow::ArrowWriter;
use serde_json::Value;
use sift::{
    BackendProbe, BackendReader, Classifier, ClassifierProbe, ClassifyError, DatasetDescriptor,
    DatasetHandle, ExistenceProbe, ExpandOptions, ExpansionEngine, FileObject, FileReader,
    FilterExpr, Predicate, QueryTranslator, SchemaDescription, SqlReader, TranslateError,
};

pub fn questions_batch() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef),
        (
            "subject",
            Arc::new(StringArray::from(vec!["algebra", "geometry", "algebra"])) as ArrayRef,
        ),
        (
            "level",
            Arc::new(StringArray::from(vec!["basic", "basic", "advanced"])) as ArrayRef,
        ),
    ])
    .unwrap()
}

/// Context with a `questions` table holding [`questions_batch`]
pub fn questions_context() -> SessionContext {
    let ctx = SessionContext::new();
    let batch = questions_batch();
    let table = MemTable::try_new(batch.schema(), vec![vec![batch]]).unwrap();
    ctx.register_table("questions", Arc::new(table)).unwrap();
    ctx
}

pub fn questions_descriptor() -> DatasetDescriptor {
    DatasetDescriptor::relational("mathe", "math exercises", "questions")
}

pub fn write_parquet(dir: &Path, name: &str, batches: &[RecordBatch]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batches[0].schema(), None).unwrap();
    for batch in batches {
        writer.write(batch).unwrap();
    }
    writer.close().unwrap();
    path
}

pub fn parquet_file(path: PathBuf) -> FileObject {
    FileObject {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path,
        encoding_format: "application/x-parquet".into(),
    }
}

/// Write `contents` to `dir/name` and describe it with `encoding`
pub fn text_file(dir: &Path, name: &str, encoding: &str, contents: &str) -> FileObject {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    FileObject {
        name: name.into(),
        path,
        encoding_format: encoding.into(),
    }
}

pub fn weather_batch(city: &str, temps: Vec<i64>) -> RecordBatch {
    let cities: Vec<&str> = temps.iter().map(|_| city).collect();
    RecordBatch::try_from_iter(vec![
        ("city", Arc::new(StringArray::from(cities)) as ArrayRef),
        ("temp", Arc::new(Int64Array::from(temps)) as ArrayRef),
    ])
    .unwrap()
}

/// Translator with a fixed phrase book, counting how often it is asked
#[derive(Default)]
pub struct PhraseTranslator {
    phrases: HashMap<String, String>,
    calls: AtomicUsize,
    seen: std::sync::Mutex<Vec<Vec<String>>>,
}

impl PhraseTranslator {
    pub fn new(phrases: &[(&str, &str)]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Predicate lists received, one entry per call
    pub fn seen(&self) -> Vec<Vec<String>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryTranslator for PhraseTranslator {
    async fn translate(
        &self,
        predicates: &[Predicate],
        _schema: &SchemaDescription,
    ) -> Result<FilterExpr, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push(predicates.iter().map(|p| p.to_string()).collect());
        let mut parts = Vec::new();
        for predicate in predicates {
            let sql = self
                .phrases
                .get(predicate.as_ref())
                .ok_or(TranslateError::EmptyFilter)?;
            parts.push(FilterExpr::parse(sql.as_str())?);
        }
        FilterExpr::conjunction(&parts).ok_or(TranslateError::NoPredicates)
    }
}

/// Classifier answering yes when the subject mentions a keyword of the
/// condition
#[derive(Default)]
pub struct KeywordClassifier {
    calls: AtomicUsize,
    fail: bool,
}

impl KeywordClassifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn judge(&self, subject: &Value, condition: &str) -> Result<bool, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClassifyError::Unparseable {
                answer: "unavailable".into(),
            });
        }
        let text = subject.to_string().to_lowercase();
        Ok(condition
            .to_lowercase()
            .split_whitespace()
            .filter(|word| word.len() > 3)
            .any(|word| text.contains(word)))
    }
}

pub struct Fixture {
    pub translator: Arc<PhraseTranslator>,
    pub classifier: Arc<KeywordClassifier>,
    pub reader: Arc<BackendReader>,
}

pub fn phrase_book() -> Vec<(&'static str, &'static str)> {
    vec![
        ("questions about algebra", "subject = 'algebra'"),
        ("basic level", "level = 'basic'"),
        ("warm days", "temp > 20"),
        ("in Paris", "city = 'Paris'"),
    ]
}

/// Log to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Fixture {
    pub fn new(ctx: SessionContext) -> Self {
        init_tracing();
        Self {
            translator: Arc::new(PhraseTranslator::new(&phrase_book())),
            classifier: Arc::new(KeywordClassifier::default()),
            reader: Arc::new(BackendReader::new(
                SqlReader::new(ctx),
                FileReader::new(),
            )),
        }
    }

    pub fn engine(&self, options: ExpandOptions) -> ExpansionEngine {
        ExpansionEngine::new(self.translator.clone(), self.reader.clone()).with_options(options)
    }

    pub fn probe(&self) -> Arc<BackendProbe> {
        Arc::new(BackendProbe::new(
            ExistenceProbe::new(self.reader.clone(), self.translator.clone()),
            ClassifierProbe::new(self.classifier.clone()),
        ))
    }

    pub fn handle(&self, datasets: Vec<DatasetDescriptor>) -> DatasetHandle {
        self.handle_with(datasets, ExpandOptions::default())
    }

    pub fn handle_with(
        &self,
        datasets: Vec<DatasetDescriptor>,
        options: ExpandOptions,
    ) -> DatasetHandle {
        DatasetHandle::new(datasets, self.engine(options), self.probe())
    }
}
