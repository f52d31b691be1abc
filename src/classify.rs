use async_trait::async_trait;
use serde_json::Value;

use crate::{error::ClassifyError, model::CompletionModel};

/// Yes/no judgement of a condition against a JSON subject.
///
/// Used for metadata-only relevance (the subject is a projection of a
/// descriptor) and for post-expansion filtering (the subject is one record).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn judge(&self, subject: &Value, condition: &str) -> Result<bool, ClassifyError>;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for std::sync::Arc<C> {
    async fn judge(&self, subject: &Value, condition: &str) -> Result<bool, ClassifyError> {
        (**self).judge(subject, condition).await
    }
}

/// [`Classifier`] asking a [`CompletionModel`] for a yes/no answer
pub struct LlmClassifier<M> {
    model: M,
}

impl<M: CompletionModel> LlmClassifier<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn prompt(subject: &Value, condition: &str) -> String {
        format!(
            "Decide whether the following item satisfies the condition.\n\
             Condition: {condition}\n\
             Item (JSON): {subject}\n\
             Answer with exactly one word: yes or no."
        )
    }
}

#[async_trait]
impl<M: CompletionModel> Classifier for LlmClassifier<M> {
    async fn judge(&self, subject: &Value, condition: &str) -> Result<bool, ClassifyError> {
        let answer = self.model.complete(&Self::prompt(subject, condition)).await?;
        parse_answer(&answer)
    }
}

fn parse_answer(answer: &str) -> Result<bool, ClassifyError> {
    let word = answer
        .trim()
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match word.as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(ClassifyError::Unparseable {
            answer: answer.to_string(),
        }),
    }
}
