//! Question answering over an indexed collection.
//!
//! Retrieval picks the top-k chunks, all of them are "stuffed" into a single
//! prompt, and the model is asked to answer and cite its sources.

mod llm;

pub use llm::{LlmProvider, OpenAIChatProvider};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::index::{Collection, SearchHit, SqliteVectorStore};

/// Something that can return the chunks most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

#[async_trait]
impl Retriever for SqliteVectorStore {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self.search(query, limit).await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

const NO_CONTEXT_ANSWER: &str = "Nothing in the index matches this question.";

/// Retrieve-then-answer chain with all context in one prompt.
pub struct RetrievalQa {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
}

impl RetrievalQa {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LlmProvider>, top_k: usize) -> Self {
        Self {
            retriever,
            llm,
            top_k,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let hits = self.retriever.retrieve(question, self.top_k).await?;
        if hits.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        debug!(
            "Answering with {} chunks via {}",
            hits.len(),
            self.llm.model()
        );
        let prompt = stuff_prompt(question, &hits);
        let response = self.llm.complete(&prompt).await?;
        Ok(parse_answer(&response))
    }
}

fn stuff_prompt(question: &str, hits: &[SearchHit]) -> String {
    let mut prompt = String::from(
        "Given the following extracted parts of some files and a question, \
         write a final answer and list the files you used.\n\
         If you don't know the answer, say that you don't know. Don't make up an answer.\n\
         Always end with a line starting with \"SOURCES:\" followed by comma-separated file paths.\n\n",
    );
    prompt.push_str(&format!("QUESTION: {}\n=========\n", question));
    for hit in hits {
        prompt.push_str(&format!(
            "Content: {}\nSource: {}\n\n",
            hit.content.trim(),
            hit.source
        ));
    }
    prompt.push_str("=========\nFINAL ANSWER:");
    prompt
}

/// Split a model response into the answer and its "SOURCES:" list.
fn parse_answer(response: &str) -> Answer {
    let upper = response.to_ascii_uppercase();
    let (answer, sources) = match upper.rfind("SOURCES:") {
        Some(at) => (&response[..at], &response[at + "SOURCES:".len()..]),
        None => (response, ""),
    };

    let answer = answer.trim();
    let answer = answer.strip_prefix("FINAL ANSWER:").unwrap_or(answer).trim();
    let mut seen = Vec::new();
    for source in sources.split([',', '\n']).map(str::trim).filter(|s| !s.is_empty()) {
        if !seen.iter().any(|s: &String| s == source) {
            seen.push(source.to_string());
        }
    }

    Answer {
        answer: answer.to_string(),
        sources: seen,
    }
}

/// One query entry point per collection.
#[async_trait]
pub trait QueryClient: Send + Sync {
    fn collection(&self) -> Collection;

    async fn query(&self, question: &str) -> Result<Answer>;
}

/// Answers questions about document contents.
pub struct DocumentQueryClient {
    chain: RetrievalQa,
}

impl DocumentQueryClient {
    pub fn new(chain: RetrievalQa) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl QueryClient for DocumentQueryClient {
    fn collection(&self) -> Collection {
        Collection::Documents
    }

    async fn query(&self, question: &str) -> Result<Answer> {
        self.chain.ask(question).await
    }
}

/// Finds image files by keywords in their descriptions.
pub struct ImageQueryClient {
    chain: RetrievalQa,
}

impl ImageQueryClient {
    pub fn new(chain: RetrievalQa) -> Self {
        Self { chain }
    }

    pub fn question_for(keywords: &str) -> String {
        format!(
            "Which image file contains the following key words {}:",
            keywords
        )
    }
}

#[async_trait]
impl QueryClient for ImageQueryClient {
    fn collection(&self) -> Collection {
        Collection::Images
    }

    async fn query(&self, question: &str) -> Result<Answer> {
        self.chain.ask(&Self::question_for(question)).await
    }
}
