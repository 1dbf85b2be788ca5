//! Retrieval-augmented test-plan generation.
//!
//! [`PlanGenerator::generate`] retrieves once, joins the retrieved chunk
//! texts with blank lines in rank order, and asks the generation service
//! for a Gherkin test plan grounded only in that context. The returned
//! [`TestPlan`] carries exactly the chunks that were placed in the prompt.

use anyhow::Result;
use tracing::debug;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generation::{create_generator, fill_template, Generator};
use crate::models::{RetrievedChunk, TestPlan};
use crate::retrieve::{snippet, Retriever};
use crate::store::SqliteIndex;

/// Instruction template; `{context}` and `{question}` are substituted.
pub const PLAN_PROMPT: &str = "You are a senior QA analyst, expert in business rules and in BDD (Behavior-Driven Development).
Your task is to write a complete, detailed test plan in Gherkin format (Given/When/Then) for the user's QUESTION.

The test plan MUST be based EXCLUSIVELY on the BUSINESS RULES given in the CONTEXT.
Make sure the plan covers the happy path and every edge case implied by the rules.
For each Scenario, state the business rule it tests.

---
CONTEXT (Relevant business rules):
{context}
---
USER QUESTION:
{question}
---
BDD TEST PLAN (Gherkin format):
";

/// Join chunk texts with a blank line, in the given order.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_plan_prompt(context: &str, question: &str) -> String {
    fill_template(PLAN_PROMPT, &[("context", context), ("question", question)])
}

pub struct PlanGenerator<'a> {
    retriever: Retriever<'a>,
    generator: &'a dyn Generator,
    temperature: f32,
}

impl<'a> PlanGenerator<'a> {
    pub fn new(retriever: Retriever<'a>, generator: &'a dyn Generator, temperature: f32) -> Self {
        Self {
            retriever,
            generator,
            temperature,
        }
    }

    pub async fn generate(&self, query: &str) -> Result<TestPlan> {
        let sources = self.retriever.retrieve(query).await?;
        debug!(query, retrieved = sources.len(), "context retrieved");

        let prompt = render_plan_prompt(&format_context(&sources), query);
        let plan = self.generator.generate(&prompt, self.temperature).await?;

        Ok(TestPlan {
            query: query.to_string(),
            plan: plan.trim().to_string(),
            sources,
        })
    }
}

/// `rh plan`: generate and print a test plan with its sources.
pub async fn run_plan(config: &Config, query: &str, k: Option<usize>, json: bool) -> Result<TestPlan> {
    let index = SqliteIndex::open(&config.index.path).await?;
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;

    let retriever = Retriever::new(&index, embedder.as_ref(), k.unwrap_or(config.retrieval.top_k));
    let planner = PlanGenerator::new(retriever, generator.as_ref(), config.generation.plan_temperature);
    let plan = planner.generate(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", plan.plan);
        println!();
        println!("Sources ({}):", plan.sources.len());
        for (i, source) in plan.sources.iter().enumerate() {
            println!(
                "  {}. [{:.3}] {} ({})",
                i + 1,
                source.score,
                source.metadata.source,
                source.metadata.category
            );
            println!("     {}", snippet(&source.text, 160));
        }
    }

    index.close().await;
    Ok(plan)
}
