pub mod llm;
pub mod prompt;
pub mod parser;
pub mod retriever;
pub mod diagnostic; // Last prompt/reply exchange written next to the results

pub use parser::{parse_diagnosis_response, DiagnosisTriple, ParseError, ParsedResponse};
pub use prompt::{build_messages, build_prompt, render_plain, Persona, PromptOptions, PromptPair};
pub use retriever::{
    Attempt, AttemptOutcome, Retrieval, RetrievalError, RetryPolicy, StructuredRetriever,
};
