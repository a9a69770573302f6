use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CONTEXT_FILLER: &str = "hi";
const QUESTION: &str = "tell me a long story";

/// A composed prompt and the pool entries it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub context_index: usize,
    pub question_index: usize,
    pub text: String,
}

/// Synthetic contexts and questions. Every entry is prefixed with its index
/// so that no two entries share a prompt-cache prefix.
///
/// Contexts are handed out round-robin, which keeps reuses of the same
/// context as far apart as possible; questions are drawn uniformly.
pub struct PromptPool {
    contexts: Vec<String>,
    questions: Vec<String>,
    context_counter: usize,
    rng: StdRng,
}

impl PromptPool {
    pub fn generate(num_contexts: usize, context_length: usize, num_questions: usize) -> Self {
        Self::with_rng(
            num_contexts,
            context_length,
            num_questions,
            StdRng::from_entropy(),
        )
    }

    pub fn with_seed(
        num_contexts: usize,
        context_length: usize,
        num_questions: usize,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            num_contexts,
            context_length,
            num_questions,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        num_contexts: usize,
        context_length: usize,
        num_questions: usize,
        rng: StdRng,
    ) -> Self {
        let filler = CONTEXT_FILLER.repeat(context_length);
        let contexts = (0..num_contexts).map(|i| format!("{}{}", i, filler)).collect();
        let questions = (0..num_questions).map(|i| format!("{}{}", i, QUESTION)).collect();

        Self {
            contexts,
            questions,
            context_counter: 0,
            rng,
        }
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub fn num_questions(&self) -> usize {
        self.questions.len()
    }

    /// Index of the next context in rotation; advances the counter.
    pub fn next_context_index(&mut self) -> Option<usize> {
        if self.contexts.is_empty() {
            return None;
        }
        let index = self.context_counter;
        self.context_counter = (self.context_counter + 1) % self.contexts.len();
        Some(index)
    }

    /// Next context in rotation followed by a random question.
    pub fn next_prompt(&mut self) -> Option<Prompt> {
        if self.questions.is_empty() {
            return None;
        }
        let context_index = self.next_context_index()?;
        let question_index = self.rng.gen_range(0..self.questions.len());

        let context = &self.contexts[context_index];
        let question = &self.questions[question_index];
        let mut text = String::with_capacity(context.len() + question.len());
        text.push_str(context);
        text.push_str(question);

        Some(Prompt {
            context_index,
            question_index,
            text,
        })
    }
}
