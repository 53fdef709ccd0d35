use super::chat::{Message, Role};

/// Placeholder replaced by the caller-supplied system prompt.
pub const SYSTEM_PROMPT_PLACEHOLDER: &str = "{system_prompt}";

/// Instruction template appended to the system prompt on the reasoning route.
///
/// It establishes the `<think>…</think>` convention that the reasoning filter
/// later removes from the reply.
pub const DEFAULT_REASONING_TEMPLATE: &str = "{system_prompt}
Before answering, think through the different aspects of the question, then give your answer. \
Wrap the thinking process in <think> tags; the user will not see that part.
For example:
<think>
This question involves...
I need to consider...
Based on...
</think>
The final answer...";

/// Default system prompt of the plain chat route.
pub const DEFAULT_ASSISTANT_SYSTEM_PROMPT: &str = "You are a professional study assistant who helps \
users with questions about their learning. Answer in Chinese using Markdown, and keep your answers \
coherent with the context of the conversation.";

/// Render the enhanced system prompt from a base prompt.
#[must_use]
pub fn render_reasoning_prompt(template: &str, system_prompt: &str) -> String {
    template.replace(SYSTEM_PROMPT_PLACEHOLDER, system_prompt)
}

/// Rewrite a conversation so that it starts with exactly one enhanced system
/// message.
///
/// The first caller-supplied system message (or an empty prompt) is the base
/// of the enhanced prompt. Every other system message is dropped and the
/// remaining messages keep their order.
#[must_use]
pub fn enhance_conversation(messages: Vec<Message>, template: &str) -> Vec<Message> {
    let base = messages
        .iter()
        .find(|message| message.role == Role::System)
        .map_or("", |message| message.content.as_str());
    let enhanced = render_reasoning_prompt(template, base);

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(Message::system(enhanced));
    out.extend(
        messages
            .into_iter()
            .filter(|message| message.role != Role::System),
    );
    out
}

/// Conversation for the plain chat route: fixed system prompt, prior turns,
/// then the new user message.
#[must_use]
pub fn plain_chat_conversation(
    system_prompt: &str,
    history: Vec<Message>,
    message: String,
) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len() + 2);
    out.push(Message::system(system_prompt));
    out.extend(history);
    out.push(Message::user(message));
    out
}

/// Canned single-turn assistant tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPreset {
    StudyPlan { subject: String, level: String },
    HomeworkHelp { question: String },
    ConceptExplanation { concept: String },
}

impl TaskPreset {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TaskPreset::StudyPlan { .. } => "study-plan",
            TaskPreset::HomeworkHelp { .. } => "homework-help",
            TaskPreset::ConceptExplanation { .. } => "explain",
        }
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        let (system, user) = match self {
            TaskPreset::StudyPlan { subject, level } => (
                "You are a professional study planner who designs personalised study plans \
                 around each student's needs.",
                format!(
                    "Please draw up a study plan for {subject}. My current level is {level}. \
                     Include a detailed learning path, recommended resources and a schedule."
                ),
            ),
            TaskPreset::HomeworkHelp { question } => (
                "You are a patient teaching assistant who helps students work through problems \
                 they meet while studying.",
                format!(
                    "I ran into this problem while doing my homework: {question}. \
                     Can you help me analyse it?"
                ),
            ),
            TaskPreset::ConceptExplanation { concept } => (
                "You are a knowledgeable explainer who makes complex concepts easy to understand.",
                format!(
                    "Please explain this concept: {concept}. Use simple language and examples \
                     wherever possible."
                ),
            ),
        };
        vec![Message::system(system), Message::user(user)]
    }
}
