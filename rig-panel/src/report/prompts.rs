//! Report workflow prompt templates
//!
//! One template per model call:
//! - Requirements: extract functional requirements from the idea
//! - Personas: one developer persona per theme
//! - Question / Search / Answer: the interview loop
//! - Section: compress one interview into a memo
//! - Body / Introduction / Conclusion: assemble the memos into a report
//!
//! Placeholders are `{name}` and filled in with [`PromptBuilder`].

/// Closing line the interviewer uses to end an interview early
pub const CLOSING_PHRASE: &str = "Thank you so much for your help";

const REQUIREMENTS: &str = r#"You are a system design engineer analyzing an app idea and extracting the requirements for a small project.

1. The app idea:
{topic}

2. Reviewer feedback on earlier drafts, if any:
{feedback}

3. List the functional requirements as a few bullet points. Be specific about the core features.

4. Offer up to 4 optional suggestions that would add value.

5. State two presumptions you are making about the app and two clarifying questions, rating each question's importance from 1 (minor) to 10 (critical).

6. Pick the top {max_personas} themes the requirements fall into.

Keep the scope to a small project and present the result clearly and concisely."#;

const PERSONAS: &str = r#"You are assembling a panel of software developer personas.

1. The app idea:
{topic}

2. The requirements agreed so far:
{requirements}

3. Reviewer feedback on earlier panels, if any:
{feedback}

4. Derive the distinct themes from the requirements and the feedback.

5. Pick at most {max_personas} themes and assign exactly one developer to each. Return no more than {max_personas} personas."#;

const QUESTION: &str = r#"You are a developer interviewing an expert to learn about a specific topic.

Aim for insights that are:
1. Interesting: surprising or non-obvious.
2. Specific: grounded in concrete examples from the expert rather than generalities.

Your persona and goals:
{goals}

Introduce yourself with a name that fits your persona, then ask your question.

Keep asking questions that drill down and sharpen your understanding.

Once you are satisfied, end the interview with: "Thank you so much for your help!"

Stay in character for the whole conversation."#;

const SEARCH: &str = r#"You will be given a conversation between a developer and an expert.

Produce a well-structured query for web search or encyclopedia retrieval.

Read the whole conversation, paying most attention to the developer's latest question, and turn that question into the query."#;

const ANSWER: &str = r#"You are an expert being interviewed by a developer.

The developer's area of focus:
{goals}

Answer the interviewer's question using only this context:

{context}

Guidelines:
1. Do not add outside information or assumptions beyond the context.
2. Each document in the context starts with its source.
3. Cite sources next to the statements they support, e.g. [1] for the first source.
4. List the sources in order at the end of the answer: [1] Source 1, [2] Source 2.
5. For `<Document source="docs/guide.pdf" page="7"/>` list just `[1] docs/guide.pdf, page 7`, without the tag."#;

const SECTION: &str = r#"You are an expert technical writer producing one short, digestible section of a report from a set of source documents.

1. Each source document starts with a `<Document>` tag naming it.

2. Structure the section in markdown:
a. Title (`##` header), engaging and drawn from this focus area:
{focus}
b. Summary (`###` header)
c. Sources (`###` header)

3. In the summary:
- Open with background related to the focus area
- Emphasize what is novel or surprising in the interview's insights
- Do not name the interviewer or the expert
- Stay under roughly 400 words
- Cite sources with numbers such as [1] and [2]

4. In the sources section:
- List every source used, with full links or document paths, one per line
- Merge duplicates so each source appears once

5. No preamble before the title."#;

const BODY: &str = r#"You are a technical writer creating a report on this topic:

{topic}

A team of developers each interviewed an expert on one sub-topic and wrote up a memo. Consolidate the memos into one crisp narrative that ties together their central ideas.

Formatting:
1. Markdown, no preamble, no sub-headings.
2. Start with a single title header: `## Insights`
3. Do not mention any developer names.
4. Keep the bracketed citations from the memos, e.g. [1] or [2].
5. End with a `## Sources` section: one consolidated, ordered list of sources with no repeats.

Memos:

{context}"#;

const INTRO_CONCLUSION: &str = r#"You are a technical writer finishing a report on {topic}.

You will be asked for either the introduction or the conclusion. Write around 100 words, previewing (introduction) or recapping (conclusion) every section of the report. Use markdown and no preamble.

For the introduction, give the report a compelling title with a `#` header, then use `## Introduction` as the section header.

For the conclusion, use `## Conclusion` as the section header.

The report sections:

{sections}"#;

/// Prompt templates for the report workflow
pub struct ReportPrompts;

impl ReportPrompts {
    pub fn requirements(topic: &str, feedback: &str, max_personas: usize) -> String {
        PromptBuilder::new(REQUIREMENTS)
            .with("topic", topic)
            .with("feedback", feedback)
            .with("max_personas", max_personas.to_string())
            .build()
    }

    pub fn personas(topic: &str, requirements: &str, feedback: &str, max_personas: usize) -> String {
        PromptBuilder::new(PERSONAS)
            .with("topic", topic)
            .with("requirements", requirements)
            .with("feedback", feedback)
            .with("max_personas", max_personas.to_string())
            .build()
    }

    /// Interviewer instructions; `goals` is the persona sheet.
    pub fn question(goals: &str) -> String {
        PromptBuilder::new(QUESTION).with("goals", goals).build()
    }

    pub fn search() -> String {
        SEARCH.to_string()
    }

    pub fn answer(goals: &str, context: &str) -> String {
        PromptBuilder::new(ANSWER)
            .with("goals", goals)
            .with("context", context)
            .build()
    }

    pub fn section(focus: &str) -> String {
        PromptBuilder::new(SECTION).with("focus", focus).build()
    }

    pub fn body(topic: &str, sections: &str) -> String {
        PromptBuilder::new(BODY)
            .with("topic", topic)
            .with("context", sections)
            .build()
    }

    pub fn intro_conclusion(topic: &str, sections: &str) -> String {
        PromptBuilder::new(INTRO_CONCLUSION)
            .with("topic", topic)
            .with("sections", sections)
            .build()
    }
}

/// Prompt builder for dynamic template substitution
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Replace every `{name}` with `value`
    pub fn with(mut self, name: &str, value: impl AsRef<str>) -> Self {
        let placeholder = format!("{{{}}}", name);
        self.template = self.template.replace(&placeholder, value.as_ref());
        self
    }

    pub fn build(self) -> String {
        self.template
    }
}
