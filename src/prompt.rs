//! Prompt text for reviewers, the arbiter and the translator.

use crate::arbiter::{QaExchange, ReviewSet};
use crate::memo::MEMO_JSON_PREFIX;
use std::collections::BTreeMap;

/// Heading that introduces the arbiter's JSON response contract
pub const ARBITER_PROTOCOL_HEADING: &str = "=== ARBITER CONTROL PROTOCOL ===";

/// Task and context shared by every prompt of a run
#[derive(Debug, Clone, Copy)]
pub struct Brief<'a> {
    pub task: &'a str,
    pub context: &'a str,
}

const PRIORITY_SCALE: &str = "\
- P0: critical or blocking, must be fixed before merge.
- P1: important, should be fixed soon.
- P2: normal, a worthwhile improvement.
- P3: minor, nice to have.";

fn identity(name: &str) -> String {
    format!(
        "You are **{}**, a senior code reviewer.\n\n\
         Your working directory holds a private copy of the code under review. \
         Analyze and comment only; do not modify project files.",
        name
    )
}

fn task_and_context(brief: &Brief<'_>) -> String {
    format!(
        "<REVIEW_TASK>\n{}\n</REVIEW_TASK>\n\n\
         Use your tools (search, file reads, git) to examine any code you need.\n\n\
         Context from the coordinator (may be a short note, a diff or empty):\n\n\
         ```text\n{}\n```",
        brief.task, brief.context
    )
}

fn memo_block(memo: &str) -> String {
    let memo = if memo.trim().is_empty() { "(empty)" } else { memo };
    format!(
        "Your private memo for this codebase. Only you and the coordinator see it:\n\n\
         <YOUR_PRIVATE_MEMO>\n{}\n</YOUR_PRIVATE_MEMO>",
        memo
    )
}

fn memo_instructions(what: &str) -> String {
    format!(
        "End your answer with one separate line of the form:\n\n\
         {} {{\"append\": \"...\", \"overwrite\": false}}\n\n\
         - `append` holds private notes worth keeping {} (empty string if none).\n\
         - With `overwrite: true` the memo is replaced by `append`; otherwise \
         `append` is added to it.",
        MEMO_JSON_PREFIX, what
    )
}

fn review_format() -> String {
    format!(
        "Output format (strict):\n\
         - Valid Markdown, opening with a one-sentence overall summary.\n\
         - Four sections with these exact headings: `P0 issues`, `P1 issues`, \
         `P2 issues`, `P3 issues`.\n\
         {}\n\
         - Under each section a numbered list. Every item gives a short title, \
         its approximate location, the problem, why it matters and a concrete fix.\n\
         - Append `(NEEDS HUMAN REVIEW)` to any item a human must double-check.",
        PRIORITY_SCALE
    )
}

/// First, independent review
pub fn initial_review(name: &str, brief: &Brief<'_>, memo: &str) -> String {
    [
        identity(name),
        task_and_context(brief),
        memo_block(memo),
        "Look for bugs, missed edge cases, performance problems, security risks and \
         unclear code. Explain each problem and how to fix it, and say so explicitly \
         when something needs a human engineer."
            .to_string(),
        review_format(),
        memo_instructions("for future reviews of this codebase"),
    ]
    .join("\n\n")
}

fn review_blocks(tag: &str, reviews: &BTreeMap<String, String>, skip: Option<&str>) -> String {
    reviews
        .iter()
        .filter(|(name, _)| Some(name.as_str()) != skip)
        .map(|(name, text)| format!("<{tag} name=\"{name}\">\n{text}\n</{tag}>"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cross-check: revise one's own review after reading the peers' reviews
pub fn cross_check(
    name: &str,
    brief: &Brief<'_>,
    own_review: &str,
    initial_reviews: &BTreeMap<String, String>,
    memo: &str,
) -> String {
    let peers = review_blocks("REVIEW", initial_reviews, Some(name));
    let peers = if peers.is_empty() {
        "(no other reviews)".to_string()
    } else {
        peers
    };

    [
        identity(name),
        task_and_context(brief),
        format!("Your earlier review:\n\n<YOUR_EARLIER_REVIEW>\n{own_review}\n</YOUR_EARLIER_REVIEW>"),
        format!("The other reviewers' reviews:\n\n<PEER_REVIEWS>\n{peers}\n</PEER_REVIEWS>"),
        memo_block(memo),
        "In this round:\n\
         - Compare your findings with the other reviewers'.\n\
         - For every P0/P1 issue anyone raised, decide whether it is real and \
         whether its priority is right.\n\
         - Adopt valid issues you missed, with a priority of your own.\n\
         - State disagreements briefly and say why.\n\
         - Then write an updated, self-contained review."
            .to_string(),
        review_format(),
        memo_instructions("after this cross-check"),
    ]
    .join("\n\n")
}

/// Earlier Q&A between the arbiter and `target`
pub fn qa_snippet_for(history: &[QaExchange], target: &str) -> String {
    let parts: Vec<String> = history
        .iter()
        .filter(|qa| qa.target == target)
        .map(|qa| format!("Question:\n{}\n\nAnswer:\n{}\n", qa.question, qa.answer))
        .collect();
    if parts.is_empty() {
        "(no previous Q&A with you)".to_string()
    } else {
        parts.join("\n---\n")
    }
}

/// Arbiter's question to one reviewer
pub fn follow_up(
    name: &str,
    brief: &Brief<'_>,
    latest_review: &str,
    question: &str,
    qa_snippet: &str,
    memo: &str,
) -> String {
    [
        identity(name),
        task_and_context(brief),
        format!("Your review:\n\n<YOUR_EARLIER_REVIEW>\n{latest_review}\n</YOUR_EARLIER_REVIEW>"),
        memo_block(memo),
        format!(
            "The review coordinator has a follow-up question:\n\n\
             <ARBITER_QUESTION>\n{question}\n</ARBITER_QUESTION>"
        ),
        format!(
            "Your previous Q&A with the coordinator, for reference:\n\n\
             <YOUR_PREVIOUS_QA>\n{qa_snippet}\n</YOUR_PREVIOUS_QA>"
        ),
        format!(
            "Answer carefully in English Markdown. Make clear:\n\
             - whether the code in question really needs changes;\n\
             - how confident you are (0 to 1);\n\
             - what you recommend, concretely;\n\
             - for a potential issue, whether you **agree**, **disagree** or are \
             **uncertain**, and which priority you would give it:\n{PRIORITY_SCALE}"
        ),
        memo_instructions("after this exchange"),
    ]
    .join("\n\n")
}

/// Inputs for one arbiter step
#[derive(Debug, Clone, Copy)]
pub struct ArbiterPrompt<'a> {
    pub name: &'a str,
    pub brief: Brief<'a>,
    pub reviewers: &'a [String],
    pub reviews: &'a ReviewSet,
    pub history: &'a [QaExchange],
    pub max_queries: usize,
    pub include_low_priority: bool,
    pub allow_queries: bool,
}

impl ArbiterPrompt<'_> {
    pub fn render(&self) -> String {
        let mut prompt = format!(
            "You are the **arbiter reviewer** {}.\n\n{}\n\n\
             You never inspect the code yourself. You reconcile what the reviewers \
             report and what they answer to your questions. Each reviewer talks only \
             to you; never mention one reviewer to another.\n\n\
             Your job:\n\
             - find where the reviewers agree;\n\
             - find uncertainty and disagreement;\n\
             - cross-check important issues instead of trusting whoever raised them first;\n\
             - produce one unified review for humans.\n\n\
             Anything still ambiguous, risky or contested after questioning is marked \
             **NEEDS HUMAN REVIEW** with a short reason. Do not force consensus.\n\n\
             You may ask at most {} clarification questions in total; {} used so far.",
            self.name,
            task_and_context(&self.brief),
            self.max_queries,
            self.history.len(),
        );

        if self.allow_queries {
            prompt.push_str(
                "\n\nYou are called in a loop. Each step, either ask ONE reviewer ONE \
                 clarification question, or produce the final review. Before finishing, \
                 ask every other reviewer whether they agree with each P0/P1 issue, and \
                 make sure every reviewer has been asked at least once. Describe issues \
                 neutrally when asking.",
            );
        } else {
            prompt.push_str(
                "\n\nNo clarification questions are allowed in this call. You must \
                 answer with \"state\": \"final\" and the best unified review the \
                 existing material supports.",
            );
        }

        let reviewers = self
            .reviewers
            .iter()
            .map(|name| format!("- {}", name))
            .collect::<Vec<_>>()
            .join("\n");
        let history = if self.history.is_empty() {
            "(no follow-up questions asked yet)".to_string()
        } else {
            self.history
                .iter()
                .enumerate()
                .map(|(i, qa)| {
                    format!(
                        "<QA_EXCHANGE index=\"{}\" reviewer=\"{}\">\nQUESTION:\n{}\n\nANSWER:\n{}\n</QA_EXCHANGE>",
                        i + 1,
                        qa.target,
                        qa.question,
                        qa.answer
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        prompt.push_str(&format!(
            "\n\nReviewers:\n{}\n\n\
             Initial reviews:\n\n{}\n\n\
             Reviews after the cross-check round (authoritative):\n\n{}\n\n\
             Follow-up Q&A so far:\n\n{}",
            reviewers,
            review_blocks("INITIAL_REVIEW", &self.reviews.initial, None),
            review_blocks("REVIEW", &self.reviews.latest, None),
            history,
        ));

        prompt.push_str(&format!(
            "\n\n{ARBITER_PROTOCOL_HEADING}\n\
             QUERIES_ALLOWED: {}\n\n\
             Reply with a single JSON object and nothing else: no code fences, no \
             commentary. Two shapes are valid.\n\n\
             To ask a question:\n\
             {{\"state\": \"query\", \"target_reviewer\": \"<exact name from the list>\", \
             \"question\": \"<one concrete question in English>\", \"reason\": \"<for logs>\"}}\n\n\
             To finish:\n\
             {{\"state\": \"final\", \"final_markdown\": \"<the full Markdown review>\"}}\n\n\
             The final review summarizes the overall picture and lists deduplicated issues. \
             Every issue starts with its priority label, e.g. `[P0] Title`:\n{}\n\
             Under each issue add a line `Models: proposed_by=[...], agreed_by=[...]` \
             using names from the reviewer list. Mention disagreement about an issue or \
             its priority in the item itself and still pick one priority.",
            if self.allow_queries { "yes" } else { "no" },
            PRIORITY_SCALE,
        ));

        if !self.include_low_priority {
            prompt.push_str(
                "\n\nDisplay policy: list only P0 and P1 issues as items. You may say \
                 that lower-priority issues exist, but do not itemize P2 or P3.",
            );
        }

        prompt
    }
}

/// Translate a final report into Simplified Chinese
pub fn translate_zh(markdown: &str) -> String {
    format!(
        "You are a professional technical translator.\n\n\
         Translate the Markdown code review below into Simplified Chinese. Keep all \
         Markdown structure, code blocks and inline code exactly as they are, leave \
         identifiers, file paths and keywords untranslated, and add nothing of your own.\n\n\
         <INPUT_MARKDOWN>\n{}\n</INPUT_MARKDOWN>",
        markdown
    )
}
