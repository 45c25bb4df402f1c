//! Post-processing of the arbiter's final report.

use crate::agent::Agent;
use crate::prompt;
use crate::runner::Invoker;
use regex::Regex;
use tracing::{info, warn};

struct Patterns {
    item: Regex,
    list: Regex,
    heading: Regex,
}

fn patterns() -> Option<Patterns> {
    Some(Patterns {
        item: Regex::new(r"^(\s*)(?:[-*+]|\d+[.)])\s+(?:\*\*)?\[P[23]\]").ok()?,
        list: Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s").ok()?,
        heading: Regex::new(r"^(#{1,6})\s+(?:\*\*)?\[?P[23]\b").ok()?,
    })
}

enum Skip {
    /// List item at this indentation; `after_blank` once a blank line was seen
    Item { indent: usize, after_blank: bool },
    /// Heading of this level
    Section(usize),
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn heading_level(line: &str) -> Option<usize> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6)
        .contains(&hashes)
        .then_some(hashes)
        .filter(|_| line[hashes..].starts_with(' '))
}

/// Drop itemized P2/P3 entries: list items and headings labelled `[P2]` or
/// `[P3]` together with their continuation lines, and `P2`/`P3` sections.
pub fn suppress_low_priority(markdown: &str) -> String {
    let Some(patterns) = patterns() else {
        return markdown.to_string();
    };

    let mut kept: Vec<&str> = Vec::new();
    let mut skip: Option<Skip> = None;
    let mut dropped = 0usize;

    for line in markdown.lines() {
        if let Some(active) = &mut skip {
            let blank = line.trim().is_empty();
            let ends = match &*active {
                Skip::Item { .. } if blank => false,
                Skip::Item { .. } if heading_level(line).is_some() => true,
                Skip::Item { indent, .. } if indent_of(line) > *indent => false,
                // Lazy continuation: unindented text directly under the item
                Skip::Item { after_blank, .. } => *after_blank || patterns.list.is_match(line),
                Skip::Section(level) => heading_level(line).is_some_and(|l| l <= *level),
            };
            if blank {
                if let Skip::Item { after_blank, .. } = active {
                    *after_blank = true;
                }
            }
            if !ends {
                continue;
            }
            skip = None;
        }

        if let Some(caps) = patterns.heading.captures(line) {
            skip = Some(Skip::Section(caps[1].len()));
            dropped += 1;
            continue;
        }
        if let Some(caps) = patterns.item.captures(line) {
            skip = Some(Skip::Item {
                indent: caps[1].len(),
                after_blank: false,
            });
            dropped += 1;
            continue;
        }
        kept.push(line);
    }

    if dropped > 0 {
        info!("Suppressed {} low-priority entries", dropped);
    }

    // Collapse blank runs left behind by removed items
    let mut out: Vec<&str> = Vec::with_capacity(kept.len());
    for line in kept {
        if line.trim().is_empty() && out.last().is_some_and(|prev| prev.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim_end().to_string()
}

/// Translate the report into Simplified Chinese through the arbiter's
/// backend. Any failure keeps the original text.
pub async fn translate_zh(invoker: &Invoker, arbiter: &Agent, report: &str) -> String {
    info!("Translating final report to Chinese");
    match invoker.call(arbiter, &prompt::translate_zh(report)).await {
        Ok(translated) if !translated.trim().is_empty() => translated.trim().to_string(),
        Ok(_) => {
            warn!("Translation returned no text; keeping the English report");
            report.to_string()
        }
        Err(e) => {
            warn!("Translation to Chinese failed: {}", e);
            report.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Family, RetryConfig};
    use crate::provider::testing::{Reply, ScriptedRunner};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    const REPORT: &str = "\
## Summary
One blocking bug, some polish.

## Issues

1. [P0] Null dereference in parser
   Models: proposed_by=[A], agreed_by=[B]
2. [P2] Rename helper
   Models: proposed_by=[B], agreed_by=[]

   Details that belong to the P2 item.
3. [P1] Missing timeout
   Models: proposed_by=[A, B], agreed_by=[]
- **[P3] Typo in comment**

### [P2] Logging is noisy
Lower the level.

## P3 issues
1. Whitespace

## Closing
Ship after the P0 fix.";

    #[test]
    fn test_low_priority_items_removed() {
        let out = suppress_low_priority(REPORT);
        assert!(out.contains("[P0] Null dereference"));
        assert!(out.contains("[P1] Missing timeout"));
        assert!(out.contains("Models: proposed_by=[A, B]"));
        assert!(out.contains("## Closing"));
        assert!(out.contains("Ship after the P0 fix."));

        assert!(!out.contains("[P2]"));
        assert!(!out.contains("[P3]"));
        assert!(!out.contains("Rename helper"));
        assert!(!out.contains("Details that belong"));
        assert!(!out.contains("Lower the level"));
        assert!(!out.contains("Whitespace"));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn test_high_priority_only_report_unchanged() {
        let report = "## Issues\n\n1. [P0] Crash\n   details\n2. [P1] Leak";
        assert_eq!(suppress_low_priority(report), report);
    }

    #[test]
    fn test_unindented_continuation_goes_with_item() {
        let report = "1. [P0] A\n   Models: x\n2. [P2] B\nModels: proposed_by=[B]\n3. [P1] C";
        assert_eq!(
            suppress_low_priority(report),
            "1. [P0] A\n   Models: x\n3. [P1] C"
        );
    }

    #[test]
    fn test_paragraph_after_blank_line_is_kept() {
        let report = "- [P3] Nit\nstill the nit\n\nSummary paragraph.";
        assert_eq!(suppress_low_priority(report), "Summary paragraph.");
    }

    #[test]
    fn test_heading_level_detection() {
        assert_eq!(heading_level("## Title"), Some(2));
        assert_eq!(heading_level("#hashtag"), None);
        assert_eq!(heading_level("plain"), None);
    }

    fn arbiter(runner: Arc<ScriptedRunner>) -> Agent {
        Agent {
            name: "Arbiter[test]".to_string(),
            family: Family::Codex,
            model: "m".to_string(),
            workdir: PathBuf::from("."),
            memo_dir: PathBuf::from("."),
            backend: runner,
        }
    }

    fn invoker() -> Invoker {
        Invoker::new(
            Duration::from_secs(5),
            RetryConfig {
                max_attempts: 1,
                backoff_base_ms: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_english() {
        let runner = Arc::new(ScriptedRunner::new(vec![Reply::Exit(2)]));
        let out = translate_zh(&invoker(), &arbiter(runner), "## Review").await;
        assert_eq!(out, "## Review");
    }

    #[tokio::test]
    async fn test_translation_success() {
        let runner = Arc::new(ScriptedRunner::new(vec![Reply::text("## 审查\n")]));
        let out = translate_zh(&invoker(), &arbiter(runner.clone()), "## Review").await;
        assert_eq!(out, "## 审查");
        assert!(runner.prompt(0).contains("<INPUT_MARKDOWN>\n## Review\n"));
    }
}
