//! JIRA wiki markup to GitHub-flavored Markdown conversion.
//!
//! A pure text transform with no side effects: same input, same output.
//! The passes run in a fixed order so emphasis, code spans and code blocks
//! do not corrupt each other's output. Constructs that cannot be converted
//! are left in place as literal text.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^h([1-6])\.\s+(.+)$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(\S.*?\S)\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\S.*?\S)_").unwrap());
static STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\S.*?\S)-").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());
static CODE_BLOCK_LANG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{code:([^}]+)\}(.*?)\{code\}").unwrap());
static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{code\}(.*?)\{code\}").unwrap());
static NOFORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{noformat\}(.*?)\{noformat\}").unwrap());
static QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{quote\}(.*?)\{quote\}").unwrap());
static LINK_ALIASED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^|\]]+)\|([^\]]+)\]").unwrap());
static LINK_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(https?://[^\]|]+)\]").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\* ").unwrap());
static COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{color:[^}]+\}(.*?)\{color\}").unwrap());
static PANEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{panel:?[^}]*\}(.*?)\{panel\}").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!([^!|]+)!").unwrap());
static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[~([^\]]+)\]").unwrap());

/// Converts JIRA wiki markup to GitHub-flavored Markdown.
///
/// Empty input yields an empty string. Malformed constructs (an unclosed
/// code block, a link with no URL) pass through unchanged rather than
/// producing an error.
#[must_use]
pub fn jira_to_markdown(jira_text: &str) -> String {
    if jira_text.is_empty() {
        return String::new();
    }

    // Headings: h2. Title -> ## Title
    let text = HEADING.replace_all(jira_text, |caps: &regex::Captures<'_>| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("{} {}", "#".repeat(level), &caps[2])
    });

    // Emphasis runs before code spans, matching JIRA's own precedence.
    let text = BOLD.replace_all(&text, "**${1}**");
    let text = ITALIC.replace_all(&text, "*${1}*");
    let text = STRIKETHROUGH.replace_all(&text, "~~${1}~~");
    let text = INLINE_CODE.replace_all(&text, "`${1}`");

    // Fenced code blocks, with and without a language.
    let text = CODE_BLOCK_LANG.replace_all(&text, "```${1}${2}```");
    let text = CODE_BLOCK.replace_all(&text, "```${1}```");
    let text = NOFORMAT.replace_all(&text, "```${1}```");

    let text = QUOTE.replace_all(&text, |caps: &regex::Captures<'_>| {
        quote_lines(&caps[1])
    });

    // Aliased links first; the bare form only matches URLs so the output
    // of this pass is not re-matched.
    let text = LINK_ALIASED.replace_all(&text, "[${1}](${2})");
    let text = LINK_BARE.replace_all(&text, "<${1}>");

    let text = BULLET.replace_all(&text, "- ");

    // Table header delimiters: || -> |
    let text = text.replace("||", "|");

    let text = COLOR.replace_all(&text, "${1}");
    let text = PANEL.replace_all(&text, |caps: &regex::Captures<'_>| quote_lines(&caps[1]));

    // The image target stays remote to the source tracker; keeping the
    // filename at least preserves what was referenced.
    let text = IMAGE.replace_all(&text, "![${1}](${1})");
    let text = MENTION.replace_all(&text, "@${1}");

    text.into_owned()
}

/// Prefixes every line of `content` with `> `.
fn quote_lines(content: &str) -> String {
    content
        .split('\n')
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_returns_empty_string() {
        assert_eq!(jira_to_markdown(""), "");
    }

    #[test]
    fn converts_headings() {
        assert_eq!(jira_to_markdown("h2. Title"), "## Title");
        assert_eq!(jira_to_markdown("h1. Top"), "# Top");
        assert_eq!(jira_to_markdown("h6. Deep"), "###### Deep");
        assert_eq!(
            jira_to_markdown("h2. First\nplain\nh3. Second"),
            "## First\nplain\n### Second"
        );
    }

    #[test]
    fn converts_emphasis() {
        assert_eq!(jira_to_markdown("*bold*"), "**bold**");
        assert_eq!(jira_to_markdown("_italic_"), "*italic*");
        assert_eq!(jira_to_markdown("-gone-"), "~~gone~~");
    }

    #[test]
    fn converts_inline_code() {
        assert_eq!(jira_to_markdown("{{code}}"), "`code`");
        assert_eq!(jira_to_markdown("use {{foo.bar()}} here"), "use `foo.bar()` here");
    }

    #[test]
    fn converts_code_blocks() {
        assert_eq!(
            jira_to_markdown("{code:java}\nint x = 1;\n{code}"),
            "```java\nint x = 1;\n```"
        );
        assert_eq!(jira_to_markdown("{code}\nplain\n{code}"), "```\nplain\n```");
        assert_eq!(
            jira_to_markdown("{noformat}\nraw text\n{noformat}"),
            "```\nraw text\n```"
        );
    }

    #[test]
    fn converts_quotes_and_panels() {
        assert_eq!(jira_to_markdown("{quote}a\nb{quote}"), "> a\n> b");
        assert_eq!(
            jira_to_markdown("{panel:title=Note}watch out{panel}"),
            "> watch out"
        );
    }

    #[test]
    fn converts_links() {
        assert_eq!(
            jira_to_markdown("[text|http://x]"),
            "[text](http://x)"
        );
        assert_eq!(
            jira_to_markdown("[https://example.com]"),
            "<https://example.com>"
        );
        // Aliased output is not re-matched by the bare-link pass.
        assert_eq!(
            jira_to_markdown("see [docs|https://example.com/docs] please"),
            "see [docs](https://example.com/docs) please"
        );
    }

    #[test]
    fn converts_lists_and_tables() {
        assert_eq!(jira_to_markdown("* one\n* two"), "- one\n- two");
        assert_eq!(
            jira_to_markdown("||Name||Value||\n|a|1|"),
            "|Name|Value|\n|a|1|"
        );
    }

    #[test]
    fn strips_color_markup() {
        assert_eq!(jira_to_markdown("{color:red}warning{color}"), "warning");
    }

    #[test]
    fn converts_images_and_mentions() {
        assert_eq!(
            jira_to_markdown("!screenshot.png!"),
            "![screenshot.png](screenshot.png)"
        );
        assert_eq!(jira_to_markdown("ping [~jsmith]"), "ping @jsmith");
    }

    #[test]
    fn malformed_constructs_pass_through() {
        assert_eq!(jira_to_markdown("{code}never closed"), "{code}never closed");
        assert_eq!(jira_to_markdown("[|]"), "[|]");
        assert_eq!(jira_to_markdown("a lone * star"), "a lone * star");
    }

    #[test]
    fn deterministic_on_mixed_document() {
        let input = "h1. Release\n*bold* and {{mono}}\n{quote}said{quote}\n* item";
        let expected = "# Release\n**bold** and `mono`\n> said\n- item";
        assert_eq!(jira_to_markdown(input), expected);
        assert_eq!(jira_to_markdown(input), expected);
    }
}
