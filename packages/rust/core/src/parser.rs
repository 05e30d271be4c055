//! Generated-text → `ParsedPost` parser.
//!
//! A line opens a new post section when, after stripping markdown decoration
//! (`#`, `*`, `_`, `-`, `=`, `>` and whitespace), it is either:
//! - `Post|Option|Variation [#]N` followed by nothing, by a separator
//!   (`: - – — . ) ( |`) and an optional label, or directly by a label naming
//!   a configured style (`--- POST 1 ---`, `## Post 2: Data-Driven`,
//!   `Option 3 (Thought Leadership)`)
//! - `N.` / `N)` followed by a configured style and nothing else apart from
//!   the words "post" and "style" (`1. Storytelling`, `2) **Data-Driven Post**`)
//!
//! After the first header, a header-shaped line only opens a section when it
//! uses the same form (same keyword, or ordinal) and the next number in
//! sequence; otherwise it stays content, so an `Option 1: / Option 2:` list
//! inside a `Post N` section is kept intact.
//!
//! Header lines never contribute content; text before the first header is
//! discarded. When no header exists the whole text is one section.

use std::cmp::Reverse;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use postforge_shared::{ParsedPost, PostConfig, PostforgeError, Result};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `Post 1`, `option #2: ...`, `Variation 3 - ...`.
static LABELED_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(post|option|variation)\s*#?\s*(\d{1,2})\b(.*)$")
        .expect("labeled header regex")
});

/// `1. Storytelling`, `2) Data-Driven Post`.
static ORDINAL_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[.)]\s+(.+)$").expect("ordinal header regex"));

/// `---`, `***`, `===`, `___` on their own line.
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*=_~]{3,}\s*$").expect("separator regex"));

/// Characters that may follow the number in a labeled header.
const HEADER_SEPARATORS: &[char] = &[':', '-', '–', '—', '.', ')', '(', '|'];

/// Words allowed next to the style in an ordinal header.
const FILLER_WORDS: &[&str] = &["post", "style"];

// ---------------------------------------------------------------------------
// PostParser
// ---------------------------------------------------------------------------

/// Splits generated text into posts and validates them.
#[derive(Debug, Clone)]
pub struct PostParser {
    config: PostConfig,
    /// Configured styles, normalized for matching.
    normalized_styles: Vec<String>,
}

/// Which header form opened a section.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderKind {
    /// `Post`, `Option` or `Variation`, lowercased.
    Labeled(String),
    Ordinal,
}

#[derive(Debug, Clone)]
struct Header {
    kind: HeaderKind,
    number: u32,
    /// Index into the configured styles, when the label named one.
    style: Option<usize>,
}

impl Header {
    /// Whether this header may follow `previous` as the next section.
    fn continues(&self, previous: &Header) -> bool {
        self.kind == previous.kind && self.number == previous.number + 1
    }
}

#[derive(Debug, Default)]
struct Section<'a> {
    /// Index into the configured styles, when the header named one.
    style: Option<usize>,
    lines: Vec<&'a str>,
}

impl Section<'_> {
    fn content(&self) -> String {
        let mut lines: &[&str] = &self.lines;
        while let Some((first, rest)) = lines.split_first() {
            if first.trim().is_empty() || SEPARATOR_RE.is_match(first) {
                lines = rest;
            } else {
                break;
            }
        }
        while let Some((last, rest)) = lines.split_last() {
            if last.trim().is_empty() || SEPARATOR_RE.is_match(last) {
                lines = rest;
            } else {
                break;
            }
        }
        lines.join("\n").trim().to_string()
    }
}

impl PostParser {
    pub fn new(config: PostConfig) -> Self {
        let normalized_styles = config.styles.iter().map(|s| normalize(s)).collect();
        Self {
            config,
            normalized_styles,
        }
    }

    /// Parse one generated blob into at most `max_posts` validated posts.
    ///
    /// Fails with `PostforgeError::Parse` when no section survives validation.
    pub fn parse(&self, text: &str) -> Result<Vec<ParsedPost>> {
        let sections = self.split_sections(text);
        let detected = sections.len();
        debug!(detected, "detected post sections");

        let mut kept: Vec<(String, String)> = Vec::new();
        for (index, section) in sections.iter().enumerate() {
            let content = section.content();
            let length = content.chars().count();
            if length < self.config.min_post_length {
                warn!(
                    section = index + 1,
                    length,
                    min = self.config.min_post_length,
                    "dropping malformed post section"
                );
                continue;
            }
            let style = match section.style {
                Some(i) => self.config.styles[i].clone(),
                None => self.ordinal_style(index),
            };
            kept.push((style, content));
        }

        if kept.len() > self.config.max_posts {
            debug!(
                surplus = kept.len() - self.config.max_posts,
                "discarding posts beyond max_posts"
            );
            kept.truncate(self.config.max_posts);
        }

        if kept.is_empty() {
            return Err(PostforgeError::parse(format!(
                "no valid posts among {detected} detected section(s)"
            )));
        }

        let posts: Vec<ParsedPost> = kept
            .into_iter()
            .zip(1u32..)
            .map(|((style, content), id)| ParsedPost { id, style, content })
            .collect();

        for post in &posts {
            if !post.is_optimal_length(self.config.min_word_count, self.config.max_word_count) {
                debug!(
                    id = post.id,
                    words = post.word_count(),
                    "post outside recommended word range"
                );
            }
        }

        Ok(posts)
    }

    fn split_sections<'a>(&self, text: &'a str) -> Vec<Section<'a>> {
        let mut sections: Vec<Section<'a>> = Vec::new();
        let mut last_header: Option<Header> = None;
        let mut preamble = 0usize;

        for line in text.lines() {
            let header = self.header(line).filter(|header| match &last_header {
                None => true,
                Some(previous) => {
                    let opens = header.continues(previous);
                    if !opens {
                        debug!(number = header.number, "out-of-sequence header kept as content");
                    }
                    opens
                }
            });

            if let Some(header) = header {
                sections.push(Section {
                    style: header.style,
                    lines: Vec::new(),
                });
                last_header = Some(header);
            } else if let Some(current) = sections.last_mut() {
                current.lines.push(line);
            } else {
                preamble += 1;
            }
        }

        if sections.is_empty() {
            return vec![Section {
                style: None,
                lines: text.lines().collect(),
            }];
        }
        if preamble > 0 {
            debug!(lines = preamble, "discarding preamble before first post");
        }
        sections
    }

    /// The header `line` forms on its own, before sequencing is considered.
    fn header(&self, line: &str) -> Option<Header> {
        let stripped = strip_decoration(line);
        if stripped.is_empty() {
            return None;
        }

        if let Some(caps) = LABELED_HEADER_RE.captures(stripped) {
            let kind = HeaderKind::Labeled(caps[1].to_lowercase());
            let number = caps[2].parse().ok()?;
            let rest = caps.get(3).map_or("", |m| m.as_str()).trim();
            let style = if rest.is_empty() {
                None
            } else if rest.starts_with(HEADER_SEPARATORS) {
                self.find_style(rest)
            } else {
                // Without a separator only a style label counts.
                Some(self.find_style(rest)?)
            };
            return Some(Header {
                kind,
                number,
                style,
            });
        }

        if let Some(caps) = ORDINAL_HEADER_RE.captures(stripped) {
            let number = caps[1].parse().ok()?;
            let style = self.exact_style(&caps[2])?;
            return Some(Header {
                kind: HeaderKind::Ordinal,
                number,
                style: Some(style),
            });
        }

        None
    }

    /// The configured style mentioned earliest in `label`. At the same
    /// position the longer style wins.
    fn find_style(&self, label: &str) -> Option<usize> {
        let padded = format!(" {} ", normalize(label));
        self.normalized_styles
            .iter()
            .enumerate()
            .filter(|(_, style)| !style.is_empty())
            .filter_map(|(i, style)| {
                let position = padded.find(&format!(" {style} "))?;
                Some((position, Reverse(style.len()), i))
            })
            .min()
            .map(|(_, _, i)| i)
    }

    /// The configured style `label` consists of, ignoring filler words.
    fn exact_style(&self, label: &str) -> Option<usize> {
        let normalized = normalize(label);
        let words: Vec<&str> = normalized
            .split(' ')
            .filter(|w| !w.is_empty() && !FILLER_WORDS.contains(w))
            .collect();
        if words.is_empty() {
            return None;
        }
        let remainder = words.join(" ");
        self.normalized_styles.iter().position(|s| *s == remainder)
    }

    /// Explicit fallback: the Nth detected section takes the Nth style.
    fn ordinal_style(&self, index: usize) -> String {
        index
            .checked_rem(self.config.styles.len())
            .and_then(|i| self.config.styles.get(i))
            .cloned()
            .unwrap_or_default()
    }
}

fn strip_decoration(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || matches!(c, '#' | '*' | '_' | '-' | '=' | '>'))
}

/// Lowercase, every non-alphanumeric run collapsed to one space.
fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            let keep = if c.is_alphanumeric() { c } else { ' ' };
            keep.to_lowercase()
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> PostParser {
        PostParser::new(PostConfig::default())
    }

    fn body(seed: &str) -> String {
        format!(
            "{seed} is reshaping how teams work. Here is what I learned after a year of \
             hands-on experience, and why it matters for your next quarter.\n\n\
             What is your take? #{seed}"
        )
    }

    #[test]
    fn three_labeled_sections() {
        let text = format!(
            "--- POST 1: Data-Driven ---\n{}\n\n--- POST 2: storytelling ---\n{}\n\n--- POST 3: THOUGHT LEADERSHIP ---\n{}\n",
            body("Data"),
            body("Story"),
            body("Vision")
        );
        let posts = parser().parse(&text).unwrap();

        assert_eq!(posts.len(), 3);
        assert_eq!(
            posts.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(posts[0].style, "Data-Driven");
        assert_eq!(posts[1].style, "Storytelling");
        assert_eq!(posts[2].style, "Thought Leadership");
        assert!(posts[0].content.starts_with("Data is reshaping"));
        assert!(!posts[0].content.contains("POST"));
    }

    #[test]
    fn short_section_is_dropped_and_ids_close_the_gap() {
        let text = format!(
            "Post 1: Storytelling\n{}\nPost 2: Data-Driven\nToo short.\nPost 3: Thought Leadership\n{}",
            body("First"),
            body("Third")
        );
        let posts = parser().parse(&text).unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!((posts[0].id, posts[0].style.as_str()), (1, "Storytelling"));
        assert_eq!(
            (posts[1].id, posts[1].style.as_str()),
            (2, "Thought Leadership")
        );
        assert!(posts[1].content.starts_with("Third"));
    }

    #[test]
    fn all_sections_too_short_is_parse_failure() {
        let text = "Post 1\nshort\nPost 2\ntiny\nPost 3\nnope";
        let err = parser().parse(text).unwrap_err();
        assert!(matches!(err, PostforgeError::Parse { .. }));
    }

    #[test]
    fn empty_text_is_parse_failure() {
        assert!(parser().parse("   \n\n").is_err());
    }

    #[test]
    fn markdown_header_variants() {
        let text = format!(
            "## Post 1: Storytelling\n{}\n\n**Post 2 – Data-Driven**\n{}\n\n### Post #3 (Thought Leadership)\n{}",
            body("A"),
            body("B"),
            body("C")
        );
        let posts = parser().parse(&text).unwrap();
        let styles: Vec<_> = posts.iter().map(|p| p.style.as_str()).collect();
        assert_eq!(styles, vec!["Storytelling", "Data-Driven", "Thought Leadership"]);
    }

    #[test]
    fn unlabelled_sections_take_styles_in_detection_order() {
        let text = format!(
            "--- POST 1 ---\n{}\n--- POST 2 ---\n{}\n--- POST 3 ---\n{}",
            body("A"),
            body("B"),
            body("C")
        );
        let posts = parser().parse(&text).unwrap();
        let styles: Vec<_> = posts.iter().map(|p| p.style.as_str()).collect();
        assert_eq!(styles, vec!["Storytelling", "Data-Driven", "Thought Leadership"]);
    }

    #[test]
    fn ordinal_fallback_uses_detection_index_not_survivor_index() {
        let text = format!(
            "Post 1\ntoo short\nPost 2\n{}\nPost 3\n{}",
            body("B"),
            body("C")
        );
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts[0].style, "Data-Driven");
        assert_eq!(posts[1].style, "Thought Leadership");
    }

    #[test]
    fn unknown_label_falls_back_to_ordinal_style() {
        let text = format!("Post 1: Humorous\n{}", body("A"));
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts[0].style, "Storytelling");
    }

    #[test]
    fn ordinal_style_headers() {
        let text = format!(
            "Here are your posts:\n\n1. Storytelling\n{}\n\n2) **Data-Driven Post**\n{}",
            body("A"),
            body("B")
        );
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].style, "Storytelling");
        assert_eq!(posts[1].style, "Data-Driven");
        assert!(!posts[0].content.contains("Here are your posts"));
    }

    #[test]
    fn numbered_list_items_inside_content_are_not_headers() {
        let text = format!(
            "Post 1: Data-Driven\n{}\n1. Adoption grew 40% year over year\n2. Costs fell by half\n",
            body("A")
        );
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].content.contains("2. Costs fell by half"));
    }

    #[test]
    fn prose_starting_with_post_is_not_a_header() {
        let text = format!("Post 1: Storytelling\n{}\nPost 2 of this series goes deeper.", body("A"));
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].content.ends_with("Post 2 of this series goes deeper."));
    }

    #[test]
    fn no_boundaries_yields_single_section() {
        let posts = parser().parse(&body("Solo")).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, 1);
        assert_eq!(posts[0].style, "Storytelling");
    }

    #[test]
    fn edge_separators_are_stripped() {
        let text = format!("Post 1: Storytelling\n---\n\n{}\n\n***\n", body("A"));
        let posts = parser().parse(&text).unwrap();
        assert!(posts[0].content.starts_with('A'));
        assert!(posts[0].content.ends_with("#A"));
    }

    #[test]
    fn results_are_capped_at_max_posts() {
        let text = (1..=5)
            .map(|n| format!("Post {n}\n{}", body("X")))
            .collect::<Vec<_>>()
            .join("\n");
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[2].id, 3);
    }

    #[test]
    fn custom_styles_match_with_separator_drift() {
        let config = PostConfig {
            styles: vec!["How_To".into(), "Hot Take".into()],
            ..PostConfig::default()
        };
        let parser = PostParser::new(config);
        let text = format!("Post 1: hot-take\n{}\nPost 2: how to\n{}", body("A"), body("B"));
        let posts = parser.parse(&text).unwrap();
        assert_eq!(posts[0].style, "Hot Take");
        assert_eq!(posts[1].style, "How_To");
    }

    #[test]
    fn option_list_inside_a_post_stays_content() {
        let text = format!(
            "Post 1: Storytelling\n{}\nOption 1: hire more people\n\
             Option 2: automate the repetitive work\nBoth paths cost money.\n\
             Post 2: Data-Driven\n{}",
            body("A"),
            body("B")
        );
        let posts = parser().parse(&text).unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].style, "Storytelling");
        assert!(posts[0].content.contains("Option 1: hire more people"));
        assert!(posts[0].content.ends_with("Both paths cost money."));
        assert_eq!(posts[1].style, "Data-Driven");
        assert!(posts[1].content.starts_with('B'));
    }

    #[test]
    fn repeated_or_skipped_numbers_stay_content() {
        let text = format!(
            "Post 1: Storytelling\n{}\nPost 1: a recap line\nPost 3: Thought Leadership\n",
            body("A")
        );
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].content.ends_with("Post 3: Thought Leadership"));
    }

    #[test]
    fn option_headers_sequence_among_themselves() {
        let text = format!(
            "Option 1: Storytelling\n{}\nOption 2: Data-Driven\n{}",
            body("A"),
            body("B")
        );
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].style, "Data-Driven");
    }

    #[test]
    fn zero_max_posts_is_parse_failure() {
        let config = PostConfig {
            max_posts: 0,
            ..PostConfig::default()
        };
        let err = PostParser::new(config).parse(&body("A")).unwrap_err();
        assert!(matches!(err, PostforgeError::Parse { .. }));
    }

    #[test]
    fn non_ascii_styles_match_case_insensitively() {
        let config = PostConfig {
            styles: vec!["Éclairage".into(), "Données".into()],
            ..PostConfig::default()
        };
        let text = format!("Post 1: DONNÉES\n{}\nPost 2: éclairage\n{}", body("A"), body("B"));
        let posts = PostParser::new(config).parse(&text).unwrap();
        assert_eq!(posts[0].style, "Données");
        assert_eq!(posts[1].style, "Éclairage");
    }

    #[test]
    fn label_naming_two_styles_takes_the_first_mentioned() {
        let text = format!("Post 1: Data-Driven Storytelling\n{}", body("A"));
        let posts = parser().parse(&text).unwrap();
        assert_eq!(posts[0].style, "Data-Driven");
    }

    #[test]
    fn normalize_collapses_punctuation() {
        assert_eq!(normalize("  **Data-Driven**_Post "), "data driven post");
        assert_eq!(normalize("DONNÉES"), "données");
    }
}
