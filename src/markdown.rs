//! Converts post bodies from Markdown to HTML. The build only depends on the
//! [`ContentRenderer`] trait; [`MarkdownRenderer`] is the pulldown-cmark
//! implementation used by the binary.
//!
//! On top of CommonMark (plus tables, footnotes, strikethrough and task
//! lists) the renderer rewrites the event stream to:
//!
//! * pass `$…$` and `$$…$$` math through untouched, wrapped in
//!   `arithmatex` containers for client-side typesetting;
//! * render code blocks as a two-column table with line numbers, the code
//!   highlighted with syntect by the fence's language (plain text when the
//!   language is unknown);
//! * render `mermaid` fences as `<div class="mermaid">` containers;
//! * turn soft line breaks into `<br />`;
//! * link bare `http(s)://` and `www.` URLs.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::sync::OnceLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{append_highlighted_html_for_styled_line, IncludeBackground};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use thiserror::Error;

/// Renders a Markdown body to an HTML fragment.
pub trait ContentRenderer: Sync {
    fn render(&self, markdown: &str) -> Result<String>;
}

/// The color scheme used for code blocks.
const CODE_THEME: &str = "InspiredGitHub";

/// The pulldown-cmark backed [`ContentRenderer`].
pub struct MarkdownRenderer {
    options: Options,
    highlighter: Highlighter,
}

// Syntax definitions and the color scheme, loaded once per renderer.
struct Highlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
}

impl Default for Highlighter {
    fn default() -> Self {
        Highlighter {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            theme: ThemeSet::load_defaults()
                .themes
                .remove(CODE_THEME)
                .unwrap_or_default(),
        }
    }
}

impl Highlighter {
    // Renders `code` as a sequence of styled spans.
    fn highlight(&self, lang: &str, code: &str) -> Result<String> {
        let syntax = self
            .syntaxes
            .find_syntax_by_token(lang)
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());
        let mut lines = HighlightLines::new(syntax, &self.theme);
        let mut html = String::with_capacity(code.len() * 4);
        for line in LinesWithEndings::from(code) {
            let regions = lines.highlight_line(line, &self.syntaxes)?;
            append_highlighted_html_for_styled_line(&regions, IncludeBackground::No, &mut html)?;
        }
        Ok(html)
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_MATH);
        MarkdownRenderer {
            options,
            highlighter: Highlighter::default(),
        }
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentRenderer for MarkdownRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        let mut converter = EventConverter::new(&self.highlighter);
        for event in TextMergeStream::new(Parser::new_ext(markdown, self.options)) {
            converter.convert(event)?;
        }

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, converter.events.into_iter());
        Ok(out)
    }
}

/// The fence label that produces a diagram container instead of a code
/// block.
const MERMAID: &str = "mermaid";

// An open code block: its language and the text collected so far.
struct CodeBlock {
    lang: String,
    text: String,
}

struct EventConverter<'a> {
    highlighter: &'a Highlighter,
    events: Vec<Event<'a>>,
    code: Option<CodeBlock>,

    // Depth of open links and images; URLs inside them are left alone.
    link_depth: usize,
}

impl<'a> EventConverter<'a> {
    fn new(highlighter: &'a Highlighter) -> Self {
        EventConverter {
            highlighter,
            events: Vec::new(),
            code: None,
            link_depth: 0,
        }
    }

    fn convert(&mut self, event: Event<'a>) -> Result<()> {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_owned()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some(CodeBlock {
                    lang,
                    text: String::new(),
                });
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = self.code.take() {
                    self.push_code_block(block)?;
                }
            }
            Event::Text(text) if self.code.is_some() => {
                if let Some(block) = self.code.as_mut() {
                    block.text.push_str(&text);
                }
            }
            Event::Start(tag @ (Tag::Link { .. } | Tag::Image { .. })) => {
                self.link_depth += 1;
                self.events.push(Event::Start(tag));
            }
            Event::End(tag @ (TagEnd::Link | TagEnd::Image)) => {
                self.link_depth = self.link_depth.saturating_sub(1);
                self.events.push(Event::End(tag));
            }
            Event::Text(text) if self.link_depth == 0 => self.push_autolinked(text),
            Event::SoftBreak => self.events.push(Event::HardBreak),
            Event::InlineMath(math) => {
                self.events.push(inline_html(r#"<span class="arithmatex">\("#));
                self.events.push(Event::Text(math));
                self.events.push(inline_html(r"\)</span>"));
            }
            // Display math sits inside a paragraph, so it stays phrasing
            // content; the stylesheet makes it a block.
            Event::DisplayMath(math) => {
                self.events.push(inline_html(
                    r#"<span class="arithmatex arithmatex-display">\["#,
                ));
                self.events.push(Event::Text(math));
                self.events.push(inline_html(r"\]</span>"));
            }
            event => self.events.push(event),
        }
        Ok(())
    }

    fn push_code_block(&mut self, block: CodeBlock) -> Result<()> {
        if block.lang == MERMAID {
            self.events.push(block_html(r#"<div class="mermaid">"#.to_owned()));
            self.events.push(Event::Text(block.text.into()));
            self.events.push(block_html("</div>\n".to_owned()));
            return Ok(());
        }

        let line_numbers = (1..=block.text.lines().count().max(1))
            .map(|n| n.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        let code_open = match block.lang.is_empty() {
            true => "<code>".to_owned(),
            false => format!(r#"<code class="language-{}">"#, attribute(&block.lang)),
        };
        let code = self.highlighter.highlight(&block.lang, &block.text)?;
        self.events.push(block_html(format!(
            concat!(
                r#"<div class="highlight"><table class="highlighttable"><tr>"#,
                r#"<td class="linenos"><pre>{}</pre></td>"#,
                r#"<td class="code"><pre>{}{}</code></pre></td></tr></table></div>"#,
                "\n",
            ),
            line_numbers, code_open, code,
        )));
        Ok(())
    }

    fn push_autolinked(&mut self, text: CowStr<'a>) {
        let mut last = 0;
        let mut linked = false;
        for found in url_pattern().find_iter(&text) {
            let url = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
            if url.is_empty() {
                continue;
            }
            let start = found.start();
            let end = start + url.len();
            if start > last {
                self.events
                    .push(Event::Text(text[last..start].to_owned().into()));
            }
            let href = match url.starts_with("www.") {
                true => format!("http://{}", url),
                false => url.to_owned(),
            };
            self.events
                .push(inline_html(format!(r#"<a href="{}">"#, attribute(&href))));
            self.events.push(Event::Text(url.to_owned().into()));
            self.events.push(inline_html("</a>"));
            last = end;
            linked = true;
        }

        match (linked, last < text.len()) {
            (false, _) => self.events.push(Event::Text(text)),
            (true, true) => self
                .events
                .push(Event::Text(text[last..].to_owned().into())),
            (true, false) => {}
        }
    }
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '\''];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?:https?://|www\.)[^\s<>"]+"#).expect("url pattern is valid")
    })
}

fn inline_html<'a>(html: impl Into<CowStr<'a>>) -> Event<'a> {
    Event::InlineHtml(html.into())
}

fn block_html<'a>(html: String) -> Event<'a> {
    Event::Html(html.into())
}

// Escapes a value for use inside a double-quoted attribute.
fn attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// The result of rendering Markdown.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error converting Markdown to HTML.
#[derive(Debug, Error)]
pub enum Error {
    /// A code block could not be highlighted.
    #[error("highlighting code block: {0}")]
    Highlight(#[from] syntect::Error),
}
