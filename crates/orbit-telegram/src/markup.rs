//! Allow-list renderer for generated text sent with Telegram's HTML parse mode.
//!
//! Model output mixes Markdown, block-level HTML and the inline tags Telegram
//! accepts. Rather than patching known bad tags one by one, the text is parsed
//! into a small tag tree and re-emitted with only the approved inline tags.
//! Block tags become line structure and everything else is unwrapped. The
//! output always has balanced tags and escaped stray `<`, `>` and `&`.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9-]*)([^<>]*)>").expect("valid regex"));
/// Zero or more `name="value"` pairs, optionally self-closed. Anything else
/// between `<name` and `>` means the angle brackets were prose, not a tag.
static ATTRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))*\s*/?$"#)
        .expect("valid regex")
});
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:lt|gt|amp|quot|#[0-9]+|#x[0-9A-Fa-f]+);").expect("valid regex")
});
static MD_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("valid regex"));
static SPOILER_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class\s*=\s*["']?tg-spoiler"#).expect("valid regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

/// What a parsed tag means for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bold,
    Italic,
    Underline,
    Strike,
    Spoiler,
    Code,
    Pre,
    Paragraph,
    ListItem,
    Heading,
    /// Unknown or purely structural (`ul`, `span`, `div`…): keep children only.
    Unwrap,
}

impl Kind {
    fn from_tag(name: &str, attrs: &str) -> Self {
        match name {
            "b" | "strong" => Kind::Bold,
            "i" | "em" => Kind::Italic,
            "u" | "ins" => Kind::Underline,
            "s" | "strike" | "del" => Kind::Strike,
            "tg-spoiler" => Kind::Spoiler,
            "span" if SPOILER_CLASS.is_match(attrs) => Kind::Spoiler,
            "code" => Kind::Code,
            "pre" => Kind::Pre,
            "p" => Kind::Paragraph,
            "li" => Kind::ListItem,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Kind::Heading,
            _ => Kind::Unwrap,
        }
    }

    fn inline_tag(self) -> Option<&'static str> {
        match self {
            Kind::Bold => Some("b"),
            Kind::Italic => Some("i"),
            Kind::Underline => Some("u"),
            Kind::Strike => Some("s"),
            Kind::Spoiler => Some("tg-spoiler"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    LineBreak,
    Element { kind: Kind, children: Vec<Node> },
}

struct Frame {
    name: String,
    kind: Kind,
    children: Vec<Node>,
}

/// Parse `input` into a tree. Stray closers are dropped; unclosed tags are
/// closed at the point their parent closes (or at the end of input).
fn parse(input: &str) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    fn push(stack: &mut [Frame], root: &mut Vec<Node>, node: Node) {
        match stack.last_mut() {
            Some(frame) => frame.children.push(node),
            None => root.push(node),
        }
    }

    fn close_top(stack: &mut Vec<Frame>, root: &mut Vec<Node>) {
        if let Some(frame) = stack.pop() {
            let node = Node::Element {
                kind: frame.kind,
                children: frame.children,
            };
            push(stack, root, node);
        }
    }

    let mut cursor = 0;
    for caps in TAG.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > cursor {
            push(&mut stack, &mut root, Node::Text(input[cursor..whole.start()].to_string()));
        }
        cursor = whole.end();

        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let attrs = caps.get(3).map_or("", |m| m.as_str());

        let well_formed = if closing {
            attrs.trim().is_empty()
        } else {
            ATTRS.is_match(attrs)
        };
        if !well_formed {
            push(&mut stack, &mut root, Node::Text(whole.as_str().to_string()));
            continue;
        }

        if name == "br" {
            push(&mut stack, &mut root, Node::LineBreak);
        } else if closing {
            if let Some(depth) = stack.iter().rposition(|f| f.name == name) {
                while stack.len() > depth {
                    close_top(&mut stack, &mut root);
                }
            }
        } else if !attrs.trim_end().ends_with('/') {
            stack.push(Frame {
                kind: Kind::from_tag(&name, attrs),
                name,
                children: Vec::new(),
            });
        }
    }
    if cursor < input.len() {
        push(&mut stack, &mut root, Node::Text(input[cursor..].to_string()));
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut root);
    }
    root
}

/// Escape text for HTML parse mode, leaving well-formed entities alone.
fn escape_text(text: &str, out: &mut String) {
    let mut cursor = 0;
    for entity in ENTITY.find_iter(text) {
        escape_raw(&text[cursor..entity.start()], out);
        out.push_str(entity.as_str());
        cursor = entity.end();
    }
    escape_raw(&text[cursor..], out);
}

fn escape_raw(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn render_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => escape_text(text, out),
            Node::LineBreak => out.push('\n'),
            Node::Element { kind, children } => render_element(*kind, children, out),
        }
    }
}

fn render_element(kind: Kind, children: &[Node], out: &mut String) {
    if let Some(tag) = kind.inline_tag() {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        render_nodes(children, out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
        return;
    }
    match kind {
        // Telegram rejects nested entities inside code, so flatten to text.
        Kind::Code | Kind::Pre => {
            let tag = if kind == Kind::Code { "code" } else { "pre" };
            out.push('<');
            out.push_str(tag);
            out.push('>');
            let mut plain = String::new();
            collect_text(children, &mut plain);
            escape_text(&plain, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Kind::Paragraph => {
            render_nodes(children, out);
            out.push_str("\n\n");
        }
        Kind::ListItem => {
            out.push_str("• ");
            render_nodes(children, out);
            out.push('\n');
        }
        Kind::Heading => {
            out.push_str("<b>");
            render_nodes(children, out);
            out.push_str("</b>\n");
        }
        _ => render_nodes(children, out),
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::LineBreak => out.push('\n'),
            Node::Element { children, .. } => collect_text(children, out),
        }
    }
}

/// Strip Markdown the model was told not to use: heading markers and
/// `**` / `__` emphasis.
fn strip_markdown(input: &str) -> String {
    MD_HEADING
        .replace_all(input, "")
        .replace("**", "")
        .replace("__", "")
}

/// Render generated text as Telegram-safe HTML.
pub fn render_html(input: &str) -> String {
    let cleaned = strip_markdown(input);
    let mut out = String::with_capacity(cleaned.len());
    render_nodes(&parse(&cleaned), &mut out);
    EXCESS_BLANK_LINES
        .replace_all(&out, "\n\n")
        .trim()
        .to_string()
}

/// Escape user-supplied text (profile units, quotes) for HTML parse mode.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_raw(text, &mut out);
    out
}

/// Text content only, with the basic entities decoded. Used for the
/// plain-text fallback when Telegram rejects a rich message.
pub fn plain_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    collect_text(&parse(input), &mut out);
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_inline_tags_survive() {
        let html = render_html("<b>VITALS:</b> BP <u>60/40</u>, <i>ominous</i>");
        assert_eq!(html, "<b>VITALS:</b> BP <u>60/40</u>, <i>ominous</i>");
    }

    #[test]
    fn synonyms_are_normalised() {
        assert_eq!(
            render_html("<strong>a</strong><em>b</em><del>c</del>"),
            "<b>a</b><i>b</i><s>c</s>"
        );
    }

    #[test]
    fn spoiler_span_is_kept() {
        assert_eq!(
            render_html(r#"DIAGNOSIS: <span class="tg-spoiler">Wilson's disease</span>"#),
            "DIAGNOSIS: <tg-spoiler>Wilson's disease</tg-spoiler>"
        );
        // Any other span is just unwrapped.
        assert_eq!(render_html(r#"<span style="x">plain</span>"#), "plain");
    }

    #[test]
    fn block_tags_become_line_structure() {
        let html = render_html("<h2>Case</h2><p>First.</p><p>Second.</p><ul><li>one</li><li>two</li></ul>");
        assert_eq!(html, "<b>Case</b>\nFirst.\n\nSecond.\n\n• one\n• two");
    }

    #[test]
    fn unknown_tags_are_unwrapped() {
        assert_eq!(render_html("<div><blink>hi</blink></div>"), "hi");
        assert_eq!(render_html("<img src=\"x\"/>after"), "after");
    }

    #[test]
    fn stray_angle_brackets_and_ampersands_are_escaped() {
        assert_eq!(
            render_html("K+ < 3.5 & Na > 150 &amp; rising"),
            "K+ &lt; 3.5 &amp; Na &gt; 150 &amp; rising"
        );
    }

    #[test]
    fn unclosed_tags_are_balanced() {
        assert_eq!(render_html("<b>bold <i>both"), "<b>bold <i>both</i></b>");
        assert_eq!(render_html("<b>x <i>y</b> z"), "<b>x <i>y</i></b> z");
    }

    #[test]
    fn comparisons_are_not_tags() {
        assert_eq!(render_html("if a<b and c>d then"), "if a&lt;b and c&gt;d then");
        assert_eq!(
            render_html("<b>ratio</b> x<y z>w"),
            "<b>ratio</b> x&lt;y z&gt;w"
        );
        assert_eq!(render_html("a</b c>d"), "a&lt;/b c&gt;d");
        // Real attributes still parse as tags.
        assert_eq!(render_html("<span class='tg-spoiler' id=x>s</span>"), "<tg-spoiler>s</tg-spoiler>");
    }

    #[test]
    fn stray_closing_tags_are_dropped() {
        assert_eq!(render_html("text</b> more</i>"), "text more");
    }

    #[test]
    fn markdown_is_stripped() {
        assert_eq!(
            render_html("## PATIENT\n**Age:** 34\n### __Labs__"),
            "PATIENT\nAge: 34\nLabs"
        );
    }

    #[test]
    fn code_content_is_flattened() {
        assert_eq!(render_html("<code><b>x</b> < y</code>"), "<code>x &lt; y</code>");
    }

    #[test]
    fn blank_line_runs_collapse() {
        assert_eq!(render_html("<p>a</p>\n\n\n<p>b</p>"), "a\n\nb");
    }

    #[test]
    fn plain_text_drops_tags() {
        assert_eq!(plain_text("<b>Bold</b> and <br>next"), "Bold and \nnext");
    }

    #[test]
    fn escape_leaves_nothing_parseable() {
        assert_eq!(escape("Ob & Gyn <core>"), "Ob &amp; Gyn &lt;core&gt;");
    }

    #[test]
    fn plain_text_decodes_entities() {
        assert_eq!(plain_text("K &lt; 3.5 &amp;&amp; <i>Na</i> &gt; 150"), "K < 3.5 && Na > 150");
    }
}
