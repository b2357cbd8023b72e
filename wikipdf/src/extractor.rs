use kuchiki::traits::*;
use kuchiki::{NodeData, NodeRef};

/// Elements that may carry one of the [`NOISE_CLASSES`].
const NOISE_TAGS: &[&str] = &["div", "table", "ul", "ol", "span", "img", "figure"];

/// Page furniture that is never article text.
const NOISE_CLASSES: &[&str] = &[
    "toc",
    "navbox",
    "infobox",
    "reflist",
    "mw-references-columns",
    "mw-editsection",
    "gallery",
    "thumb",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "dd", "dt", "tr", "table",
    "blockquote", "pre", "ul", "ol", "dl", "figure", "section",
];

/// Remove nodes entirely
fn remove_by_selector(root: &NodeRef, selector: &str) {
    if let Ok(nodes) = root.select(selector) {
        // Collect first: detaching while the iterator walks the tree cuts it short.
        let matched: Vec<_> = nodes.collect();
        for node in matched {
            node.as_node().detach();
        }
    }
}

/// Pull the article text out of a MediaWiki page.
///
/// Returns `None` when the page has no `#mw-content-text` container.
pub fn extract_text(html: &str) -> Option<String> {
    let document = kuchiki::parse_html().one(html);
    let content = document.select_first("#mw-content-text").ok()?;
    let content = content.as_node();

    for tag in NOISE_TAGS {
        for class in NOISE_CLASSES {
            remove_by_selector(content, &format!("{tag}.{class}"));
        }
    }
    for selector in ["script", "style"] {
        remove_by_selector(content, selector);
    }

    let mut raw = String::new();
    collect_text(content, &mut raw, false);
    Some(tidy(&raw))
}

fn collect_text(node: &NodeRef, out: &mut String, preformatted: bool) {
    for child in node.children() {
        match child.data() {
            NodeData::Text(text) => {
                let text = text.borrow();
                if preformatted {
                    out.push_str(&text);
                } else {
                    // Source newlines are layout, not line breaks.
                    out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
                }
            }
            NodeData::Element(el) => {
                let name: &str = &el.name.local;
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push_str("\n\n");
                }
                collect_text(&child, out, preformatted || name == "pre");
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

/// Collapse intra-line whitespace and squeeze blank-line runs to one.
fn tidy(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_break = false;

    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            pending_break = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_break { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        pending_break = false;
    }

    out
}
