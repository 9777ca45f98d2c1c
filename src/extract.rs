//! Selector-priority field extraction.
//!
//! Site modules describe *where* a field lives as an ordered slice of rules;
//! the functions here try each rule in turn and return the first non-empty
//! result. Adding a site or a fallback means adding data, not branches.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One way of locating a short text field (title, timestamp, source).
#[derive(Debug, Clone, Copy)]
pub enum TextRule {
    /// First element matching a CSS selector.
    Css(&'static str),
    /// First element with a class containing any of the given fragments.
    ClassContains(&'static [&'static str]),
}

/// One way of locating an article body.
#[derive(Debug, Clone, Copy)]
pub enum BodyRule {
    /// `<p>` blocks inside the first element matching the selector,
    /// joined by blank lines.
    ContainerParagraphs(&'static str),
    /// All text inside the first element matching the selector, with
    /// `<script>` and `<style>` content dropped.
    ContainerText(&'static str),
    /// Every `<p>` in the page longer than `min_chars` characters.
    LongParagraphs { min_chars: usize },
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!(css, error = ?e, "Skipping unparsable selector");
            None
        }
    }
}

/// Collapse every whitespace run into a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Number of characters (not bytes) in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Concatenated, trimmed text of an element.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text of an element excluding anything under `<script>` or `<style>`.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        if let Some(text) = node.value().as_text() {
            let hidden = node.ancestors().any(|a| {
                matches!(
                    a.value().as_element().map(|e| e.name()),
                    Some("script") | Some("style")
                )
            });
            if !hidden {
                out.push_str(text);
            }
        }
    }
    out
}

/// First value among `attrs` present and non-empty on `el`.
pub fn first_attr(el: ElementRef<'_>, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .filter_map(|name| el.value().attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve `href` against `base`; absolute and scheme-relative URLs pass through.
pub fn resolve(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

fn has_class_fragment(el: ElementRef<'_>, fragments: &[&str]) -> bool {
    el.value()
        .classes()
        .any(|class| fragments.iter().any(|f| class.contains(f)))
}

/// Elements under `root` whose class contains any of `fragments`.
pub fn elements_with_class<'a>(
    root: ElementRef<'a>,
    tag: Option<&str>,
    fragments: &[&str],
) -> Vec<ElementRef<'a>> {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| tag.is_none_or(|t| el.value().name() == t))
        .filter(|el| has_class_fragment(*el, fragments))
        .collect()
}

/// Apply `rules` to the subtree under `root`; first non-empty text wins.
pub fn first_text_in(root: ElementRef<'_>, rules: &[TextRule]) -> Option<String> {
    for rule in rules {
        let found = match rule {
            TextRule::Css(css) => selector(css).and_then(|sel| {
                root.select(&sel).map(text_of).find(|t| !t.is_empty())
            }),
            TextRule::ClassContains(fragments) => elements_with_class(root, None, fragments)
                .into_iter()
                .map(text_of)
                .find(|t| !t.is_empty()),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Apply `rules` to a whole document; first non-empty text wins.
pub fn first_text(doc: &Html, rules: &[TextRule]) -> Option<String> {
    first_text_in(doc.root_element(), rules)
}

/// Extract an article body, whitespace-collapsed, from the first rule that
/// yields anything.
pub fn first_body(doc: &Html, rules: &[BodyRule]) -> Option<String> {
    rules
        .iter()
        .filter_map(|rule| apply_body_rule(doc, rule))
        .map(|raw| collapse_whitespace(&raw))
        .find(|body| !body.is_empty())
}

fn apply_body_rule(doc: &Html, rule: &BodyRule) -> Option<String> {
    match rule {
        BodyRule::ContainerParagraphs(css) => {
            let container = doc.select(&selector(css)?).next()?;
            let p = selector("p")?;
            let paragraphs: Vec<String> = container
                .select(&p)
                .map(text_of)
                .filter(|t| !t.is_empty())
                .collect();
            (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
        }
        BodyRule::ContainerText(css) => {
            let container = doc.select(&selector(css)?).next()?;
            let text = visible_text(container);
            (!text.trim().is_empty()).then_some(text)
        }
        BodyRule::LongParagraphs { min_chars } => {
            let p = selector("p")?;
            let paragraphs: Vec<String> = doc
                .select(&p)
                .map(text_of)
                .filter(|t| char_len(t) > *min_chars)
                .collect();
            (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
        }
    }
}

/// Every element matching any selector in `selectors`, in selector order.
pub fn select_each<'a>(doc: &'a Html, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .filter_map(|css| selector(css))
        .flat_map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .collect()
}

/// Elements matching the first selector in `selectors` that matches anything.
pub fn select_first_matching<'a>(doc: &'a Html, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    for css in selectors {
        if let Some(sel) = selector(css) {
            let found: Vec<ElementRef<'a>> = doc.select(&sel).collect();
            if !found.is_empty() {
                debug!(css, count = found.len(), "Listing selector matched");
                return found;
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html><body>
          <h1> 航母编队 远海训练 </h1>
          <div class="meta"><span class="pub-date">2025-05-06 10:00</span>
            <span class="source-name">新华社</span></div>
          <div class="article-body">
            <script>var x = 1;</script>
            <style>.a{}</style>
            正文第一段。
            <p>第二段</p>
          </div>
          <p>这是一段长度足够超过二十个字符的段落文本用于测试回退逻辑。</p>
          <p>太短</p>
        </body></html>
    "#;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace("\n\n"), "");
    }

    #[test]
    fn test_first_text_tries_rules_in_order() {
        let doc = Html::parse_document(ARTICLE);
        let title = first_text(&doc, &[TextRule::Css("h2"), TextRule::Css("h1")]);
        assert_eq!(title.as_deref(), Some("航母编队 远海训练"));
    }

    #[test]
    fn test_first_text_class_fragment() {
        let doc = Html::parse_document(ARTICLE);
        let time = first_text(
            &doc,
            &[TextRule::Css("span.time"), TextRule::ClassContains(&["time", "date"])],
        );
        assert_eq!(time.as_deref(), Some("2025-05-06 10:00"));

        let source = first_text(&doc, &[TextRule::ClassContains(&["source"])]);
        assert_eq!(source.as_deref(), Some("新华社"));
    }

    #[test]
    fn test_first_text_none_when_nothing_matches() {
        let doc = Html::parse_document(ARTICLE);
        assert_eq!(first_text(&doc, &[TextRule::Css(".missing")]), None);
    }

    #[test]
    fn test_container_text_drops_script_and_style() {
        let doc = Html::parse_document(ARTICLE);
        let body = first_body(&doc, &[BodyRule::ContainerText(".article-body")]).unwrap();
        assert_eq!(body, "正文第一段。 第二段");
    }

    #[test]
    fn test_container_paragraphs() {
        let doc = Html::parse_document(ARTICLE);
        let body = first_body(
            &doc,
            &[
                BodyRule::ContainerParagraphs("div.article-content"),
                BodyRule::ContainerParagraphs("div.article-body"),
            ],
        );
        assert_eq!(body.as_deref(), Some("第二段"));
    }

    #[test]
    fn test_long_paragraph_fallback() {
        let doc = Html::parse_document(ARTICLE);
        let body = first_body(
            &doc,
            &[
                BodyRule::ContainerText("#nowhere"),
                BodyRule::LongParagraphs { min_chars: 20 },
            ],
        )
        .unwrap();
        assert!(body.starts_with("这是一段长度足够"));
        assert!(!body.contains("太短"));
    }

    #[test]
    fn test_first_attr_prefers_order() {
        let doc = Html::parse_fragment(r#"<img src="" data-src="/a.jpg" data-original="/b.jpg">"#);
        let sel = Selector::parse("img").unwrap();
        let img = doc.select(&sel).next().unwrap();
        assert_eq!(
            first_attr(img, &["src", "data-src", "data-original"]).as_deref(),
            Some("/a.jpg")
        );
    }

    #[test]
    fn test_resolve_relative_and_scheme_relative() {
        let base = Url::parse("https://mil.news.sina.com.cn/").unwrap();
        assert_eq!(
            resolve(&base, "/china/2025-05-06/doc.shtml").as_deref(),
            Some("https://mil.news.sina.com.cn/china/2025-05-06/doc.shtml")
        );
        assert_eq!(
            resolve(&base, "//n.sinaimg.cn/a.jpg").as_deref(),
            Some("https://n.sinaimg.cn/a.jpg")
        );
    }

    #[test]
    fn test_select_first_matching_stops_at_first_hit() {
        let doc = Html::parse_document(
            r#"<div class="news-item">a</div><div class="ty-card">b</div><div class="ty-card">c</div>"#,
        );
        let found = select_first_matching(&doc, &[".missing", ".ty-card", ".news-item"]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_char_len_counts_cjk_as_one() {
        assert_eq!(char_len("军事新闻"), 4);
    }
}
