//! Link heuristics for Canvas module pages.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::scrape::{LinkExtractor, LinkSource, ScrapedLink};

fn selector(css: &'static str, cell: &'static OnceLock<Selector>) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

fn anchors() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector("a[href]", &CELL)
}

fn item_containers() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector("li[class], div[class]", &CELL)
}

fn attachment_sections() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector("div[class], section[class]", &CELL)
}

fn module_item_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)module.*item|context_module_item").expect("static regex"))
}

fn attachment_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)attachment|file").expect("static regex"))
}

fn file_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/files/\d+|\.(pdf|docx?|pptx?|xlsx?|txt|csv|zip|jpe?g|png|gif)($|\?)")
            .expect("static regex")
    })
}

fn module_item_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/modules/items/\d+").expect("static regex"))
}

fn size_in_parens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([0-9.]+\s*[KMGT]?B)\)").expect("static regex"))
}

fn size_anywhere() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([0-9.]+\s*[KMGT]?B)\b").expect("static regex"))
}

/// Default extractor for Canvas markup.
///
/// Three independent passes run over the page: module item containers,
/// attachment sections, then every anchor on the page.
#[derive(Debug, Default, Clone)]
pub struct CanvasMarkupExtractor;

impl CanvasMarkupExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for CanvasMarkupExtractor {
    fn name(&self) -> &str {
        "canvas_markup"
    }

    fn extract(&self, html: &str, page_url: &Url) -> Vec<ScrapedLink> {
        let document = Html::parse_document(html);
        let mut collector = Collector::new(page_url);

        for container in document.select(item_containers()) {
            if !class_matches(&container, module_item_class()) {
                continue;
            }
            for anchor in container.select(anchors()) {
                let href = anchor.value().attr("href").unwrap_or_default();
                if file_href().is_match(href) || module_item_href().is_match(href) {
                    collector.push(&anchor, href, LinkSource::ModuleItem);
                }
            }
        }

        for section in document.select(attachment_sections()) {
            if !class_matches(&section, attachment_class()) {
                continue;
            }
            for anchor in section.select(anchors()) {
                let href = anchor.value().attr("href").unwrap_or_default();
                if file_href().is_match(href) {
                    collector.push(&anchor, href, LinkSource::Attachment);
                }
            }
        }

        for anchor in document.select(anchors()) {
            let href = anchor.value().attr("href").unwrap_or_default();
            if file_href().is_match(href) {
                collector.push(&anchor, href, LinkSource::DirectLink);
            }
        }

        tracing::debug!(
            page = %page_url,
            links = collector.links.len(),
            "Extracted file links"
        );
        collector.links
    }
}

fn class_matches(element: &ElementRef<'_>, pattern: &Regex) -> bool {
    element
        .value()
        .attr("class")
        .map(|class| pattern.is_match(class))
        .unwrap_or(false)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Collector<'a> {
    page_url: &'a Url,
    seen: HashSet<String>,
    links: Vec<ScrapedLink>,
}

impl<'a> Collector<'a> {
    fn new(page_url: &'a Url) -> Self {
        Self {
            page_url,
            seen: HashSet::new(),
            links: Vec::new(),
        }
    }

    fn push(&mut self, anchor: &ElementRef<'_>, href: &str, source: LinkSource) {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return;
        }
        let Ok(mut url) = self.page_url.join(href) else {
            tracing::debug!(href, "Skipping unparsable link");
            return;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return;
        }
        url.set_fragment(None);

        if !self.seen.insert(url.to_string()) {
            return;
        }

        let text = collapse_whitespace(&anchor.text().collect::<String>());
        let label = ["title", "data-filename", "aria-label"]
            .iter()
            .filter_map(|attr| anchor.value().attr(attr))
            .map(collapse_whitespace)
            .find(|value| !value.is_empty());

        self.links.push(ScrapedLink {
            url,
            size_hint: size_hint(anchor, &text),
            text,
            label,
            source,
        });
    }
}

fn size_hint(anchor: &ElementRef<'_>, text: &str) -> Option<String> {
    if let Some(caps) = size_in_parens().captures(text) {
        return Some(caps[1].to_string());
    }
    let parent = anchor.parent().and_then(ElementRef::wrap)?;
    let parent_text = parent.text().collect::<String>();
    size_anywhere()
        .captures(&parent_text)
        .map(|caps| caps[1].to_string())
}
