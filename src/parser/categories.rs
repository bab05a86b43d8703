use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{required_attr, resolve, text_of};
use crate::error::ParseError;

static NAV_LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ul.nav-list").unwrap());
static NESTED_LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ul").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryLink {
    pub name: String,
    pub url: Url,
}

/// Category entries from the side navigation of the catalogue root.
///
/// Layout: `ul.nav-list > li > ul > li > a`. The outer item is the
/// "Books" umbrella entry and is skipped; only the nested list counts.
pub fn extract_categories(html: &str, base: &Url) -> Result<Vec<CategoryLink>, ParseError> {
    let doc = Html::parse_document(html);
    let nav = doc
        .select(&NAV_LIST)
        .next()
        .ok_or(ParseError::MissingElement("ul.nav-list"))?;
    let nested = nav
        .select(&NESTED_LIST)
        .next()
        .ok_or(ParseError::MissingElement("ul.nav-list ul"))?;

    let mut categories = Vec::new();
    for item in nested
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
    {
        let link = item
            .select(&ANCHOR)
            .next()
            .ok_or(ParseError::MissingElement("ul.nav-list ul li a"))?;
        let href = required_attr(link, "ul.nav-list ul li a", "href")?;
        categories.push(CategoryLink {
            name: text_of(link),
            url: resolve(base, href)?,
        });
    }

    Ok(categories)
}
