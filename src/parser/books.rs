use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{required_attr, resolve, text_of};
use crate::error::ParseError;

static PRODUCT_POD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.product_pod").unwrap());
static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3 > a").unwrap());
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p.price_color").unwrap());
static STAR_RATING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.star-rating").unwrap());
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.image_container img").unwrap());
static NEXT_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li.next > a").unwrap());

// Leading currency symbol(s), then an unsigned decimal.
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\d\s.+-]*\s*(\d+(?:\.\d+)?)$").unwrap());

const RATINGS: &[(&str, u8)] = &[("One", 1), ("Two", 2), ("Three", 3), ("Four", 4), ("Five", 5)];

#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub title: String,
    pub price: f64,
    pub rating: u8,
    pub image_url: Url,
}

/// Every `article.product_pod` on a category listing page.
pub fn extract_books(html: &str, base: &Url) -> Result<Vec<BookRecord>, ParseError> {
    let doc = Html::parse_document(html);
    doc.select(&PRODUCT_POD)
        .map(|pod| extract_book(pod, base))
        .collect()
}

fn extract_book(pod: ElementRef<'_>, base: &Url) -> Result<BookRecord, ParseError> {
    let title_link = pod
        .select(&TITLE_LINK)
        .next()
        .ok_or(ParseError::MissingElement("h3 > a"))?;
    // The visible anchor text is truncated with "..."; the attribute is not.
    let title = required_attr(title_link, "h3 > a", "title")?.trim().to_string();

    let price_el = pod
        .select(&PRICE)
        .next()
        .ok_or(ParseError::MissingElement("p.price_color"))?;
    let price = parse_price(&text_of(price_el))?;

    let rating_el = pod
        .select(&STAR_RATING)
        .next()
        .ok_or(ParseError::MissingElement("p.star-rating"))?;
    let rating = rating_el
        .value()
        .classes()
        .find(|c| *c != "star-rating")
        .map(rating_from_token)
        .unwrap_or(0);

    let img = pod
        .select(&IMAGE)
        .next()
        .ok_or(ParseError::MissingElement("div.image_container img"))?;
    let image_url = resolve(base, required_attr(img, "div.image_container img", "src")?)?;

    Ok(BookRecord {
        title,
        price,
        rating,
        image_url,
    })
}

/// `"£51.77"` -> `51.77`. Anything that is not a currency prefix followed
/// by an unsigned decimal is rejected.
pub fn parse_price(text: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidPrice(text.to_string());
    let caps = PRICE_RE.captures(text.trim()).ok_or_else(invalid)?;
    caps[1].parse::<f64>().map_err(|_| invalid())
}

/// Star-rating class token to 1..=5. Unknown tokens degrade to 0 instead
/// of failing the record.
pub fn rating_from_token(token: &str) -> u8 {
    RATINGS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}

/// Absolute URL of the following listing page, if there is one.
pub fn extract_next_page(html: &str, current: &Url) -> Result<Option<Url>, ParseError> {
    let doc = Html::parse_document(html);
    match doc.select(&NEXT_LINK).next() {
        Some(link) => {
            let href = required_attr(link, "li.next > a", "href")?;
            resolve(current, href).map(Some)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixture;

    fn travel_url() -> Url {
        Url::parse("https://books.toscrape.com/catalogue/category/books/travel_2/index.html")
            .unwrap()
    }

    fn pod(inner: &str) -> String {
        format!(r#"<ol class="row"><li><article class="product_pod">{}</article></li></ol>"#, inner)
    }

    const IMAGE_DIV: &str =
        r#"<div class="image_container"><a href="rain/index.html"><img src="img/rain.jpg" alt="Rain"></a></div>"#;
    const TITLE_H3: &str = r#"<h3><a href="rain/index.html" title="Rain">Rain</a></h3>"#;
    const PRICE_P: &str = r#"<div class="product_price"><p class="price_color">£22.00</p></div>"#;

    #[test]
    fn rating_tokens() {
        assert_eq!(rating_from_token("One"), 1);
        assert_eq!(rating_from_token("Two"), 2);
        assert_eq!(rating_from_token("Three"), 3);
        assert_eq!(rating_from_token("Four"), 4);
        assert_eq!(rating_from_token("Five"), 5);
        assert_eq!(rating_from_token("Zero"), 0);
        assert_eq!(rating_from_token("five"), 0);
        assert_eq!(rating_from_token(""), 0);
    }

    #[test]
    fn price_parsing() {
        assert_eq!(parse_price("£51.77").unwrap(), 51.77);
        assert_eq!(parse_price("  £22.00 ").unwrap(), 22.0);
        assert_eq!(parse_price("Â£13.99").unwrap(), 13.99);
        assert_eq!(parse_price("7").unwrap(), 7.0);
    }

    #[test]
    fn bad_prices_fail() {
        assert_eq!(
            parse_price("£abc").unwrap_err(),
            ParseError::InvalidPrice("£abc".into())
        );
        assert!(parse_price("£-5.00").is_err());
        assert!(parse_price("").is_err());
        assert!(parse_price("£1.2.3").is_err());
    }

    #[test]
    fn travel_fixture_books() {
        let books = extract_books(&fixture("travel"), &travel_url()).unwrap();
        assert_eq!(books.len(), 3);

        let first = &books[0];
        assert_eq!(first.title, "It's Only the Himalayas");
        assert_eq!(first.price, 45.17);
        assert_eq!(first.rating, 2);
        assert_eq!(
            first.image_url.as_str(),
            "https://books.toscrape.com/media/cache/27/a5/27a53d0bb95bdd88288eaf66c9230d7e.jpg"
        );

        // Visible text is truncated; the title attribute is used.
        assert_eq!(
            books[1].title,
            "Full Moon over Noah’s Ark: An Odyssey to Mount Ararat and Beyond"
        );
        assert_eq!(books[1].rating, 4);
        // Unrecognised rating token degrades to 0.
        assert_eq!(books[2].rating, 0);
    }

    #[test]
    fn single_book_resolves_image() {
        let html = pod(&format!(
            r#"{}<p class="star-rating Three"></p>{}{}"#,
            IMAGE_DIV, TITLE_H3, PRICE_P
        ));
        let books = extract_books(&html, &travel_url()).unwrap();
        assert_eq!(
            books,
            vec![BookRecord {
                title: "Rain".into(),
                price: 22.0,
                rating: 3,
                image_url: Url::parse(
                    "https://books.toscrape.com/catalogue/category/books/travel_2/img/rain.jpg"
                )
                .unwrap(),
            }]
        );
    }

    #[test]
    fn rating_without_token_is_zero() {
        let html = pod(&format!(
            r#"{}<p class="star-rating"></p>{}{}"#,
            IMAGE_DIV, TITLE_H3, PRICE_P
        ));
        let books = extract_books(&html, &travel_url()).unwrap();
        assert_eq!(books[0].rating, 0);
    }

    #[test]
    fn missing_sub_elements_fail() {
        let no_price = pod(&format!(r#"{}<p class="star-rating One"></p>{}"#, IMAGE_DIV, TITLE_H3));
        assert_eq!(
            extract_books(&no_price, &travel_url()).unwrap_err(),
            ParseError::MissingElement("p.price_color")
        );

        let no_image = pod(&format!(r#"<p class="star-rating One"></p>{}{}"#, TITLE_H3, PRICE_P));
        assert_eq!(
            extract_books(&no_image, &travel_url()).unwrap_err(),
            ParseError::MissingElement("div.image_container img")
        );

        let no_title_attr = pod(&format!(
            r#"{}<p class="star-rating One"></p><h3><a href="x.html">Rain</a></h3>{}"#,
            IMAGE_DIV, PRICE_P
        ));
        assert_eq!(
            extract_books(&no_title_attr, &travel_url()).unwrap_err(),
            ParseError::MissingAttribute { element: "h3 > a", attr: "title" }
        );

        let no_rating = pod(&format!("{}{}{}", IMAGE_DIV, TITLE_H3, PRICE_P));
        assert_eq!(
            extract_books(&no_rating, &travel_url()).unwrap_err(),
            ParseError::MissingElement("p.star-rating")
        );
    }

    #[test]
    fn unparseable_price_fails_the_page() {
        let html = pod(&format!(
            r#"{}<p class="star-rating One"></p>{}<p class="price_color">£abc</p>"#,
            IMAGE_DIV, TITLE_H3
        ));
        assert_eq!(
            extract_books(&html, &travel_url()).unwrap_err(),
            ParseError::InvalidPrice("£abc".into())
        );
    }

    #[test]
    fn empty_listing() {
        let books = extract_books("<html><body><ol class=\"row\"></ol></body></html>", &travel_url())
            .unwrap();
        assert!(books.is_empty());
    }

    #[test]
    fn pagination_link() {
        let next = extract_next_page(&fixture("travel"), &travel_url()).unwrap();
        assert_eq!(
            next.unwrap().as_str(),
            "https://books.toscrape.com/catalogue/category/books/travel_2/page-2.html"
        );
        assert_eq!(extract_next_page("<ul class=\"pager\"></ul>", &travel_url()).unwrap(), None);
    }
}
