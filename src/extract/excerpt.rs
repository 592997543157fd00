use scraper::{Html, Selector};

use crate::crawler::task::PageKind;

/// Cut a page down to the fragments that matter for its kind, for repair
/// snippets and generative prompts. Full pages run hundreds of kilobytes;
/// most of it is navigation and ads.
pub fn relevant_html(html: &str, kind: PageKind, max_chars: usize) -> String {
    let document = Html::parse_document(html);

    let css = match kind {
        PageKind::ClubTransfers | PageKind::PlayerTransfers => "table.items, div.box h2",
        PageKind::PlayerProfile => "h1, div.info-table, div.data-header__details",
        PageKind::ClubProfile => "h1, div.data-header, div.profilheader",
        _ => "main, body",
    };

    let mut excerpt = String::new();
    if let Ok(selector) = Selector::parse(css) {
        for element in document.select(&selector) {
            excerpt.push_str(&element.html());
            excerpt.push('\n');
            if excerpt.len() >= max_chars {
                break;
            }
        }
    }

    if excerpt.is_empty() {
        excerpt = html.to_string();
    }

    truncate_chars(&excerpt, max_chars).to_string()
}

/// Truncate on a char boundary; byte-index slicing panics mid-codepoint.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_the_items_table_for_transfer_pages() {
        let html = r#"<html><body>
            <nav>lots of navigation</nav>
            <table class="items"><tbody><tr><td>row</td></tr></tbody></table>
            <footer>footer junk</footer>
        </body></html>"#;

        let excerpt = relevant_html(html, PageKind::ClubTransfers, 10_000);
        assert!(excerpt.contains("table"));
        assert!(excerpt.contains("row"));
        assert!(!excerpt.contains("navigation"));
    }

    #[test]
    fn falls_back_to_whole_page_when_nothing_matches() {
        let html = "<html><body><p>bare page</p></body></html>";
        let excerpt = relevant_html(html, PageKind::PlayerTransfers, 10_000);
        assert!(excerpt.contains("bare page"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 3), "hél");
        assert_eq!(truncate_chars(s, 100), s);
    }
}
