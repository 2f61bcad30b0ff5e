//! Reply parsing: turn the vision model's loosely formatted text into a
//! [`MenuExtractionResult`].
//!
//! Models asked for "JSON only" still like to wrap it in Markdown fences, so
//! fences are stripped first. Anything that still does not parse becomes an
//! empty result. An unreadable reply means "no dishes found", which the user
//! fixes with a better photo, not a transport problem to retry.

use crate::model::{non_blank, Dish, MenuExtractionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```$").unwrap());

/// Strip a leading ```` ```json ```` / ```` ``` ```` fence and a trailing
/// ```` ``` ````, each only if present.
///
/// The two ends are handled separately: a reply cut off before its closing
/// fence still parses.
pub fn strip_code_fences(input: &str) -> &str {
    let mut s = input.trim();
    if let Some(m) = RE_OPENING_FENCE.find(s) {
        s = &s[m.end()..];
    }
    if let Some(m) = RE_CLOSING_FENCE.find(s) {
        s = &s[..m.start()];
    }
    s.trim()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuReply {
    #[serde(default)]
    restaurant_name: Option<String>,
    #[serde(default)]
    dishes: Vec<DishReply>,
}

#[derive(Debug, Deserialize)]
struct DishReply {
    name: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the reply strictly, returning the JSON error on failure.
pub fn try_parse_menu_reply(reply: &str) -> Result<MenuExtractionResult, serde_json::Error> {
    let parsed: MenuReply = serde_json::from_str(strip_code_fences(reply))?;

    let dishes: Vec<Dish> = parsed
        .dishes
        .into_iter()
        .filter_map(|d| {
            let name = d.name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Dish {
                section: non_blank(d.section),
                price: non_blank(d.price),
                description: non_blank(d.description),
                ..Dish::new(name)
            })
        })
        .collect();

    Ok(MenuExtractionResult {
        restaurant_name: non_blank(parsed.restaurant_name),
        dishes,
    })
}

/// Parse the reply leniently: any parse error yields an empty result.
pub fn parse_menu_reply(reply: &str) -> MenuExtractionResult {
    match try_parse_menu_reply(reply) {
        Ok(result) => {
            debug!(
                "Parsed restaurant {:?} and {} dishes",
                result.restaurant_name,
                result.dishes.len()
            );
            result
        }
        Err(e) => {
            warn!("Menu reply is not the expected JSON ({}); returning no dishes", e);
            debug!("Unparsed reply: {}", truncate(reply, 500));
            MenuExtractionResult::empty()
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"restaurantName": "Luigi's", "dishes": [
        {"name": "Pizza", "section": "Mains", "price": "$18"},
        {"name": "Tiramisu", "section": "Desserts", "price": null}
    ]}"#;

    fn names(r: &MenuExtractionResult) -> Vec<&str> {
        r.dishes.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn strips_json_fence() {
        let wrapped = format!("```json\n{BODY}\n```");
        assert_eq!(strip_code_fences(&wrapped), BODY.trim());
    }

    #[test]
    fn strips_bare_fence() {
        let wrapped = format!("```\n{BODY}\n```\n");
        assert_eq!(strip_code_fences(&wrapped), BODY.trim());
    }

    #[test]
    fn strips_unclosed_fence() {
        let truncated = format!("```json\n{BODY}");
        assert_eq!(strip_code_fences(&truncated), BODY.trim());
        let r = parse_menu_reply(&truncated);
        assert_eq!(names(&r), vec!["Pizza", "Tiramisu"]);
    }

    #[test]
    fn strips_trailing_fence_alone() {
        assert_eq!(strip_code_fences("{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn fenced_and_plain_parse_identically() {
        let plain = parse_menu_reply(BODY);
        let fenced = parse_menu_reply(&format!("```json\n{BODY}\n```"));
        assert_eq!(plain.restaurant_name, fenced.restaurant_name);
        assert_eq!(names(&plain), names(&fenced));
        assert_eq!(plain.dishes[0].price, fenced.dishes[0].price);
    }

    #[test]
    fn parses_fields_in_order() {
        let r = parse_menu_reply(BODY);
        assert_eq!(r.restaurant_name.as_deref(), Some("Luigi's"));
        assert_eq!(names(&r), vec!["Pizza", "Tiramisu"]);
        assert_eq!(r.dishes[0].section.as_deref(), Some("Mains"));
        assert_eq!(r.dishes[0].price.as_deref(), Some("$18"));
        assert_eq!(r.dishes[1].price, None);
    }

    #[test]
    fn malformed_reply_is_empty() {
        let r = parse_menu_reply("Sorry, I cannot read this menu.");
        assert!(r.restaurant_name.is_none());
        assert!(r.dishes.is_empty());
    }

    #[test]
    fn wrong_shape_is_empty() {
        let r = parse_menu_reply(r#"{"dishes": "none"}"#);
        assert!(r.is_empty());
        assert!(try_parse_menu_reply(r#"{"dishes": "none"}"#).is_err());
    }

    #[test]
    fn blank_values_become_none_and_nameless_dishes_drop() {
        let r = parse_menu_reply(
            r#"{"restaurantName": "  ", "dishes": [{"name": "  "}, {"name": " Soup ", "section": ""}]}"#,
        );
        assert_eq!(r.restaurant_name, None);
        assert_eq!(names(&r), vec!["Soup"]);
        assert_eq!(r.dishes[0].section, None);
    }

    #[test]
    fn missing_fields_default() {
        let r = parse_menu_reply(r#"{"dishes": [{"name": "Bread"}]}"#);
        assert_eq!(r.restaurant_name, None);
        assert_eq!(r.dishes.len(), 1);
    }

    #[test]
    fn dish_ids_are_fresh() {
        let r = parse_menu_reply(BODY);
        assert_ne!(r.dishes[0].id, r.dishes[1].id);
    }
}
