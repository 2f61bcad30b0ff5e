//! Prompts and queries sent to the external services.
//!
//! Centralising every piece of request text here keeps the wording in one
//! place and lets unit tests inspect it without a network round-trip.

/// Instruction sent alongside the menu photo.
///
/// The reply is expected to be the JSON object described here, possibly
/// wrapped in a ```` ```json ```` fence; see [`crate::pipeline::reply`].
pub const MENU_EXTRACTION_PROMPT: &str = r#"Analyze this restaurant menu image and extract both the restaurant name and all dishes with their sections and prices.

Return the data in this exact JSON format:
{
    "restaurantName": "Restaurant Name",
    "dishes": [
        {
            "name": "Dish Name",
            "section": "Section Name (e.g., Appetizers, Main Course, Desserts)",
            "price": "$XX.XX"
        }
    ]
}

Rules:
- Extract the restaurant name from the top of the menu
- Extract only actual dishes, not section headers
- Include prices if available
- Group dishes by their sections
- Clean up dish names (remove special characters, extra spaces)
- If no price is found, set price to null
- If no section is found, set section to null
- If no clear restaurant name is found, set restaurantName to null
- Output ONLY the JSON object, no commentary"#;

/// Keywords appended to every image-search query.
pub const SEARCH_KEYWORDS: &str = "food dish meal";

/// Build the image-search query for a dish.
pub fn search_query(dish_name: &str, restaurant_name: Option<&str>) -> String {
    match restaurant_name.map(str::trim).filter(|r| !r.is_empty()) {
        Some(restaurant) => format!(
            "restaurant: {} dish: {} {}",
            restaurant,
            dish_name.trim(),
            SEARCH_KEYWORDS
        ),
        None => format!("dish: {} {}", dish_name.trim(), SEARCH_KEYWORDS),
    }
}

/// Build the image-generation prompt for a dish.
pub fn generation_prompt(dish_name: &str, restaurant_name: Option<&str>) -> String {
    let restaurant = restaurant_name
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("unknown");
    format!(
        "Generate a representative image for restaurant \"{}\" and dish \"{}\".\n\
         Base it on how this restaurant and this dish are usually presented.\n\
         The generated image should be a realistic, appetising food photograph \
         of a single plated serving, with no text or watermarks.",
        restaurant,
        dish_name.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_with_restaurant() {
        assert_eq!(
            search_query("Carbonara", Some("Luigi's")),
            "restaurant: Luigi's dish: Carbonara food dish meal"
        );
    }

    #[test]
    fn query_without_restaurant() {
        assert_eq!(search_query(" Pho ", None), "dish: Pho food dish meal");
        assert_eq!(search_query("Pho", Some("  ")), "dish: Pho food dish meal");
    }

    #[test]
    fn generation_prompt_names_both() {
        let p = generation_prompt("Pad Thai", Some("Thai Palace"));
        assert!(p.contains("\"Thai Palace\""));
        assert!(p.contains("\"Pad Thai\""));
        assert!(generation_prompt("Pad Thai", None).contains("\"unknown\""));
    }

    #[test]
    fn extraction_prompt_describes_shape() {
        assert!(MENU_EXTRACTION_PROMPT.contains("\"restaurantName\""));
        assert!(MENU_EXTRACTION_PROMPT.contains("\"dishes\""));
        assert!(MENU_EXTRACTION_PROMPT.contains("\"price\""));
    }
}
