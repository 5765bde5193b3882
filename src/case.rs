//! Identifier case conversion for default table names (model `BookReview` -> table `book_review`).

/// Convert an identifier from CamelCase/camelCase to snake_case.
/// e.g. "BookReview" -> "book_review", "authorId" -> "author_id"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_of_model_names() {
        assert_eq!(to_snake_case("Author"), "author");
        assert_eq!(to_snake_case("BookReview"), "book_review");
        assert_eq!(to_snake_case("authorId"), "author_id");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Odd_Name"), "odd_name");
    }
}
