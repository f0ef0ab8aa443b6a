//! Name conversions shared by sorting, matching and table resolution

/// Convert a camelCase or PascalCase name to snake_case
///
/// Every ASCII uppercase letter after the first character is preceded by an
/// underscore and lowercased. Names that are already snake_case pass through
/// unchanged.
///
/// ```rust
/// use acton_data::naming::camel_to_snake;
///
/// assert_eq!(camel_to_snake("createdAt"), "created_at");
/// assert_eq!(camel_to_snake("UserProfile"), "user_profile");
/// assert_eq!(camel_to_snake("user_id"), "user_id");
/// ```
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Pluralize a snake_case noun with simple English rules
///
/// `category` -> `categories`, `address` -> `addresses`, `user` -> `users`
pub fn pluralize(noun: &str) -> String {
    if let Some(stem) = noun.strip_suffix('y') {
        let before = stem.chars().last();
        if matches!(before, Some(c) if !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| noun.ends_with(s)) {
        return format!("{}es", noun);
    }
    format!("{}s", noun)
}

/// Last path segment of a type name, generics stripped
///
/// `my_app::model::OrderLine<u64>` -> `OrderLine`
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Default table name for a Rust type: snake-cased short name, pluralized
pub fn default_table_name<T: ?Sized>() -> String {
    pluralize(&camel_to_snake(short_type_name(std::any::type_name::<T>())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("userId"), "user_id");
        assert_eq!(camel_to_snake("ID"), "i_d");
        assert_eq!(camel_to_snake("name"), "name");
        assert_eq!(camel_to_snake(""), "");
        assert_eq!(camel_to_snake("orders.createdAt"), "orders.created_at");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("batch"), "batches");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::OrderLine"), "OrderLine");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    struct OrderLine;

    #[test]
    fn test_default_table_name() {
        assert_eq!(default_table_name::<OrderLine>(), "order_lines");
    }
}
