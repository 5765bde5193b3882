//! Field filtering: reduce a caller's keyword mapping to the keys a model declares.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Caller-supplied keyword mapping.
pub type Kwargs = Map<String, Value>;

/// Separator between a field name and a lookup or related field.
pub const LOOKUP_SEP: &str = "__";

/// Whether `key` names a declared field, directly or through a `field__...` lookup path.
pub fn is_known_key(fields: &HashSet<&str>, key: &str) -> bool {
    if fields.contains(key) {
        return true;
    }
    match key.split_once(LOOKUP_SEP) {
        Some((head, _)) => fields.contains(head),
        None => false,
    }
}

/// Lazily yields the pairs of `kwargs` whose key is a declared field or starts with
/// `<declared field>__`. Everything else is dropped.
pub fn iterate_fields<'a>(
    fields: &'a HashSet<&'a str>,
    kwargs: &'a Kwargs,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    kwargs.iter().filter(move |(k, _)| is_known_key(fields, k))
}

/// The recognized subset of a keyword mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CleanData(Map<String, Value>);

impl CleanData {
    /// Filter `kwargs` against `field_names`.
    pub fn from_kwargs<'f, I>(field_names: I, kwargs: &Kwargs) -> Self
    where
        I: IntoIterator<Item = &'f str>,
    {
        let fields: HashSet<&str> = field_names.into_iter().collect();
        let data = iterate_fields(&fields, kwargs)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        CleanData(data)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl<'a> IntoIterator for &'a CleanData {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(v: Value) -> Kwargs {
        match v {
            Value::Object(m) => m,
            _ => unreachable!("test kwargs must be an object"),
        }
    }

    const FIELDS: [&str; 3] = ["id", "name", "author"];

    #[test]
    fn keeps_exact_and_prefixed_keys() {
        let kw = kwargs(json!({
            "name": "Dune",
            "author__name": "Herbert",
            "author__name__icontains": "herb",
            "name__startswith": "Du",
            "publisher": "Chilton",
            "publisher__name": "Chilton",
            "nameless": 1,
            "_name": 2
        }));
        let clean = CleanData::from_kwargs(FIELDS, &kw);
        let mut keys: Vec<&str> = clean.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["author__name", "author__name__icontains", "name", "name__startswith"]);
        assert_eq!(clean.get("name"), Some(&json!("Dune")));
    }

    #[test]
    fn only_unknown_keys_yield_nothing() {
        let kw = kwargs(json!({ "title": "x", "__name": 1, "": 2 }));
        assert!(CleanData::from_kwargs(FIELDS, &kw).is_empty());
        assert!(CleanData::from_kwargs(FIELDS, &Kwargs::new()).is_empty());
    }

    #[test]
    fn prefix_is_text_before_first_separator() {
        let fields: HashSet<&str> = ["a_b"].into_iter().collect();
        assert!(is_known_key(&fields, "a_b__c"));
        assert!(!is_known_key(&fields, "a__b_c"));
        assert!(!is_known_key(&fields, "a_b_c"));
    }

    #[test]
    fn iterate_fields_is_lazy_over_borrowed_pairs() {
        let kw = kwargs(json!({ "id": 1, "junk": 2 }));
        let fields: HashSet<&str> = FIELDS.into_iter().collect();
        let mut it = iterate_fields(&fields, &kw);
        assert_eq!(it.next().map(|(k, _)| k.as_str()), Some("id"));
        assert!(it.next().is_none());
    }
}
