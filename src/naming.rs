//! Human-readable names for tables
//!
//! The query engine works on raw identifiers only. Presentation layers that
//! want "Line Items" or "order" construct a `Naming` and pass it along.

use std::collections::HashMap;

/// English plural/singular rules with an irregular-word table
#[derive(Debug, Clone)]
pub struct Naming {
    /// singular -> plural
    irregular: HashMap<String, String>,
    /// plural -> singular
    irregular_rev: HashMap<String, String>,
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("datum", "data"),
    ("index", "indices"),
    ("status", "statuses"),
];

const UNCOUNTABLE: &[&str] = &["equipment", "information", "metadata", "news", "series", "species"];

impl Default for Naming {
    fn default() -> Self {
        Self::new()
    }
}

impl Naming {
    /// Create a naming service with the built-in irregular words
    pub fn new() -> Self {
        let mut naming = Self {
            irregular: HashMap::new(),
            irregular_rev: HashMap::new(),
        };
        for (single, plural) in IRREGULAR {
            naming.add_irregular(single, plural);
        }
        naming
    }

    /// Register an extra irregular pair
    pub fn add_irregular(&mut self, single: &str, plural: &str) {
        self.irregular.insert(single.to_lowercase(), plural.to_lowercase());
        self.irregular_rev.insert(plural.to_lowercase(), single.to_lowercase());
    }

    /// Plural form of the last word of `name`
    pub fn plural(&self, name: &str, title_case: bool) -> String {
        let name = self.map_last_word(name, |word| self.plural_word(word));
        self.finish(name, title_case)
    }

    /// Singular form of the last word of `name`
    pub fn singular(&self, name: &str, title_case: bool) -> String {
        let name = self.map_last_word(name, |word| self.singular_word(word));
        self.finish(name, title_case)
    }

    /// "line_items" -> "Line Items"
    pub fn title(&self, name: &str) -> String {
        name.split(['_', ' ', '-'])
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }

    fn finish(&self, name: String, title_case: bool) -> String {
        if title_case {
            self.title(&name)
        } else {
            name.to_lowercase()
        }
    }

    fn map_last_word(&self, name: &str, f: impl Fn(&str) -> String) -> String {
        match name.rfind(['_', ' ', '-']) {
            Some(pos) => format!("{}{}", &name[..=pos], f(&name[pos + 1..])),
            None => f(name),
        }
    }

    fn plural_word(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) || self.irregular_rev.contains_key(&lower) {
            return lower;
        }
        if let Some(plural) = self.irregular.get(&lower) {
            return plural.clone();
        }
        if lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") {
            return lower;
        }
        if let Some(stem) = lower.strip_suffix('y') {
            if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
                return format!("{}ies", stem);
            }
        }
        if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
            return format!("{}es", lower);
        }
        format!("{}s", lower)
    }

    fn singular_word(&self, word: &str) -> String {
        let lower = word.to_lowercase();
        if UNCOUNTABLE.contains(&lower.as_str()) || self.irregular.contains_key(&lower) {
            return lower;
        }
        if let Some(single) = self.irregular_rev.get(&lower) {
            return single.clone();
        }
        if let Some(stem) = lower.strip_suffix("ies") {
            return format!("{}y", stem);
        }
        for suffix in ["sses", "xes", "zes", "ches", "shes"] {
            if lower.ends_with(suffix) {
                return lower[..lower.len() - 2].to_string();
            }
        }
        if lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") {
            return lower[..lower.len() - 1].to_string();
        }
        lower
    }
}
