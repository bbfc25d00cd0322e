use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
}

impl Category {
    #[cfg(test)]
    pub fn new(name: String) -> Self {
        Self { name }
    }

    /// Find a category by name (case-insensitive) in a slice.
    pub fn find_by_name<'a>(categories: &'a [Category], name: &str) -> Option<&'a Category> {
        let lower = name.to_lowercase();
        categories.iter().find(|c| c.name.to_lowercase() == lower)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Household-learned merchant → category memory.
///
/// Read from the store for each pass and handed to the categorizer
/// explicitly; never held as process-wide state.
#[derive(Debug, Clone, Default)]
pub struct MerchantMemory {
    entries: HashMap<String, String>,
}

impl MerchantMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, merchant: &str, category: String) {
        self.entries.insert(Self::key(merchant), category);
    }

    pub fn lookup(&self, merchant: &str) -> Option<&str> {
        self.entries.get(&Self::key(merchant)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized lookup key: lowercase, digits and punctuation dropped,
    /// whitespace collapsed.
    pub fn key(merchant: &str) -> String {
        merchant
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphabetic() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
