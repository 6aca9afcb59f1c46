use serde::{Deserialize, Serialize};

/// Orders participants of one transaction deterministically.
///
/// The key is `"{role}:{instance}"`. Keys compare lexicographically, so
/// participants sharing a role are grouped and the instance id breaks ties.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub struct SortKey(String);

impl SortKey {
    /// A key for a new participant instance of the given role
    pub fn generate(role: &str) -> Self {
        Self::from_parts(role, &nanoid::nanoid!())
    }

    pub fn from_parts(role: &str, instance: &str) -> Self {
        Self(format!("{}:{}", role, instance))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn role(&self) -> &str {
        self.0.split_once(':').map(|(role, _)| role).unwrap_or(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_of_one_role_are_distinct() {
        let a = SortKey::generate("docstore");
        let b = SortKey::generate("docstore");
        assert_ne!(a, b);
        assert_eq!(a.role(), "docstore");
        assert!(a.to_string().starts_with("docstore:"));
    }

    #[test]
    fn orders_by_role_then_instance() {
        let mut keys = vec![
            SortKey::from_parts("search", "a"),
            SortKey::from_parts("docstore", "z"),
            SortKey::from_parts("docstore", "b"),
        ];
        keys.sort();
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["docstore:b", "docstore:z", "search:a"]);
    }
}
