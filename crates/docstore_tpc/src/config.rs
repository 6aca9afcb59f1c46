//! Configuration of a [ResourceManager](crate::manager::ResourceManager),
//! supplied once at construction.
//!
//! #### Example config:
//!
//! ```rust
//! let yaml = r#"---
//!
//! ## Index used by items that don't name one.
//! default_index: products
//!
//! ## Create a missing index on Add, and delete it again on abort.
//! auto_create_index: true
//!
//! ## Re-read applied documents before voting.
//! verify_on_vote: false
//! "#;
//!
//! use docstore_tpc::config::ResourceManagerConfig;
//!
//! let config = ResourceManagerConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.role, "docstore");
//! ```

use crate::error::TpcResult;
use serde::{Deserialize, Serialize};

/// Role used in sort keys when none is configured
pub const DEFAULT_ROLE: &str = "docstore";

/// The only mapping type single-type clusters accept
pub const SINGLE_MAPPING_TYPE: &str = "doc";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    /// Index for items that don't name one. Empty counts as unset.
    pub default_index: Option<String>,

    /// Whether Add may create its target index
    pub auto_create_index: bool,

    /// When set, every staged document type must be exactly this
    pub single_mapping_type: Option<String>,

    /// Logical role, the first part of the sort key
    pub role: String,

    /// Re-read every applied Add and Update target during `vote`
    pub verify_on_vote: bool,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            default_index: None,
            auto_create_index: false,
            single_mapping_type: None,
            role: DEFAULT_ROLE.to_string(),
            verify_on_vote: false,
        }
    }
}

impl ResourceManagerConfig {
    pub fn from_yaml_str(yaml: &str) -> TpcResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_default_index(mut self, index: impl Into<String>) -> Self {
        self.default_index = Some(index.into());
        self
    }

    pub fn with_auto_create_index(mut self, auto_create_index: bool) -> Self {
        self.auto_create_index = auto_create_index;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_verify_on_vote(mut self, verify_on_vote: bool) -> Self {
        self.verify_on_vote = verify_on_vote;
        self
    }

    /// Restrict mapping types to [SINGLE_MAPPING_TYPE] if any node of the
    /// cluster runs a 6.x release. Unparseable versions are ignored.
    pub fn with_cluster_versions<S: AsRef<str>>(mut self, versions: &[S]) -> Self {
        let single_type = versions.iter().any(|v| {
            v.as_ref()
                .split('.')
                .next()
                .and_then(|major| major.trim().parse::<u32>().ok())
                == Some(6)
        });
        if single_type {
            self.single_mapping_type = Some(SINGLE_MAPPING_TYPE.to_string());
        }
        self
    }

    /// The default index, if one is usable
    pub(crate) fn usable_default_index(&self) -> Option<&str> {
        self.default_index.as_deref().filter(|i| !i.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TpcError;
    use matches::assert_matches;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn empty_yaml_is_default() {
        let config = ResourceManagerConfig::from_yaml_str("---\n{}\n").unwrap();
        assert_eq!(config, ResourceManagerConfig::default());
        assert_eq!(config.role, DEFAULT_ROLE);
    }

    #[test]
    fn full_yaml() {
        let yaml = r#"---
default_index: products
auto_create_index: true
single_mapping_type: doc
role: catalog
verify_on_vote: true
"#;
        let config = ResourceManagerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config,
            ResourceManagerConfig::default()
                .with_default_index("products")
                .with_auto_create_index(true)
                .with_cluster_versions(&["6.8.0"])
                .with_role("catalog")
                .with_verify_on_vote(true)
        );
    }

    #[test]
    fn bad_yaml_is_a_config_error() {
        assert_matches!(
            ResourceManagerConfig::from_yaml_str("auto_create_index: [1, 2]"),
            Err(TpcError::Config(_))
        );
    }

    #[test]
    fn empty_default_index_is_unset() {
        let config = ResourceManagerConfig::default().with_default_index("");
        assert_eq!(config.usable_default_index(), None);
    }

    #[test_case(&["7.10.2"], None ; "seven")]
    #[test_case(&["6.8.23"], Some("doc") ; "six")]
    #[test_case(&["7.1.0", "6.2.4"], Some("doc") ; "mixed cluster")]
    #[test_case(&["garbage"], None ; "unparseable")]
    fn mapping_type_follows_cluster_versions(versions: &[&str], expected: Option<&str>) {
        let config = ResourceManagerConfig::default().with_cluster_versions(versions);
        assert_eq!(config.single_mapping_type.as_deref(), expected);
    }
}
