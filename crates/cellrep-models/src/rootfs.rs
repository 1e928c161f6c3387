//! Root filesystem capability lookup and preloaded stack paths.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ModelError, ModelResult};

/// URL scheme of root filesystems that ship preinstalled on the cell.
pub const PRELOADED_ROOTFS_SCHEME: &str = "preloaded";

/// How a cell answers "do you support this rootfs" for one URL scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RootFsProvider {
    /// Any URL with this scheme can be fetched on demand.
    Arbitrary,
    /// Only the named stacks are available, matched on the URL's opaque part
    /// (`preloaded:cflinuxfs2` -> `cflinuxfs2`).
    FixedSet { set: BTreeSet<String> },
}

impl RootFsProvider {
    pub fn fixed_set<I, S>(stacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RootFsProvider::FixedSet {
            set: stacks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            RootFsProvider::Arbitrary => true,
            RootFsProvider::FixedSet { set } => set.contains(opaque(url)),
        }
    }
}

/// Root filesystem providers keyed by URL scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootFsProviders(pub BTreeMap<String, RootFsProvider>);

impl RootFsProviders {
    /// Register every arbitrary scheme plus a `preloaded` provider listing
    /// the stacks of `preloaded`.
    pub fn new(preloaded: &StackPathMap, arbitrary_schemes: &[String]) -> Self {
        let mut providers = BTreeMap::new();
        for scheme in arbitrary_schemes {
            providers.insert(scheme.clone(), RootFsProvider::Arbitrary);
        }
        providers.insert(
            PRELOADED_ROOTFS_SCHEME.to_string(),
            RootFsProvider::fixed_set(preloaded.0.keys().cloned()),
        );
        Self(providers)
    }

    pub fn match_url(&self, url: &Url) -> bool {
        self.0
            .get(url.scheme())
            .is_some_and(|provider| provider.matches(url))
    }
}

/// Preloaded stack name -> on-disk rootfs path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackPathMap(pub BTreeMap<String, String>);

impl StackPathMap {
    /// Resolve the path a container runtime should use for `root_fs`.
    ///
    /// Preloaded stacks resolve through the map; every other scheme is
    /// passed through untouched.
    pub fn path_for_root_fs(&self, root_fs: &str) -> ModelResult<String> {
        if root_fs.is_empty() {
            return Ok(String::new());
        }

        let url = Url::parse(root_fs).map_err(|e| ModelError::InvalidRootFs(e.to_string()))?;
        if url.scheme() == PRELOADED_ROOTFS_SCHEME {
            return self
                .0
                .get(opaque(&url))
                .cloned()
                .ok_or(ModelError::PreloadedRootFsNotFound);
        }

        Ok(root_fs.to_string())
    }
}

fn opaque(url: &Url) -> &str {
    if url.cannot_be_a_base() { url.path() } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stacks() -> StackPathMap {
        StackPathMap(BTreeMap::from([
            ("cflinuxfs2".to_string(), "/var/vcap/packages/cflinuxfs2/rootfs".to_string()),
        ]))
    }

    fn providers() -> RootFsProviders {
        RootFsProviders::new(&stacks(), &["docker".to_string()])
    }

    #[test]
    fn preloaded_stack_matches_only_known_stacks() {
        let p = providers();
        assert!(p.match_url(&Url::parse("preloaded:cflinuxfs2").unwrap()));
        assert!(!p.match_url(&Url::parse("preloaded:windows2012").unwrap()));
    }

    #[test]
    fn arbitrary_scheme_matches_anything() {
        let p = providers();
        assert!(p.match_url(&Url::parse("docker:///cloudfoundry/grace").unwrap()));
        assert!(!p.match_url(&Url::parse("oci:///cloudfoundry/grace").unwrap()));
    }

    #[test]
    fn providers_encode_with_type_tag() {
        let json = serde_json::to_value(providers()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "docker": {"type": "arbitrary"},
                "preloaded": {"type": "fixed_set", "set": ["cflinuxfs2"]},
            })
        );
        let back: RootFsProviders = serde_json::from_value(json).unwrap();
        assert_eq!(back, providers());
    }

    #[test]
    fn path_for_preloaded_rootfs() {
        let map = stacks();
        assert_eq!(
            map.path_for_root_fs("preloaded:cflinuxfs2").unwrap(),
            "/var/vcap/packages/cflinuxfs2/rootfs"
        );
        assert_eq!(
            map.path_for_root_fs("preloaded:missing"),
            Err(ModelError::PreloadedRootFsNotFound)
        );
    }

    #[test]
    fn path_for_other_rootfs_passes_through() {
        let map = stacks();
        assert_eq!(map.path_for_root_fs("").unwrap(), "");
        assert_eq!(
            map.path_for_root_fs("docker:///busybox").unwrap(),
            "docker:///busybox"
        );
    }
}
