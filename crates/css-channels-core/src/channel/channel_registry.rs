//! Channel registry
//!
//! Static catalog of the channels this distribution ships. The order of
//! the catalog is the build order for full builds.

use crate::error::{ReleaseError, Result};

use super::types::{Channel, Variant};

const BUILTIN_CHANNELS: &[Channel] = &[
    Channel::new("stable", Variant::Default, "stable", "stable", true),
    Channel::new("latest", Variant::Default, "latest", "latest", true),
    Channel::new(
        "preview",
        Variant::Default,
        "preview-{stamp}",
        "preview-{stamp}",
        false,
    ),
    Channel::new("prefixed", Variant::Prefixed, "p", "p", false),
    Channel::new("vars", Variant::Vars, "v", "v", false),
    Channel::new("clean", Variant::Clean, "c", "c", false),
];

/// Channel used by `deploy` when none is given
pub const DEFAULT_DEPLOY_CHANNEL: &str = "latest";

/// Ordered, immutable set of channels
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ChannelRegistry {
    /// Registry with the builtin catalog
    pub fn builtin() -> Self {
        Self {
            channels: BUILTIN_CHANNELS.to_vec(),
        }
    }

    /// Registry with a custom catalog, in the given order
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    /// Resolve a channel by id
    pub fn resolve(&self, id: &str) -> Result<&Channel> {
        self.channels
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ReleaseError::UnknownChannel { id: id.to_string() })
    }

    /// All channels in build order
    pub fn all(&self) -> &[Channel] {
        &self.channels
    }

    /// Channel shipping a non-default variant
    pub fn by_variant(&self, variant: Variant) -> Result<&Channel> {
        if variant == Variant::Default {
            return Err(ReleaseError::InvalidArgument {
                message: "the default variant is shipped by several channels".to_string(),
            });
        }
        self.channels
            .iter()
            .find(|c| c.variant == variant)
            .ok_or_else(|| ReleaseError::UnknownChannel {
                id: variant.tag().to_string(),
            })
    }

    /// Map an artifact folder name back to the channel that produced it
    pub fn channel_for_folder(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.owns_folder(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_order_is_fixed() {
        let registry = ChannelRegistry::builtin();
        let ids: Vec<_> = registry.all().iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec!["stable", "latest", "preview", "prefixed", "vars", "clean"]
        );
    }

    #[test]
    fn resolve_unknown_channel() {
        let registry = ChannelRegistry::builtin();
        assert_eq!(registry.resolve("stable").unwrap().id, "stable");

        let err = registry.resolve("nightly").unwrap_err();
        assert!(matches!(err, ReleaseError::UnknownChannel { ref id } if id == "nightly"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn only_stable_and_latest_are_protected() {
        let registry = ChannelRegistry::builtin();
        let protected: Vec<_> = registry
            .all()
            .iter()
            .filter(|c| c.protected_by_default)
            .map(|c| c.id)
            .collect();
        assert_eq!(protected, vec!["stable", "latest"]);
    }

    #[test]
    fn lookup_by_variant() {
        let registry = ChannelRegistry::builtin();
        assert_eq!(registry.by_variant(Variant::Prefixed).unwrap().id, "prefixed");
        assert_eq!(registry.by_variant(Variant::Vars).unwrap().remote_path, "v");
        assert!(registry.by_variant(Variant::Default).is_err());
    }

    #[test]
    fn folder_to_channel() {
        let registry = ChannelRegistry::builtin();
        assert_eq!(
            registry.channel_for_folder("preview-2024-01-01").map(|c| c.id),
            Some("preview")
        );
        assert_eq!(registry.channel_for_folder("p").map(|c| c.id), Some("prefixed"));
        assert!(registry.channel_for_folder("index.html").is_none());
        assert!(registry.channel_for_folder("random").is_none());
    }
}
