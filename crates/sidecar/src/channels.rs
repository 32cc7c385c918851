//! Résolution des noms de canaux

use network::{ChannelInfo, ROOT_CHANNEL_ID};

/// Instantané de l'annuaire des canaux, dans l'ordre annoncé par le serveur
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelDirectory {
    entries: Vec<ChannelInfo>,
}

impl ChannelDirectory {
    pub fn new(entries: Vec<ChannelInfo>) -> Self {
        Self { entries }
    }

    /// Identifiant du premier canal portant exactement ce nom
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|channel| channel.name == name).map(|channel| channel.id)
    }

    /// Comme `lookup`, mais retombe sur la racine
    ///
    /// Un nom vide désigne toujours la racine. La comparaison est exacte
    /// (casse et espaces compris).
    pub fn resolve(&self, name: &str) -> u32 {
        if name.is_empty() {
            return ROOT_CHANNEL_ID;
        }
        self.lookup(name).unwrap_or(ROOT_CHANNEL_ID)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> ChannelDirectory {
        ChannelDirectory::new(vec![
            ChannelInfo::new(0, "Root"),
            ChannelInfo::new(4, "Demo"),
            ChannelInfo::new(7, "Lobby"),
            ChannelInfo::new(9, "Demo"),
        ])
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(directory().resolve("Lobby"), 7);
        assert_eq!(directory().lookup("Lobby"), Some(7));
    }

    #[test]
    fn test_unknown_and_empty_fall_back_to_root() {
        let directory = directory();
        assert_eq!(directory.resolve("Nonexistent"), ROOT_CHANNEL_ID);
        assert_eq!(directory.resolve(""), ROOT_CHANNEL_ID);
        assert_eq!(directory.lookup("Nonexistent"), None);
    }

    #[test]
    fn test_match_is_case_and_space_sensitive() {
        let directory = directory();
        assert_eq!(directory.resolve("demo"), ROOT_CHANNEL_ID);
        assert_eq!(directory.resolve("Demo "), ROOT_CHANNEL_ID);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        assert_eq!(directory().resolve("Demo"), 4);
    }

    #[test]
    fn test_empty_directory() {
        let directory = ChannelDirectory::default();
        assert!(directory.is_empty());
        assert_eq!(directory.resolve("Demo"), ROOT_CHANNEL_ID);
    }
}
