use std::collections::BTreeSet;

/// A capability list that may be missing altogether.
///
/// `Available` with an empty set means the server answered and has nothing to
/// offer; `Unavailable` means the listing itself failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Listing<T> {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Listing::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Listing::Available(items) => Some(items),
            Listing::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Listing::Available(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Listing::Available(_) => None,
            Listing::Unavailable { reason } => Some(reason),
        }
    }
}

impl<T: Default> Default for Listing<T> {
    fn default() -> Self {
        Listing::Available(T::default())
    }
}

/// Snapshot of what the server offers, fetched on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub tools: BTreeSet<String>,
    pub resources: BTreeSet<String>,
    pub prompts: Listing<BTreeSet<String>>,
}

static NO_PROMPTS: BTreeSet<String> = BTreeSet::new();

impl Capabilities {
    /// Prompt names, or an empty set when the prompt listing failed.
    pub fn prompt_names(&self) -> &BTreeSet<String> {
        self.prompts.available().unwrap_or(&NO_PROMPTS)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    pub fn has_resource(&self, uri: &str) -> bool {
        self.resources.contains(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_prompts_read_as_empty() {
        let caps = Capabilities {
            tools: ["search_gigs".to_string()].into(),
            resources: BTreeSet::new(),
            prompts: Listing::unavailable("Method not found"),
        };
        assert!(caps.prompt_names().is_empty());
        assert_eq!(caps.prompts.reason(), Some("Method not found"));
        assert!(caps.has_tool("search_gigs"));
    }

    #[test]
    fn test_empty_listing_is_still_available() {
        let listing: Listing<BTreeSet<String>> = Listing::default();
        assert!(listing.is_available());
        assert_eq!(listing.available().map(BTreeSet::len), Some(0));
        assert_ne!(listing, Listing::unavailable("boom"));
    }
}
