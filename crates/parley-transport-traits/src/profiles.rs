//! Display profiles

use serde::{Deserialize, Serialize};

use crate::Address;

/// Display profile of an account, as returned by a
/// [`ProfileResolver`](crate::ProfileResolver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Account address
    pub address: Address,
    /// Social handle without the leading `@`, e.g. `alice.lens`
    pub handle: Option<String>,
    /// Free-form display name
    pub display_name: Option<String>,
    /// Avatar image URL
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Name to show for this profile: the display name when set, otherwise
    /// the `@handle`.
    pub fn best_name(&self) -> Option<String> {
        let display = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(name) = display {
            return Some(name.to_string());
        }
        self.handle
            .as_deref()
            .map(|h| h.trim().trim_start_matches('@'))
            .filter(|h| !h.is_empty())
            .map(|h| format!("@{h}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(handle: Option<&str>, display_name: Option<&str>) -> Profile {
        Profile {
            address: "0xabc".into(),
            handle: handle.map(Into::into),
            display_name: display_name.map(Into::into),
            avatar_url: None,
        }
    }

    #[test]
    fn display_name_wins() {
        assert_eq!(
            profile(Some("alice.lens"), Some("Alice")).best_name().as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn blank_display_name_falls_back_to_handle() {
        assert_eq!(
            profile(Some("@alice.lens"), Some("   ")).best_name().as_deref(),
            Some("@alice.lens")
        );
    }

    #[test]
    fn no_name_at_all() {
        assert_eq!(profile(None, None).best_name(), None);
    }
}
