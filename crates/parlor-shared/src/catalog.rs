//! The fixed customization catalog: banner, frame and effect presets plus
//! the accent palette, and the profile completeness checklist derived from
//! them. Ids are validated against the catalog on write; there is no other
//! server-side meaning attached to them.

use crate::documents::User;
use crate::error::ValidationError;

/// One selectable cosmetic preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlairPreset {
    pub id: &'static str,
    pub label: &'static str,
}

pub const DEFAULT_BANNER: &str = "slate";
pub const DEFAULT_FRAME: &str = "none";
pub const DEFAULT_EFFECT: &str = "none";
pub const DEFAULT_ACCENT: &str = "#5865f2";

pub const BANNERS: &[FlairPreset] = &[
    FlairPreset { id: "slate", label: "Slate" },
    FlairPreset { id: "sunset", label: "Sunset" },
    FlairPreset { id: "ocean", label: "Ocean" },
    FlairPreset { id: "forest", label: "Forest" },
    FlairPreset { id: "aurora", label: "Aurora" },
    FlairPreset { id: "ember", label: "Ember" },
    FlairPreset { id: "midnight", label: "Midnight" },
];

pub const FRAMES: &[FlairPreset] = &[
    FlairPreset { id: "none", label: "None" },
    FlairPreset { id: "ring", label: "Ring" },
    FlairPreset { id: "hex", label: "Hexagon" },
    FlairPreset { id: "petals", label: "Petals" },
    FlairPreset { id: "pixel", label: "Pixel" },
];

pub const EFFECTS: &[FlairPreset] = &[
    FlairPreset { id: "none", label: "None" },
    FlairPreset { id: "sparkle", label: "Sparkle" },
    FlairPreset { id: "confetti", label: "Confetti" },
    FlairPreset { id: "rain", label: "Rain" },
    FlairPreset { id: "snow", label: "Snow" },
];

/// Accent palette; also the pool avatar colors are assigned from at sign-up.
pub const ACCENTS: &[&str] = &[
    "#5865f2", "#eb459e", "#ed4245", "#fee75c", "#57f287", "#1abc9c",
    "#e67e22", "#9b59b6",
];

fn contains(presets: &[FlairPreset], id: &str) -> bool {
    presets.iter().any(|p| p.id == id)
}

pub fn validate_banner(id: &str) -> Result<(), ValidationError> {
    if contains(BANNERS, id) {
        Ok(())
    } else {
        Err(ValidationError::UnknownFlair { kind: "banner", id: id.to_string() })
    }
}

pub fn validate_frame(id: &str) -> Result<(), ValidationError> {
    if contains(FRAMES, id) {
        Ok(())
    } else {
        Err(ValidationError::UnknownFlair { kind: "frame", id: id.to_string() })
    }
}

pub fn validate_effect(id: &str) -> Result<(), ValidationError> {
    if contains(EFFECTS, id) {
        Ok(())
    } else {
        Err(ValidationError::UnknownFlair { kind: "effect", id: id.to_string() })
    }
}

pub fn validate_accent(color: &str) -> Result<(), ValidationError> {
    if ACCENTS.contains(&color) {
        Ok(())
    } else {
        Err(ValidationError::UnknownFlair { kind: "accent", id: color.to_string() })
    }
}

// ---------------------------------------------------------------------------
// Completeness
// ---------------------------------------------------------------------------

/// Advisory profile completeness: how many checklist items are satisfied.
/// Crossing 100% once grants [`crate::constants::BADGE_PROFILE_COMPLETE`];
/// nothing else is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    /// 0..=100.
    pub percent: u8,
    /// Human-readable labels for the unmet items.
    pub missing: Vec<&'static str>,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

/// Score a profile against the fixed checklist.
pub fn completeness(user: &User) -> Completeness {
    let items: [(&'static str, bool); 7] = [
        ("display name", user.display_name.chars().count() >= 3),
        ("bio", !user.bio.trim().is_empty()),
        ("pronouns", !user.profile.pronouns.trim().is_empty()),
        ("activity", !user.profile.activity.trim().is_empty()),
        ("banner", user.profile.banner != DEFAULT_BANNER),
        ("frame", user.profile.frame != DEFAULT_FRAME),
        ("effect", user.profile.effect != DEFAULT_EFFECT),
    ];

    let done = items.iter().filter(|(_, ok)| *ok).count();
    let missing = items
        .iter()
        .filter(|(_, ok)| !*ok)
        .map(|(label, _)| *label)
        .collect();

    Completeness {
        percent: (done * 100 / items.len()) as u8,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::documents::{Presence, ProfileFlair};
    use crate::types::UserId;

    fn bare_user() -> User {
        User {
            id: UserId::new(),
            username: "ada".into(),
            username_lower: "ada".into(),
            display_name: "Ada".into(),
            email: "ada@example.com".into(),
            avatar_color: DEFAULT_ACCENT.into(),
            bio: String::new(),
            status: Presence::Online,
            badges: BTreeSet::new(),
            profile: ProfileFlair::default(),
            created_at: Utc::now(),
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn defaults_are_in_catalog() {
        assert!(validate_banner(DEFAULT_BANNER).is_ok());
        assert!(validate_frame(DEFAULT_FRAME).is_ok());
        assert!(validate_effect(DEFAULT_EFFECT).is_ok());
        assert!(validate_accent(DEFAULT_ACCENT).is_ok());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert!(validate_banner("vaporwave").is_err());
        assert!(validate_accent("#123456").is_err());
    }

    #[test]
    fn bare_profile_scores_one_item() {
        // Only the display name is set on a fresh account.
        let c = completeness(&bare_user());
        assert_eq!(c.percent, 100 / 7);
        assert_eq!(c.missing.len(), 6);
        assert!(!c.is_complete());
    }

    #[test]
    fn full_profile_scores_100() {
        let mut user = bare_user();
        user.bio = "I build things.".into();
        user.profile = ProfileFlair {
            pronouns: "she/her".into(),
            activity: "soldering".into(),
            banner: "sunset".into(),
            frame: "ring".into(),
            effect: "sparkle".into(),
            accent_color: "#eb459e".into(),
        };
        let c = completeness(&user);
        assert!(c.is_complete());
        assert!(c.missing.is_empty());
    }
}
