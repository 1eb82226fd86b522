//! Gesture vocabulary.
//!
//! The set of gestures is closed: seven categories come from the pre-trained
//! recognizer and one (`OkSign`) is derived from hand landmarks. The wire name
//! (`OPEN_PALM`, ...) is what Home Assistant sees in the `state` field.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Wire name of the "no gesture" sentinel emitted by the recognizer.
pub const NO_GESTURE: &str = "NONE";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gesture {
    ClosedFist,
    OpenPalm,
    PointingUp,
    ThumbsDown,
    ThumbsUp,
    Peace,
    ILoveYou,
    OkSign,
}

impl Gesture {
    pub const ALL: [Gesture; 8] = [
        Gesture::ClosedFist,
        Gesture::OpenPalm,
        Gesture::PointingUp,
        Gesture::ThumbsDown,
        Gesture::ThumbsUp,
        Gesture::Peace,
        Gesture::ILoveYou,
        Gesture::OkSign,
    ];

    /// Name used on the MQTT state topic and in `ENABLE_<NAME>` config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::ClosedFist => "CLOSED_FIST",
            Gesture::OpenPalm => "OPEN_PALM",
            Gesture::PointingUp => "POINTING_UP",
            Gesture::ThumbsDown => "THUMBS_DOWN",
            Gesture::ThumbsUp => "THUMBS_UP",
            Gesture::Peace => "PEACE",
            Gesture::ILoveYou => "I_LOVE_YOU",
            Gesture::OkSign => "OK_SIGN",
        }
    }

    /// Config key toggling this gesture, e.g. `ENABLE_OPEN_PALM`.
    pub fn enable_key(&self) -> String {
        format!("ENABLE_{}", self.as_str())
    }

    /// Map a recognizer category name (`Open_Palm`, `Victory`, ...) to a gesture.
    ///
    /// Returns `None` for the recognizer's own sentinels (`None`, `Unknown`)
    /// and for anything outside the vocabulary.
    pub fn from_model_category(category: &str) -> Option<Gesture> {
        match category {
            "Closed_Fist" => Some(Gesture::ClosedFist),
            "Open_Palm" => Some(Gesture::OpenPalm),
            "Pointing_Up" => Some(Gesture::PointingUp),
            "Thumb_Down" => Some(Gesture::ThumbsDown),
            "Thumb_Up" => Some(Gesture::ThumbsUp),
            "Victory" => Some(Gesture::Peace),
            "ILoveYou" => Some(Gesture::ILoveYou),
            _ => None,
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gesture {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_uppercase();
        Gesture::ALL
            .into_iter()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown gesture '{}'", s))
    }
}

/// Set of gestures allowed to reach the stability buffer.
///
/// A detected-but-disabled gesture is treated exactly like "no gesture".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GestureFilter {
    enabled: BTreeSet<Gesture>,
}

impl GestureFilter {
    pub fn all() -> Self {
        Self {
            enabled: Gesture::ALL.into_iter().collect(),
        }
    }

    pub fn set(&mut self, gesture: Gesture, enabled: bool) {
        if enabled {
            self.enabled.insert(gesture);
        } else {
            self.enabled.remove(&gesture);
        }
    }

    pub fn is_enabled(&self, gesture: Gesture) -> bool {
        self.enabled.contains(&gesture)
    }

    pub fn enabled(&self) -> impl Iterator<Item = Gesture> + '_ {
        self.enabled.iter().copied()
    }

    /// Pass enabled gestures through, collapse everything else to `None`.
    pub fn admit(&self, gesture: Option<Gesture>) -> Option<Gesture> {
        gesture.filter(|g| self.is_enabled(*g))
    }
}

impl Default for GestureFilter {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_categories_map_to_vocabulary() {
        assert_eq!(
            Gesture::from_model_category("Victory"),
            Some(Gesture::Peace)
        );
        assert_eq!(
            Gesture::from_model_category("Thumb_Up"),
            Some(Gesture::ThumbsUp)
        );
        assert_eq!(Gesture::from_model_category("None"), None);
        assert_eq!(Gesture::from_model_category("Unknown"), None);
    }

    #[test]
    fn wire_names_parse_back() {
        for gesture in Gesture::ALL {
            assert_eq!(gesture.as_str().parse::<Gesture>().unwrap(), gesture);
        }
        assert_eq!("ok_sign".parse::<Gesture>().unwrap(), Gesture::OkSign);
        assert!(NO_GESTURE.parse::<Gesture>().is_err());
    }

    #[test]
    fn enable_key_uses_wire_name() {
        assert_eq!(Gesture::ILoveYou.enable_key(), "ENABLE_I_LOVE_YOU");
    }

    #[test]
    fn filter_collapses_disabled_gestures() {
        let mut filter = GestureFilter::all();
        filter.set(Gesture::Peace, false);

        assert_eq!(filter.admit(Some(Gesture::Peace)), None);
        assert_eq!(filter.admit(Some(Gesture::OpenPalm)), Some(Gesture::OpenPalm));
        assert_eq!(filter.admit(None), None);
        assert_eq!(filter.enabled().count(), 7);
    }
}
