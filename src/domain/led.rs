//! LED lighting modes and the presentation view derived from them.

use serde::{Deserialize, Serialize};

/// Lighting behaviour understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedMode {
    Static,
    Breathe,
    Colorful,
    BreatheColor,
}

/// Which editor the presentation layer shows for the LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedTab {
    ColorPicker,
    Animation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedView {
    pub tab: LedTab,
    pub is_breathing: bool,
    pub is_rainbow: bool,
}

impl LedMode {
    pub fn from_flags(is_breathing: bool, is_rainbow: bool) -> Self {
        match (is_rainbow, is_breathing) {
            (false, false) => Self::Static,
            (false, true) => Self::Breathe,
            (true, false) => Self::Colorful,
            (true, true) => Self::BreatheColor,
        }
    }

    pub fn is_breathing(self) -> bool {
        matches!(self, Self::Breathe | Self::BreatheColor)
    }

    pub fn is_rainbow(self) -> bool {
        matches!(self, Self::Colorful | Self::BreatheColor)
    }

    pub fn view(self) -> LedView {
        LedView {
            tab: if self.is_rainbow() {
                LedTab::Animation
            } else {
                LedTab::ColorPicker
            },
            is_breathing: self.is_breathing(),
            is_rainbow: self.is_rainbow(),
        }
    }
}

impl From<LedView> for LedMode {
    fn from(view: LedView) -> Self {
        Self::from_flags(view.is_breathing, view.is_rainbow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, LedMode::Static, LedTab::ColorPicker)]
    #[case(true, false, LedMode::Breathe, LedTab::ColorPicker)]
    #[case(false, true, LedMode::Colorful, LedTab::Animation)]
    #[case(true, true, LedMode::BreatheColor, LedTab::Animation)]
    fn test_mode_flags_bijection(
        #[case] is_breathing: bool,
        #[case] is_rainbow: bool,
        #[case] mode: LedMode,
        #[case] tab: LedTab,
    ) {
        let encoded = LedMode::from_flags(is_breathing, is_rainbow);
        assert_eq!(encoded, mode);

        let view = encoded.view();
        assert_eq!(view.tab, tab);
        assert_eq!((view.is_breathing, view.is_rainbow), (is_breathing, is_rainbow));
        assert_eq!(LedMode::from(view), mode);
    }
}
