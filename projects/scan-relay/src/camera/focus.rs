use std::collections::BTreeSet;

use serde::Serialize;

/// Focus features exposed by the active capture device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FocusCapabilities {
    pub continuous: bool,
    pub single_shot: bool,
    pub distance: bool,
}

impl FocusCapabilities {
    pub fn has_focus_modes(&self) -> bool {
        self.continuous || self.single_shot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusRequest {
    Continuous,
    SingleShot,
    Manual,
    Distance(u32),
}

/// Best autofocus request the device supports, most capable first.
pub fn negotiate_autofocus(capabilities: FocusCapabilities) -> Option<FocusRequest> {
    if capabilities.continuous {
        Some(FocusRequest::Continuous)
    } else if capabilities.single_shot {
        Some(FocusRequest::SingleShot)
    } else if capabilities.distance {
        // Distance 0 lets the driver pick.
        Some(FocusRequest::Distance(0))
    } else {
        None
    }
}

/// Requests that kick the lens into refocusing, e.g. in low light. Applied in
/// order with a short pause in between.
pub fn force_focus_sequence(capabilities: FocusCapabilities) -> Vec<FocusRequest> {
    if capabilities.has_focus_modes() {
        vec![FocusRequest::Manual, FocusRequest::Continuous]
    } else {
        Vec::new()
    }
}

pub const V4L2_CONTINUOUS_CONTROLS: [&str; 2] = ["focus_automatic_continuous", "focus_auto"];
pub const V4L2_SINGLE_SHOT_CONTROL: &str = "auto_focus_start";
pub const V4L2_DISTANCE_CONTROL: &str = "focus_absolute";

/// Parses `v4l2-ctl --list-ctrls` output into focus capabilities.
pub fn parse_v4l2_controls(stdout: &str) -> FocusCapabilities {
    let names: BTreeSet<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();

    FocusCapabilities {
        continuous: V4L2_CONTINUOUS_CONTROLS
            .iter()
            .any(|control| names.contains(control)),
        single_shot: names.contains(V4L2_SINGLE_SHOT_CONTROL),
        distance: names.contains(V4L2_DISTANCE_CONTROL),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FocusCapabilities, FocusRequest, force_focus_sequence, negotiate_autofocus,
        parse_v4l2_controls,
    };

    #[test]
    fn prefers_continuous_then_single_shot_then_distance() {
        let all = FocusCapabilities {
            continuous: true,
            single_shot: true,
            distance: true,
        };
        assert_eq!(negotiate_autofocus(all), Some(FocusRequest::Continuous));

        let single = FocusCapabilities {
            single_shot: true,
            distance: true,
            ..Default::default()
        };
        assert_eq!(negotiate_autofocus(single), Some(FocusRequest::SingleShot));

        let distance = FocusCapabilities {
            distance: true,
            ..Default::default()
        };
        assert_eq!(negotiate_autofocus(distance), Some(FocusRequest::Distance(0)));

        assert_eq!(negotiate_autofocus(FocusCapabilities::default()), None);
    }

    #[test]
    fn force_focus_needs_a_focus_mode() {
        let distance_only = FocusCapabilities {
            distance: true,
            ..Default::default()
        };
        assert!(force_focus_sequence(distance_only).is_empty());

        let continuous = FocusCapabilities {
            continuous: true,
            ..Default::default()
        };
        assert_eq!(
            force_focus_sequence(continuous),
            vec![FocusRequest::Manual, FocusRequest::Continuous]
        );
    }

    #[test]
    fn reads_focus_controls_from_v4l2_listing() {
        let listing = "
User Controls

                     brightness 0x00980900 (int)    : min=0 max=255 step=1 default=128 value=128

Camera Controls

                  auto_exposure 0x009a0901 (menu)   : min=0 max=3 default=3 value=3
                 focus_absolute 0x009a090a (int)    : min=0 max=250 step=5 default=0 value=0 flags=inactive
     focus_automatic_continuous 0x009a090c (bool)   : default=1 value=1
";
        let capabilities = parse_v4l2_controls(listing);
        assert!(capabilities.continuous);
        assert!(!capabilities.single_shot);
        assert!(capabilities.distance);
    }
}
