//! HUD element layout for the portrait (mobile) format.
//!
//! Each element is a rectangle cut out of the gameplay frame and pasted
//! onto the portrait canvas at a user-authored position and scale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// Which on-screen element a HUD entry captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HudRole {
    /// Inventory / loot bar.
    Loot,
    /// Player health and shield bars.
    Health,
    /// Health bars in the larger boss layout.
    BossHealth,
    /// Eliminations / players-left banner.
    Stats,
    /// Teammate panel.
    Team,
    /// "Spectating" badge.
    Spectating,
}

impl HudRole {
    pub fn as_str(self) -> &'static str {
        match self {
            HudRole::Loot => "loot",
            HudRole::Health => "health",
            HudRole::BossHealth => "boss_health",
            HudRole::Stats => "stats",
            HudRole::Team => "team",
            HudRole::Spectating => "spectating",
        }
    }
}

/// One HUD element's crop and placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HudElement {
    /// Source rectangle in the 1920x1080 reference frame.
    pub crop_1080: Rect,

    /// User scale factor applied on top of the backend canvas scale.
    pub scale: f64,

    /// Top-left placement on the 1080-wide portrait layout.
    pub position: Point,

    /// Paint order; lower values are drawn first.
    pub z: i32,
}

/// All configured HUD elements for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HudCoordinates {
    pub elements: BTreeMap<HudRole, HudElement>,
}

impl HudCoordinates {
    /// No HUD elements at all.
    pub fn empty() -> Self {
        Self {
            elements: BTreeMap::new(),
        }
    }

    /// Elements to composite, back-to-front.
    ///
    /// Exactly one of the two health variants is used, selected by
    /// `boss_hp`; the teammate panel is only included when requested.
    /// Ties in `z` keep the role order.
    pub fn layers(&self, boss_hp: bool, show_teammates: bool) -> Vec<(HudRole, HudElement)> {
        let mut layers: Vec<(HudRole, HudElement)> = self
            .elements
            .iter()
            .filter(|(role, _)| match role {
                HudRole::Health => !boss_hp,
                HudRole::BossHealth => boss_hp,
                HudRole::Team => show_teammates,
                _ => true,
            })
            .filter(|(_, element)| !element.crop_1080.is_empty() && element.scale > 0.0)
            .map(|(role, element)| (*role, *element))
            .collect();
        layers.sort_by_key(|(_, element)| element.z);
        layers
    }
}

impl Default for HudCoordinates {
    fn default() -> Self {
        let mut elements = BTreeMap::new();
        elements.insert(
            HudRole::Loot,
            HudElement {
                crop_1080: Rect::new(1390.0, 880.0, 500.0, 170.0),
                scale: 1.0,
                position: Point::new(560.0, 1420.0),
                z: 10,
            },
        );
        elements.insert(
            HudRole::Health,
            HudElement {
                crop_1080: Rect::new(40.0, 950.0, 420.0, 100.0),
                scale: 1.1,
                position: Point::new(20.0, 1440.0),
                z: 20,
            },
        );
        elements.insert(
            HudRole::BossHealth,
            HudElement {
                crop_1080: Rect::new(40.0, 900.0, 480.0, 150.0),
                scale: 1.0,
                position: Point::new(20.0, 1400.0),
                z: 20,
            },
        );
        elements.insert(
            HudRole::Stats,
            HudElement {
                crop_1080: Rect::new(1580.0, 20.0, 320.0, 190.0),
                scale: 1.0,
                position: Point::new(740.0, 40.0),
                z: 30,
            },
        );
        elements.insert(
            HudRole::Team,
            HudElement {
                crop_1080: Rect::new(20.0, 220.0, 300.0, 260.0),
                scale: 0.9,
                position: Point::new(20.0, 40.0),
                z: 40,
            },
        );
        elements.insert(
            HudRole::Spectating,
            HudElement {
                crop_1080: Rect::new(760.0, 20.0, 400.0, 60.0),
                scale: 1.0,
                position: Point::new(340.0, 300.0),
                z: 50,
            },
        );
        Self { elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layers_follow_z_order() {
        let hud = HudCoordinates::default();
        let roles: Vec<HudRole> = hud.layers(false, true).into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            roles,
            vec![
                HudRole::Loot,
                HudRole::Health,
                HudRole::Stats,
                HudRole::Team,
                HudRole::Spectating
            ]
        );
    }

    #[test]
    fn test_boss_variant_replaces_health() {
        let hud = HudCoordinates::default();
        let roles: Vec<HudRole> = hud.layers(true, false).into_iter().map(|(r, _)| r).collect();
        assert!(roles.contains(&HudRole::BossHealth));
        assert!(!roles.contains(&HudRole::Health));
        assert!(!roles.contains(&HudRole::Team));
    }

    #[test]
    fn test_degenerate_elements_are_skipped() {
        let mut hud = HudCoordinates::empty();
        hud.elements.insert(
            HudRole::Stats,
            HudElement {
                crop_1080: Rect::new(0.0, 0.0, 0.0, 10.0),
                scale: 1.0,
                position: Point::default(),
                z: 0,
            },
        );
        assert!(hud.layers(false, true).is_empty());
    }
}
