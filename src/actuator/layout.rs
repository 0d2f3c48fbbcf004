// Leg and joint identifiers for the two-leg, six-actuator rig
//
// Both legs share the same actuator ids (abad=1, hip=2, knee=3); the bus a
// frame travels on tells the legs apart.

use std::fmt::{self, Display};
use std::ops::{Index, IndexMut};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    One = 0,
    Two = 1,
}

impl Leg {
    pub const ALL: [Leg; 2] = [Leg::One, Leg::Two];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::One => f.write_str("leg 1"),
            Leg::Two => f.write_str("leg 2"),
        }
    }
}

/// Joints of one leg, in transmit group order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Abad = 0,
    Hip = 1,
    Knee = 2,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Abad, Joint::Hip, Joint::Knee];

    /// Map a 1-indexed actuator id to its joint
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Joint::Abad),
            2 => Some(Joint::Hip),
            3 => Some(Joint::Knee),
            _ => None,
        }
    }

    /// Actuator id on the bus (also the CAN id)
    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Joint::Abad => f.write_str("abad"),
            Joint::Hip => f.write_str("hip"),
            Joint::Knee => f.write_str("knee"),
        }
    }
}

/// Per-leg, per-joint table indexed by `Leg` and `Joint`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerActuator<T>(pub [[T; 3]; 2]);

impl<T: Copy> PerActuator<T> {
    pub fn splat(value: T) -> Self {
        Self([[value; 3]; 2])
    }

    /// Iterate in transmit order: abad pair, hip pair, knee pair
    pub fn iter_group_order(&self) -> impl Iterator<Item = (Leg, Joint, T)> + '_ {
        Joint::ALL.into_iter().flat_map(move |joint| {
            Leg::ALL
                .into_iter()
                .map(move |leg| (leg, joint, self.0[leg.index()][joint.index()]))
        })
    }
}

impl<T> Index<Leg> for PerActuator<T> {
    type Output = [T; 3];

    fn index(&self, leg: Leg) -> &Self::Output {
        &self.0[leg.index()]
    }
}

impl<T> IndexMut<Leg> for PerActuator<T> {
    fn index_mut(&mut self, leg: Leg) -> &mut Self::Output {
        &mut self.0[leg.index()]
    }
}

impl<T> Index<(Leg, Joint)> for PerActuator<T> {
    type Output = T;

    fn index(&self, (leg, joint): (Leg, Joint)) -> &Self::Output {
        &self.0[leg.index()][joint.index()]
    }
}

impl<T> IndexMut<(Leg, Joint)> for PerActuator<T> {
    fn index_mut(&mut self, (leg, joint): (Leg, Joint)) -> &mut Self::Output {
        &mut self.0[leg.index()][joint.index()]
    }
}
