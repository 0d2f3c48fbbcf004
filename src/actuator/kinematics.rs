// Leg forward kinematics for the three-joint (abad, hip, knee) legs
// Produces foot position, foot velocity, the leg Jacobian and a diagonal
// approximate inverse mass matrix used to scale Cartesian stiffness.

use serde::Serialize;

use crate::config::{JOINT_INERTIA, L1, L2, L3};

pub type Vec3 = [f32; 3];
pub type Mat3 = [[f32; 3]; 3];

/// Link lengths (m): abad offset, thigh, shank
#[derive(Debug, Clone, Copy)]
pub struct LegGeometry {
    pub l1: f32,
    pub l2: f32,
    pub l3: f32,
}

impl Default for LegGeometry {
    fn default() -> Self {
        Self {
            l1: L1,
            l2: L2,
            l3: L3,
        }
    }
}

/// Kinematic state of one leg, derived fresh every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LegKinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    pub jacobian: Mat3,
    pub inv_mass: Mat3,
}

impl LegKinematics {
    /// Compute kinematics for the rig's legs
    ///
    /// # Arguments
    /// * `q` - Joint angles [abad, hip, knee] in rad (offset-corrected)
    /// * `dq` - Joint velocities in rad/s
    pub fn compute(q: &Vec3, dq: &Vec3) -> Self {
        Self::compute_with_params(q, dq, &LegGeometry::default(), &JOINT_INERTIA)
    }

    /// Compute kinematics with custom link lengths and joint inertias
    pub fn compute_with_params(q: &Vec3, dq: &Vec3, leg: &LegGeometry, inertia: &Vec3) -> Self {
        let LegGeometry { l1, l2, l3 } = *leg;
        let (s1, c1) = q[0].sin_cos();
        let (s2, c2) = q[1].sin_cos();
        let (s3, c3) = q[2].sin_cos();

        let c23 = c2 * c3 - s2 * s3;
        let s23 = s2 * c3 + c2 * s3;

        let position = [
            l3 * s23 + l2 * s2,
            l1 * c1 + l3 * s1 * c23 + l2 * c2 * s1,
            l1 * s1 - l3 * c1 * c23 - l2 * c1 * c2,
        ];

        // Foot x does not depend on abad
        let jacobian = [
            [0.0, l3 * c23 + l2 * c2, l3 * c23],
            [
                l3 * c1 * c23 + l2 * c1 * c2 - l1 * s1,
                -l3 * s1 * s23 - l2 * s1 * s2,
                -l3 * s1 * s23,
            ],
            [
                l3 * s1 * c23 + l2 * c2 * s1 + l1 * c1,
                l3 * c1 * s23 + l2 * c1 * s2,
                l3 * c1 * s23,
            ],
        ];

        let mut inv_mass = [[0.0f32; 3]; 3];
        for (axis, row) in jacobian.iter().enumerate() {
            inv_mass[axis][axis] = row
                .iter()
                .zip(inertia)
                .map(|(j, i)| j * j / i)
                .sum();
        }

        Self {
            position,
            velocity: mat_vec(&jacobian, dq),
            jacobian,
            inv_mass,
        }
    }
}

/// Matrix-vector product
pub fn mat_vec(m: &Mat3, v: &Vec3) -> Vec3 {
    (*m).map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}
