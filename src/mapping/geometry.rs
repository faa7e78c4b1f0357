//! Rotation conversions.
//!
//! Source orientations are axis-angle 3-vectors (direction = rotation
//! axis, length = angle in radians). The destination wants ZYZ Euler
//! angles in degrees, decomposed with the same branch structure the
//! downstream refinement code uses, so converted angles match what it
//! would compute itself.

/// Exponential map: axis-angle vector to rotation matrix
pub fn expmap(pose: [f64; 3]) -> [[f64; 3]; 3] {
    let theta = (pose[0] * pose[0] + pose[1] * pose[1] + pose[2] * pose[2]).sqrt();
    if theta < 1e-16 {
        return identity();
    }
    let w = [pose[0] / theta, pose[1] / theta, pose[2] / theta];
    let k = [
        [0.0, -w[2], w[1]],
        [w[2], 0.0, -w[0]],
        [-w[1], w[0], 0.0],
    ];
    let k2 = mat_mul(&k, &k);
    let (s, c) = theta.sin_cos();
    let mut r = identity();
    for i in 0..3 {
        for j in 0..3 {
            r[i][j] += s * k[i][j] + (1.0 - c) * k2[i][j];
        }
    }
    r
}

/// Decompose a rotation matrix into ZYZ Euler angles (radians),
/// returned as (rot, tilt, psi)
pub fn rot_to_euler(r: &[[f64; 3]; 3]) -> (f64, f64, f64) {
    let epsilon = f64::EPSILON;
    let abs_sb = (r[0][2] * r[0][2] + r[1][2] * r[1][2]).sqrt();
    if abs_sb > 16.0 * epsilon {
        let gamma = r[1][2].atan2(-r[0][2]);
        let alpha = r[2][1].atan2(r[2][0]);
        let sign_sb = if gamma.sin().abs() < epsilon {
            (-r[0][2] / gamma.cos()).signum()
        } else if gamma.sin() > 0.0 {
            r[1][2].signum()
        } else {
            -r[1][2].signum()
        };
        let beta = (sign_sb * abs_sb).atan2(r[2][2]);
        (alpha, beta, gamma)
    } else if r[2][2] > 0.0 {
        (0.0, 0.0, (-r[1][0]).atan2(r[0][0]))
    } else {
        (0.0, std::f64::consts::PI, r[1][0].atan2(-r[0][0]))
    }
}

/// Axis-angle pose straight to Euler angles in degrees
pub fn pose_to_euler_deg(pose: [f64; 3]) -> (f64, f64, f64) {
    let (rot, tilt, psi) = rot_to_euler(&expmap(pose));
    (rot.to_degrees(), tilt.to_degrees(), psi.to_degrees())
}

fn identity() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for (k, b_row) in b.iter().enumerate() {
                out[i][j] += a[i][k] * b_row[j];
            }
        }
    }
    out
}
