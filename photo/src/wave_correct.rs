//! Wave correction: rotate the rig so the cameras' common "up" becomes the
//! world vertical, removing the wavy horizon of a drifting pan.

use cv_core::{orthonormalize, CameraParams};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveCorrectKind {
    #[default]
    Horizontal,
    Vertical,
    None,
}

/// Applies a common left rotation to every camera. Leaves the cameras
/// untouched when the orientation is ill-conditioned.
pub fn wave_correct(cameras: &mut [CameraParams], kind: WaveCorrectKind) {
    if kind == WaveCorrectKind::None || cameras.len() <= 1 {
        return;
    }

    let mut moment = Matrix3::zeros();
    for cam in cameras.iter() {
        let col = cam.rotation.column(0).into_owned();
        moment += col * col.transpose();
    }

    let eig = SymmetricEigen::new(moment);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let trace = moment.trace().max(f64::EPSILON);

    let rg1: Vector3<f64> = match kind {
        WaveCorrectKind::Horizontal => {
            let (l0, l1) = (eig.eigenvalues[order[0]], eig.eigenvalues[order[1]]);
            if (l1 - l0).abs() <= 1e-9 * trace {
                debug!("wave correction skipped: degenerate moment");
                return;
            }
            eig.eigenvectors.column(order[0]).into_owned()
        }
        WaveCorrectKind::Vertical => {
            let (l1, l2) = (eig.eigenvalues[order[1]], eig.eigenvalues[order[2]]);
            if (l2 - l1).abs() <= 1e-9 * trace {
                debug!("wave correction skipped: degenerate moment");
                return;
            }
            eig.eigenvectors.column(order[2]).into_owned()
        }
        WaveCorrectKind::None => return,
    };

    let img_k: Vector3<f64> = cameras
        .iter()
        .map(|c| c.rotation.column(2).into_owned())
        .sum();
    let mut rg0 = rg1.cross(&img_k);
    let norm = rg0.norm();
    if norm <= 1e-12 {
        debug!("wave correction skipped: viewing directions cancel out");
        return;
    }
    rg0 /= norm;
    let mut rg1 = rg1;

    let conf: f64 = match kind {
        WaveCorrectKind::Horizontal => cameras
            .iter()
            .map(|c| rg0.dot(&c.rotation.column(0)))
            .sum(),
        _ => -cameras
            .iter()
            .map(|c| rg1.dot(&c.rotation.column(0)))
            .sum::<f64>(),
    };
    if conf < 0.0 {
        rg0 = -rg0;
        rg1 = -rg1;
    }
    let rg2 = rg0.cross(&rg1);

    let correction = Matrix3::from_rows(&[rg0.transpose(), rg1.transpose(), rg2.transpose()]);
    for cam in cameras.iter_mut() {
        cam.rotation = orthonormalize(&(correction * cam.rotation));
    }
}
