//! Point cloud augmentation.

use crate::{
    common::*,
    point_cloud::{read_label, read_point_cloud},
    projection::clip_with_matrix,
};

/// Loads and augments a point cloud together with its label.
pub trait Augmenter
where
    Self: Debug + Send + Sync,
{
    /// Returns the augmented `[N, 4]` points and the label lines.
    ///
    /// `image_width` and `image_height` are the dimensions of the original,
    /// unresized camera image.
    fn augment(
        &self,
        point_cloud_path: &Path,
        label_path: &Path,
        calib_mat: ArrayView2<f32>,
        image_width: usize,
        image_height: usize,
        rng: &mut dyn RngCore,
    ) -> OpsResult<(Array2<f32>, Vec<String>)>;
}

/// Clips the cloud to the camera frustum, then applies label-invariant
/// perturbations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrustumAugmenter {
    /// Probability to drop each point.
    pub dropout_prob: f64,
    /// Maximum absolute noise added to the intensity channel.
    pub intensity_jitter: f32,
}

impl Default for FrustumAugmenter {
    fn default() -> Self {
        Self {
            dropout_prob: 0.05,
            intensity_jitter: 0.02,
        }
    }
}

impl Augmenter for FrustumAugmenter {
    fn augment(
        &self,
        point_cloud_path: &Path,
        label_path: &Path,
        calib_mat: ArrayView2<f32>,
        image_width: usize,
        image_height: usize,
        rng: &mut dyn RngCore,
    ) -> OpsResult<(Array2<f32>, Vec<String>)> {
        let points = read_point_cloud(point_cloud_path)?;
        let label = read_label(label_path)?;
        let points = clip_with_matrix(points.view(), calib_mat, image_height, image_width);

        let kept: Vec<usize> = (0..points.nrows())
            .filter(|_| self.dropout_prob <= 0.0 || !rng.gen_bool(self.dropout_prob.min(1.0)))
            .collect();
        let mut points = points.select(Axis(0), &kept);

        if self.intensity_jitter > 0.0 {
            let jitter = self.intensity_jitter;
            points.column_mut(3).iter_mut().for_each(|intensity| {
                *intensity = (*intensity + rng.gen_range(-jitter..=jitter)).max(0.0);
            });
        }

        Ok((points, label))
    }
}
