use super::*;
use crate::{common::*, config::ImageConfig, error::SampleError};
use image::{imageops::FilterType, GenericImageView as _, ImageError};
use lidar_ops::{clip_with_matrix, read_calib_mat, read_label, read_point_cloud, Augmenter};

/// How the point cloud of a sample is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Run the augmenter. Used by the training queue.
    Augment,
    /// Plain loading followed by the camera frustum filter.
    Clip,
}

/// Loads one sample from its files.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct SampleFetcher {
    image_height: usize,
    image_width: usize,
    #[derivative(Debug = "ignore")]
    augmenter: Arc<dyn Augmenter>,
}

impl SampleFetcher {
    pub fn new(image: ImageConfig, augmenter: Arc<dyn Augmenter>) -> Self {
        Self {
            image_height: image.height.get(),
            image_width: image.width.get(),
            augmenter,
        }
    }

    /// The `(height, width, channels)` of the output images.
    pub fn image_shape(&self) -> (usize, usize, usize) {
        (self.image_height, self.image_width, 3)
    }

    pub fn fetch(
        &self,
        descriptor: &SampleDescriptor,
        mode: FetchMode,
        rng: &mut dyn RngCore,
    ) -> Result<RawSample, SampleError> {
        let SampleDescriptor {
            tag,
            point_cloud,
            label,
            calib,
            ..
        } = descriptor;
        let ops_err = |err| SampleError::from_ops(tag, err);

        let (image, orig_height, orig_width) = self.load_image(descriptor)?;
        let calib_mat = read_calib_mat(calib).map_err(ops_err)?;

        let (points, label) = match mode {
            FetchMode::Augment => self
                .augmenter
                .augment(
                    point_cloud,
                    label,
                    calib_mat.view(),
                    orig_width,
                    orig_height,
                    rng,
                )
                .map_err(ops_err)?,
            FetchMode::Clip => {
                let points = read_point_cloud(point_cloud).map_err(ops_err)?;
                let points =
                    clip_with_matrix(points.view(), calib_mat.view(), orig_height, orig_width);
                let label = read_label(label).map_err(ops_err)?;
                (points, label)
            }
        };

        Ok(RawSample {
            tag: tag.clone(),
            image,
            points,
            label,
            calib: calib_mat,
        })
    }

    /// Decode and resize the image. Also returns the original height and width.
    fn load_image(
        &self,
        descriptor: &SampleDescriptor,
    ) -> Result<(Array3<u8>, usize, usize), SampleError> {
        let SampleDescriptor {
            tag,
            image: image_path,
            ..
        } = descriptor;
        let decode_err = |reason: String| SampleError::Decode {
            tag: tag.clone(),
            path: image_path.clone(),
            reason,
        };

        let orig = image::open(image_path).map_err(|err| match err {
            ImageError::IoError(err) => {
                SampleError::from_ops(tag, lidar_ops::OpsError::io(image_path, err))
            }
            err => decode_err(err.to_string()),
        })?;
        let orig_height = orig.height() as usize;
        let orig_width = orig.width() as usize;

        let resized = orig
            .resize_exact(
                self.image_width as u32,
                self.image_height as u32,
                FilterType::Triangle,
            )
            .to_rgb8();
        let array = Array3::from_shape_vec(
            (self.image_height, self.image_width, 3),
            resized.into_raw(),
        )
        .map_err(|err| decode_err(err.to_string()))?;

        Ok((array, orig_height, orig_width))
    }
}
