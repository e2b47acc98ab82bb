use crate::common::*;

/// One loaded sample, before voxelization.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub tag: String,
    /// Resized RGB image with shape `[height, width, 3]`.
    pub image: Array3<u8>,
    /// Points with shape `[num_points, 4]`.
    pub points: Array2<f32>,
    /// Raw label lines.
    pub label: Vec<String>,
    /// LiDAR-to-image projection with shape `[3, 4]`.
    pub calib: Array2<f32>,
}

/// Concatenated voxels of the samples in one replica.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchVoxel {
    /// Shape `[total_voxels, max_points_per_voxel, 7]`.
    pub feature: Array3<f32>,
    /// Shape `[total_voxels]`.
    pub number: Array1<i64>,
    /// Shape `[total_voxels, 4]`. The first column is the sample position
    /// within the replica, followed by the (z, y, x) grid index.
    pub coordinate: Array2<i64>,
}

impl BatchVoxel {
    pub fn num_voxels(&self) -> usize {
        self.number.len()
    }
}

/// The batch delivered to the consumer.
#[derive(Debug, Clone)]
pub struct Batch {
    pub tags: Vec<String>,
    pub labels: Vec<Vec<String>>,
    /// Voxels at the configured voxel size, one entry per replica.
    pub voxels: Vec<BatchVoxel>,
    /// Voxels at twice the configured voxel size, one entry per replica.
    pub doubled_voxels: Vec<BatchVoxel>,
    /// Shape `[batch, height, width, 3]`.
    pub images: Array4<u8>,
    pub points: Vec<Array2<f32>>,
    /// Shape `[batch, 3, 4]`.
    pub calibs: Array3<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
