//! Batch-level voxel assembly.

use crate::{
    common::*,
    data::{Batch, BatchVoxel, RawSample},
};
use lidar_ops::{VoxelGrid, Voxelizer, FEATURE_CHANNELS};

/// The curriculum of the maximum number of points per voxel.
///
/// The further the epoch progresses, the wider the random reduction below
/// the nominal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsPerVoxelSchedule {
    nominal: usize,
}

impl PointsPerVoxelSchedule {
    pub fn new(nominal: usize) -> Self {
        Self { nominal }
    }

    pub fn nominal(&self) -> usize {
        self.nominal
    }

    /// The maximum reduction for a progress ratio.
    pub fn spread(progress: R64) -> usize {
        let progress = progress.raw();
        if progress < 0.2 {
            0
        } else if progress < 0.4 {
            2
        } else if progress < 0.6 {
            4
        } else if progress < 0.8 {
            6
        } else {
            8
        }
    }

    /// Draw the value for one batch. The result lies in `[nominal - spread, nominal]` and is at least 1.
    pub fn sample<R>(&self, progress: R64, rng: &mut R) -> usize
    where
        R: Rng + ?Sized,
    {
        let spread = Self::spread(progress);
        if spread == 0 {
            return self.nominal;
        }
        (self.nominal.saturating_sub(spread) + rng.gen_range(0..=spread)).max(1)
    }
}

/// Split per-sample voxels into `replica_count` contiguous slices of
/// `replica_size` samples and concatenate each slice.
///
/// The first coordinate column is the sample position within its replica.
/// Slices past the end of `grids` are empty, with `max_points_per_voxel` as T.
pub fn aggregate(
    grids: &[VoxelGrid],
    replica_count: usize,
    replica_size: usize,
    max_points_per_voxel: usize,
) -> Result<Vec<BatchVoxel>> {
    ensure!(
        grids.len() <= replica_count * replica_size,
        "{} samples do not fit into {} replicas of {} samples",
        grids.len(),
        replica_count,
        replica_size
    );

    (0..replica_count)
        .map(|replica| -> Result<BatchVoxel> {
            let start = (replica * replica_size).min(grids.len());
            let end = ((replica + 1) * replica_size).min(grids.len());
            let slice = &grids[start..end];

            if slice.is_empty() {
                return Ok(BatchVoxel {
                    feature: Array3::zeros((0, max_points_per_voxel, FEATURE_CHANNELS)),
                    number: Array1::zeros(0),
                    coordinate: Array2::zeros((0, 4)),
                });
            }

            let features: Vec<_> = slice.iter().map(|grid| grid.feature.view()).collect();
            let numbers: Vec<_> = slice.iter().map(|grid| grid.number.view()).collect();
            let coordinates: Vec<_> = slice
                .iter()
                .enumerate()
                .map(|(position, grid)| {
                    let mut coordinate = Array2::zeros((grid.num_voxels(), 4));
                    coordinate.column_mut(0).fill(position as i64);
                    coordinate.slice_mut(s![.., 1..]).assign(&grid.coordinate);
                    coordinate
                })
                .collect();
            let coordinate_views: Vec<_> = coordinates.iter().map(|coord| coord.view()).collect();

            Ok(BatchVoxel {
                feature: ndarray::concatenate(Axis(0), &features)
                    .context("voxel features have inconsistent points per voxel")?,
                number: ndarray::concatenate(Axis(0), &numbers)?,
                coordinate: ndarray::concatenate(Axis(0), &coordinate_views)?,
            })
        })
        .try_collect()
}

/// Voxelizes samples at two resolutions and assembles batches.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct VoxelBuilder {
    #[derivative(Debug = "ignore")]
    voxelizer: Arc<dyn Voxelizer>,
    voxel_size: [f32; 3],
    schedule: PointsPerVoxelSchedule,
    replica_count: usize,
    replica_size: usize,
    image_shape: (usize, usize),
}

impl VoxelBuilder {
    pub fn new(
        voxelizer: Arc<dyn Voxelizer>,
        voxel_size: [f32; 3],
        schedule: PointsPerVoxelSchedule,
        replica_count: usize,
        replica_size: usize,
        image_shape: (usize, usize),
    ) -> Self {
        Self {
            voxelizer,
            voxel_size,
            schedule,
            replica_count,
            replica_size,
            image_shape,
        }
    }

    pub fn schedule(&self) -> &PointsPerVoxelSchedule {
        &self.schedule
    }

    /// The normal and the doubled voxel size.
    pub fn voxel_sizes(&self) -> [[f32; 3]; 2] {
        let [z, y, x] = self.voxel_size;
        [self.voxel_size, [z * 2.0, y * 2.0, x * 2.0]]
    }

    /// Voxelize every sample at one voxel size and aggregate into replicas.
    pub fn build_resolution(
        &self,
        points: &[Array2<f32>],
        voxel_size: [f32; 3],
        max_points_per_voxel: usize,
    ) -> Result<Vec<BatchVoxel>> {
        let grids: Vec<_> = points
            .iter()
            .map(|points| {
                self.voxelizer
                    .voxelize(points.view(), voxel_size, max_points_per_voxel)
            })
            .collect();
        aggregate(
            &grids,
            self.replica_count,
            self.replica_size,
            max_points_per_voxel,
        )
    }

    /// Assemble loaded samples into a batch, using one points-per-voxel
    /// value for both resolutions.
    pub fn build_batch(
        &self,
        samples: Vec<RawSample>,
        max_points_per_voxel: usize,
    ) -> Result<Batch> {
        let (tags, labels, images, points, calibs) = samples
            .into_iter()
            .map(|sample| {
                let RawSample {
                    tag,
                    image,
                    points,
                    label,
                    calib,
                } = sample;
                (tag, label, image, points, calib)
            })
            .unzip_n_vec();

        let [normal_size, doubled_size] = self.voxel_sizes();
        let voxels = self.build_resolution(&points, normal_size, max_points_per_voxel)?;
        let doubled_voxels = self.build_resolution(&points, doubled_size, max_points_per_voxel)?;

        let images = if images.is_empty() {
            let (height, width) = self.image_shape;
            Array4::zeros((0, height, width, 3))
        } else {
            let views: Vec<_> = images.iter().map(|image| image.view()).collect();
            ndarray::stack(Axis(0), &views)?
        };
        let calibs = if calibs.is_empty() {
            Array3::zeros((0, 3, 4))
        } else {
            let views: Vec<_> = calibs.iter().map(|calib| calib.view()).collect();
            ndarray::stack(Axis(0), &views)?
        };

        Ok(Batch {
            tags,
            labels,
            voxels,
            doubled_voxels,
            images,
            points,
            calibs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_ops::{GridVoxelizer, LidarRange};
    use ndarray::array;

    #[test]
    fn schedule_buckets() {
        let schedule = PointsPerVoxelSchedule::new(35);
        let mut rng = StdRng::seed_from_u64(0);

        for _ in 0..200 {
            assert_eq!(schedule.sample(r64(0.1), &mut rng), 35);
            assert!((33..=35).contains(&schedule.sample(r64(0.3), &mut rng)));
            assert!((31..=35).contains(&schedule.sample(r64(0.5), &mut rng)));
            assert!((29..=35).contains(&schedule.sample(r64(0.7), &mut rng)));
            assert!((27..=35).contains(&schedule.sample(r64(0.9), &mut rng)));
            assert!((27..=35).contains(&schedule.sample(r64(1.0), &mut rng)));
        }
    }

    #[test]
    fn schedule_boundaries() {
        assert_eq!(PointsPerVoxelSchedule::spread(r64(0.0)), 0);
        assert_eq!(PointsPerVoxelSchedule::spread(r64(0.2)), 2);
        assert_eq!(PointsPerVoxelSchedule::spread(r64(0.4)), 4);
        assert_eq!(PointsPerVoxelSchedule::spread(r64(0.6)), 6);
        assert_eq!(PointsPerVoxelSchedule::spread(r64(0.8)), 8);
    }

    #[test]
    fn schedule_covers_range() {
        let schedule = PointsPerVoxelSchedule::new(35);
        let mut rng = StdRng::seed_from_u64(1);
        let values: std::collections::HashSet<_> = (0..1000)
            .map(|_| schedule.sample(r64(0.9), &mut rng))
            .collect();
        assert_eq!(values.len(), 9);
    }

    #[test]
    fn small_nominal_stays_positive() {
        let schedule = PointsPerVoxelSchedule::new(3);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            assert!(schedule.sample(r64(0.95), &mut rng) >= 1);
        }
    }

    fn grid(num_voxels: usize, max_points: usize) -> VoxelGrid {
        VoxelGrid {
            feature: Array3::ones((num_voxels, max_points, FEATURE_CHANNELS)),
            number: Array1::from_elem(num_voxels, 1),
            coordinate: Array2::from_elem((num_voxels, 3), 7),
        }
    }

    #[test]
    fn replica_positions() -> Result<()> {
        let grids: Vec<_> = (1..=8).map(|num_voxels| grid(num_voxels, 5)).collect();
        let replicas = aggregate(&grids, 2, 4, 5)?;
        assert_eq!(replicas.len(), 2);

        let first = &replicas[0];
        assert_eq!(first.num_voxels(), 1 + 2 + 3 + 4);
        assert_eq!(first.feature.dim(), (10, 5, FEATURE_CHANNELS));
        assert_eq!(first.coordinate.dim(), (10, 4));

        let second = &replicas[1];
        assert_eq!(second.num_voxels(), 5 + 6 + 7 + 8);

        for replica in &replicas {
            assert!(replica.coordinate.column(0).iter().all(|&pos| (0..4).contains(&pos)));
            assert!(replica.coordinate.slice(s![.., 1..]).iter().all(|&idx| idx == 7));
        }
        assert_eq!(second.coordinate.column(0).iter().max(), Some(&3));
        assert_eq!(second.coordinate[[0, 0]], 0);
        assert_eq!(second.coordinate[[4, 0]], 0);
        assert_eq!(second.coordinate[[5, 0]], 1);
        Ok(())
    }

    #[test]
    fn short_batch_yields_empty_replica() -> Result<()> {
        let grids = vec![grid(2, 3), grid(1, 3)];
        let replicas = aggregate(&grids, 2, 2, 3)?;
        assert_eq!(replicas[0].num_voxels(), 3);
        assert_eq!(replicas[1].num_voxels(), 0);
        assert_eq!(replicas[1].feature.dim(), (0, 3, FEATURE_CHANNELS));
        assert_eq!(replicas[1].coordinate.dim(), (0, 4));
        Ok(())
    }

    #[test]
    fn overflowing_samples_are_rejected() {
        let grids: Vec<_> = (0..3).map(|_| grid(1, 2)).collect();
        assert!(aggregate(&grids, 1, 2, 2).is_err());
    }

    #[test]
    fn build_two_resolutions() -> Result<()> {
        let voxelizer = GridVoxelizer::new(LidarRange {
            x: [0.0, 4.0],
            y: [0.0, 4.0],
            z: [0.0, 4.0],
        });
        let builder = VoxelBuilder::new(
            Arc::new(voxelizer),
            [1.0, 1.0, 1.0],
            PointsPerVoxelSchedule::new(4),
            1,
            2,
            (2, 2),
        );
        let sample = |tag: &str| RawSample {
            tag: tag.to_owned(),
            image: Array3::zeros((2, 2, 3)),
            points: array![[0.5f32, 0.5, 0.5, 0.0], [1.5, 1.5, 0.5, 0.0]],
            label: vec![],
            calib: Array2::zeros((3, 4)),
        };

        assert_eq!(builder.voxel_sizes(), [[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]);

        let batch = builder.build_batch(vec![sample("a"), sample("b")], 4)?;
        assert_eq!(batch.tags, ["a", "b"]);
        assert_eq!(batch.images.dim(), (2, 2, 2, 3));
        assert_eq!(batch.calibs.dim(), (2, 3, 4));
        assert_eq!(batch.voxels[0].num_voxels(), 4);
        assert_eq!(batch.doubled_voxels[0].num_voxels(), 2);
        assert_eq!(batch.voxels[0].feature.dim().1, 4);
        assert_eq!(batch.doubled_voxels[0].feature.dim().1, 4);
        Ok(())
    }

    #[test]
    fn build_empty_batch() -> Result<()> {
        let builder = VoxelBuilder::new(
            Arc::new(GridVoxelizer::default()),
            [0.4, 0.2, 0.2],
            PointsPerVoxelSchedule::new(35),
            2,
            1,
            (8, 16),
        );
        let batch = builder.build_batch(vec![], 35)?;
        assert!(batch.is_empty());
        assert_eq!(batch.images.dim(), (0, 8, 16, 3));
        assert_eq!(batch.voxels.len(), 2);
        for voxel in batch.voxels.iter().chain(&batch.doubled_voxels) {
            assert_eq!(voxel.feature.dim(), (0, 35, FEATURE_CHANNELS));
            assert_eq!(voxel.coordinate.dim(), (0, 4));
        }
        Ok(())
    }
}
