//! Point-to-voxel grouping.

use crate::common::*;

/// Number of feature channels per point in a voxel:
/// x, y, z, intensity and the offsets to the voxel centroid.
pub const FEATURE_CHANNELS: usize = 7;

/// The axis-aligned LiDAR region that is voxelized, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarRange {
    pub x: [f32; 2],
    pub y: [f32; 2],
    pub z: [f32; 2],
}

impl Default for LidarRange {
    fn default() -> Self {
        Self {
            x: [0.0, 70.4],
            y: [-40.0, 40.0],
            z: [-3.0, 1.0],
        }
    }
}

/// Sparse voxels of one point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid {
    /// Point features with shape `[num_voxels, max_points_per_voxel, 7]`.
    pub feature: Array3<f32>,
    /// Number of valid points per voxel with shape `[num_voxels]`.
    pub number: Array1<i64>,
    /// Voxel grid indices in (z, y, x) order with shape `[num_voxels, 3]`.
    pub coordinate: Array2<i64>,
}

impl VoxelGrid {
    pub fn empty(max_points_per_voxel: usize) -> Self {
        Self {
            feature: Array3::zeros((0, max_points_per_voxel, FEATURE_CHANNELS)),
            number: Array1::zeros(0),
            coordinate: Array2::zeros((0, 3)),
        }
    }

    pub fn num_voxels(&self) -> usize {
        self.number.len()
    }
}

/// Turns a point cloud into sparse voxels.
pub trait Voxelizer
where
    Self: Debug + Send + Sync,
{
    /// Group `points` (`[N, 4]`) into voxels of `voxel_size` in (z, y, x) order,
    /// keeping at most `max_points_per_voxel` points per voxel.
    fn voxelize(
        &self,
        points: ArrayView2<f32>,
        voxel_size: [f32; 3],
        max_points_per_voxel: usize,
    ) -> VoxelGrid;
}

/// The regular grid voxelizer over a bounded LiDAR range.
#[derive(Debug, Clone, Default)]
pub struct GridVoxelizer {
    pub range: LidarRange,
}

impl GridVoxelizer {
    pub fn new(range: LidarRange) -> Self {
        Self { range }
    }

    /// Number of cells along (z, y, x) for a voxel size.
    pub fn grid_shape(&self, voxel_size: [f32; 3]) -> [i64; 3] {
        let LidarRange { x, y, z } = self.range;
        let [vz, vy, vx] = voxel_size;
        [
            ((z[1] - z[0]) / vz).round() as i64,
            ((y[1] - y[0]) / vy).round() as i64,
            ((x[1] - x[0]) / vx).round() as i64,
        ]
    }
}

impl Voxelizer for GridVoxelizer {
    fn voxelize(
        &self,
        points: ArrayView2<f32>,
        voxel_size: [f32; 3],
        max_points_per_voxel: usize,
    ) -> VoxelGrid {
        let max_points = max_points_per_voxel.max(1);
        let LidarRange { x, y, z } = self.range;
        let [vz, vy, vx] = voxel_size;
        let shape = self.grid_shape(voxel_size);

        // voxel coordinate -> point row indices, ordered by coordinate
        let mut cells: BTreeMap<[i64; 3], Vec<usize>> = BTreeMap::new();

        points
            .outer_iter()
            .enumerate()
            .filter_map(|(index, point)| {
                let (px, py, pz) = (point[0], point[1], point[2]);
                let in_range = (x[0]..x[1]).contains(&px)
                    && (y[0]..y[1]).contains(&py)
                    && (z[0]..z[1]).contains(&pz);
                if !in_range {
                    return None;
                }
                let coord = [
                    ((pz - z[0]) / vz).floor() as i64,
                    ((py - y[0]) / vy).floor() as i64,
                    ((px - x[0]) / vx).floor() as i64,
                ];
                let in_grid = coord
                    .iter()
                    .zip(shape.iter())
                    .all(|(&index, &extent)| (0..extent).contains(&index));
                in_grid.then(|| (coord, index))
            })
            .for_each(|(coord, index)| {
                let rows = cells.entry(coord).or_default();
                if rows.len() < max_points {
                    rows.push(index);
                }
            });

        let num_voxels = cells.len();
        if num_voxels == 0 {
            return VoxelGrid::empty(max_points);
        }
        let mut feature = Array3::zeros((num_voxels, max_points, FEATURE_CHANNELS));
        let mut number = Array1::zeros(num_voxels);
        let mut coordinate = Array2::zeros((num_voxels, 3));

        for (voxel_index, (coord, rows)) in cells.into_iter().enumerate() {
            let count = rows.len() as f32;
            let mut centroid = [0f32; 3];
            rows.iter().for_each(|&row| {
                (0..3).for_each(|axis| centroid[axis] += points[[row, axis]]);
            });
            centroid.iter_mut().for_each(|value| *value /= count);

            for (slot, &row) in rows.iter().enumerate() {
                let point = points.row(row);
                let values = [
                    point[0],
                    point[1],
                    point[2],
                    point[3],
                    point[0] - centroid[0],
                    point[1] - centroid[1],
                    point[2] - centroid[2],
                ];
                feature
                    .slice_mut(s![voxel_index, slot, ..])
                    .assign(&ArrayView1::from(&values[..]));
            }

            number[voxel_index] = rows.len() as i64;
            coordinate
                .row_mut(voxel_index)
                .assign(&ArrayView1::from(&coord[..]));
        }

        VoxelGrid {
            feature,
            number,
            coordinate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn grid_shape_of_kitti_range() {
        let voxelizer = GridVoxelizer::default();
        assert_eq!(voxelizer.grid_shape([0.4, 0.2, 0.2]), [10, 400, 352]);
        assert_eq!(voxelizer.grid_shape([0.8, 0.4, 0.4]), [5, 200, 176]);
    }

    #[test]
    fn group_points() {
        let voxelizer = GridVoxelizer::new(LidarRange {
            x: [0.0, 4.0],
            y: [0.0, 4.0],
            z: [0.0, 4.0],
        });
        let points = array![
            [0.5f32, 0.5, 0.5, 1.0],
            [0.7, 0.3, 0.5, 0.0],
            [0.1, 0.1, 0.1, 0.0],
            [3.5, 0.5, 0.5, 0.5],
            [9.0, 0.5, 0.5, 0.5],
        ];

        let grid = voxelizer.voxelize(points.view(), [1.0, 1.0, 1.0], 2);
        assert_eq!(grid.num_voxels(), 2);
        assert_eq!(grid.feature.dim(), (2, 2, FEATURE_CHANNELS));
        assert_eq!(grid.number, array![2, 1]);
        assert_eq!(grid.coordinate, array![[0, 0, 0], [0, 0, 3]]);

        // third point of the first voxel is dropped by the point limit
        assert_abs_diff_eq!(grid.feature[[0, 0, 4]], -0.1);
        assert_abs_diff_eq!(grid.feature[[0, 1, 5]], -0.1);
        assert_abs_diff_eq!(grid.feature[[1, 0, 3]], 0.5);
        assert_abs_diff_eq!(grid.feature[[1, 1, 0]], 0.0);
    }

    #[test]
    fn empty_cloud() {
        let voxelizer = GridVoxelizer::default();
        let points = Array2::<f32>::zeros((0, 4));
        let grid = voxelizer.voxelize(points.view(), [0.4, 0.2, 0.2], 35);
        assert_eq!(grid, VoxelGrid::empty(35));
    }
}
