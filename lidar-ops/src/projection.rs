//! Camera frustum filtering.

use crate::{calib::read_calib_mat, common::*};

/// Keep the points that project into the image through the calibration file at `calib_path`.
pub fn clip_by_projection(
    points: ArrayView2<f32>,
    calib_path: impl AsRef<Path>,
    image_height: usize,
    image_width: usize,
) -> OpsResult<Array2<f32>> {
    let calib = read_calib_mat(calib_path)?;
    Ok(clip_with_matrix(
        points,
        calib.view(),
        image_height,
        image_width,
    ))
}

/// Keep the points with positive depth whose projection lands inside the image.
///
/// `calib` is the 3x4 LiDAR-to-image projection. The row order of the kept
/// points is preserved.
pub fn clip_with_matrix(
    points: ArrayView2<f32>,
    calib: ArrayView2<f32>,
    image_height: usize,
    image_width: usize,
) -> Array2<f32> {
    let height = image_height as f32;
    let width = image_width as f32;

    let kept: Vec<usize> = points
        .outer_iter()
        .enumerate()
        .filter_map(|(index, point)| {
            let homo = [point[0], point[1], point[2], 1.0];
            let project = |row: usize| -> f32 {
                (0..4).map(|col| calib[[row, col]] * homo[col]).sum()
            };
            let depth = project(2);
            if depth <= 0.0 {
                return None;
            }
            let u = project(0) / depth;
            let v = project(1) / depth;
            let inside = (0.0..width).contains(&u) && (0.0..height).contains(&v);
            inside.then(|| index)
        })
        .collect();

    points.select(Axis(0), &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn frustum_filter() {
        // camera looks along +x of the LiDAR frame
        let calib = array![
            [0f32, -100.0, 0.0, 50.0],
            [0.0, 0.0, -100.0, 50.0],
            [1.0, 0.0, 0.0, 0.0],
        ];
        let points = array![
            [10f32, 0.0, 0.0, 0.1],
            [-10.0, 0.0, 0.0, 0.2],
            [10.0, 100.0, 0.0, 0.3],
            [5.0, 0.5, -0.5, 0.4],
        ];

        let clipped = clip_with_matrix(points.view(), calib.view(), 100, 100);
        assert_eq!(clipped, array![[10f32, 0.0, 0.0, 0.1], [5.0, 0.5, -0.5, 0.4]]);
    }

    #[test]
    fn frustum_filter_from_file() -> OpsResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000000.txt");
        fs::write(&path, "P2: 0 -100 0 50 0 0 -100 50 1 0 0 0\n").unwrap();

        let points = array![[10f32, 0.0, 0.0, 0.1], [-10.0, 0.0, 0.0, 0.2]];
        let clipped = clip_by_projection(points.view(), &path, 100, 100)?;
        assert_eq!(clipped, array![[10f32, 0.0, 0.0, 0.1]]);

        assert!(clip_by_projection(points.view(), dir.path().join("missing.txt"), 100, 100).is_err());
        Ok(())
    }
}
