//! KITTI calibration files.

use crate::common::*;

/// Read a KITTI calibration file and return the 3x4 LiDAR-to-image projection.
///
/// The matrix is `P2 * R0_rect * Tr_velo_to_cam`. Missing `R0_rect` or
/// `Tr_velo_to_cam` entries are treated as identity.
pub fn read_calib_mat(path: impl AsRef<Path>) -> OpsResult<Array2<f32>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| OpsError::io(path, err))?;
    parse_calib_mat(&text).map_err(|reason| OpsError::decode(path, reason))
}

/// Parse the text content of a KITTI calibration file.
pub fn parse_calib_mat(text: &str) -> Result<Array2<f32>, String> {
    let mut entries = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, values) = line
            .split_once(':')
            .ok_or_else(|| format!("malformed calibration line '{}'", line))?;
        let values: Vec<f32> = values
            .split_whitespace()
            .map(|token| {
                token
                    .parse()
                    .map_err(|_| format!("invalid number '{}' in entry '{}'", token, key))
            })
            .try_collect()?;
        entries.insert(key.trim().to_owned(), values);
    }

    let p2 = match entries.get("P2") {
        Some(values) => to_matrix(values, 3, 4, "P2")?,
        None => return Err("missing P2 entry".into()),
    };
    let r0_rect = match entries.get("R0_rect") {
        Some(values) => to_homogeneous(to_matrix(values, 3, 3, "R0_rect")?),
        None => Array2::eye(4),
    };
    let velo_to_cam = match entries.get("Tr_velo_to_cam") {
        Some(values) => to_homogeneous(to_matrix(values, 3, 4, "Tr_velo_to_cam")?),
        None => Array2::eye(4),
    };

    Ok(p2.dot(&r0_rect).dot(&velo_to_cam))
}

fn to_matrix(values: &[f32], rows: usize, cols: usize, key: &str) -> Result<Array2<f32>, String> {
    if values.len() != rows * cols {
        return Err(format!(
            "entry '{}' expects {} values, but get {}",
            key,
            rows * cols,
            values.len()
        ));
    }
    Array2::from_shape_vec((rows, cols), values.to_vec()).map_err(|err| err.to_string())
}

/// Embed a 3x3 or 3x4 matrix into the top rows of a 4x4 identity.
fn to_homogeneous(mat: Array2<f32>) -> Array2<f32> {
    let mut out = Array2::eye(4);
    let (rows, cols) = mat.dim();
    out.slice_mut(s![..rows, ..cols]).assign(&mat);
    out
}
