//! Binary point cloud and text label files.

use crate::common::*;

/// Number of f32 fields per point: x, y, z and intensity.
pub const POINT_FIELDS: usize = 4;

const RECORD_BYTES: usize = POINT_FIELDS * 4;

/// Read a point cloud stored as flat little-endian f32 records.
///
/// The returned array has shape `[num_points, 4]`.
pub fn read_point_cloud(path: impl AsRef<Path>) -> OpsResult<Array2<f32>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| OpsError::io(path, err))?;

    if bytes.len() % RECORD_BYTES != 0 {
        return Err(OpsError::decode(
            path,
            format!(
                "file size {} is not a multiple of the {}-byte point record",
                bytes.len(),
                RECORD_BYTES
            ),
        ));
    }

    let num_points = bytes.len() / RECORD_BYTES;
    let mut values = vec![0f32; num_points * POINT_FIELDS];
    LittleEndian::read_f32_into(&bytes, &mut values);

    let points = Array2::from_shape_vec((num_points, POINT_FIELDS), values)
        .map_err(|err| OpsError::decode(path, err))?;

    if points.iter().any(|value| !value.is_finite()) {
        return Err(OpsError::decode(path, "point cloud contains non-finite values"));
    }

    Ok(points)
}

/// Write a `[num_points, 4]` point cloud in the same binary layout.
pub fn write_point_cloud(path: impl AsRef<Path>, points: ArrayView2<f32>) -> OpsResult<()> {
    let path = path.as_ref();

    if points.ncols() != POINT_FIELDS {
        return Err(OpsError::decode(
            path,
            format!("expect {} columns, but get {}", POINT_FIELDS, points.ncols()),
        ));
    }

    let values: Vec<f32> = points.iter().cloned().collect();
    let mut bytes = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(&values, &mut bytes);
    fs::write(path, bytes).map_err(|err| OpsError::io(path, err))
}

/// Read the raw lines of a label file.
///
/// The label content is not interpreted.
pub fn read_label(path: impl AsRef<Path>) -> OpsResult<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|err| OpsError::io(path, err))?;
    Ok(text.lines().map(ToOwned::to_owned).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn point_cloud_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("000000.bin");
        let points = array![[1.0f32, 2.0, 3.0, 0.5], [4.0, 5.0, 6.0, 0.25]];

        write_point_cloud(&path, points.view())?;
        assert_eq!(fs::metadata(&path)?.len(), 32);
        assert_eq!(read_point_cloud(&path)?, points);
        Ok(())
    }

    #[test]
    fn truncated_point_cloud() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.bin");
        fs::write(&path, [0u8; 18])?;

        assert!(matches!(
            read_point_cloud(&path),
            Err(OpsError::Decode { .. })
        ));
        assert!(matches!(
            read_point_cloud(dir.path().join("missing.bin")),
            Err(OpsError::Io { .. })
        ));
        Ok(())
    }
}
