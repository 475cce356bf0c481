//! Top-view plots of transformed digitizations.
//!
//! Renders electrodes and landmarks on the head-frame x/y plane (nose up,
//! left ear left) as a PNG for visual QC. No text is drawn so the bitmap
//! backend works without system fonts.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::PlotConfig;
use crate::core::geometry::Vec3;
use crate::core::points::{Landmarks, PointSet};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to plot")]
    EmptyPointSet,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

const ELECTRODE_COLOR: RGBColor = RGBColor(55, 126, 184);
const AXIS_COLOR: RGBColor = RGBColor(200, 200, 200);

/// Landmark colors: rpa, nasion, lpa.
const LANDMARK_COLORS: [RGBColor; 3] = [
    RGBColor(228, 26, 28),
    RGBColor(77, 175, 74),
    RGBColor(152, 78, 163),
];

/// Map head-frame coordinates to plot coordinates.
///
/// The head frame has +x toward the nose and +y toward the left ear; the
/// plot puts the nose at the top and the left ear on the left.
#[inline]
fn to_plot(p: &Vec3) -> (f64, f64) {
    (-p.y, p.x)
}

/// Half-width of a square plot window covering every point, with 10% padding.
fn plot_extent(points: &[(f64, f64)]) -> f64 {
    let max_abs = points
        .iter()
        .map(|(x, y)| x.abs().max(y.abs()))
        .fold(0.0, f64::max);

    if max_abs <= f64::EPSILON {
        1.0
    } else {
        max_abs * 1.1
    }
}

/// Plot transformed electrodes and landmarks as seen from above.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `electrodes` - Electrodes in head-frame coordinates
/// * `landmarks` - Landmarks in head-frame coordinates
/// * `config` - Image size and marker radius
pub fn plot_top_view(
    output_path: &Path,
    electrodes: &PointSet,
    landmarks: &Landmarks,
    config: &PlotConfig,
) -> Result<()> {
    if electrodes.is_empty() {
        return Err(VisualizationError::EmptyPointSet);
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let electrode_pts: Vec<(f64, f64)> = electrodes.points.iter().map(to_plot).collect();
    let landmark_pts: Vec<(f64, f64)> = landmarks.to_array().iter().map(to_plot).collect();

    let mut all = electrode_pts.clone();
    all.extend_from_slice(&landmark_pts);
    let extent = plot_extent(&all);

    let root = BitMapBackend::new(output_path, (config.width, config.height)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(-extent..extent, -extent..extent)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    // Frame axes through the origin
    chart
        .draw_series(LineSeries::new(vec![(-extent, 0.0), (extent, 0.0)], &AXIS_COLOR))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    chart
        .draw_series(LineSeries::new(vec![(0.0, -extent), (0.0, extent)], &AXIS_COLOR))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let radius = config.point_radius as i32;

    chart
        .draw_series(
            electrode_pts
                .iter()
                .map(|&(x, y)| Circle::new((x, y), radius, ELECTRODE_COLOR.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            landmark_pts
                .iter()
                .zip(LANDMARK_COLORS.iter())
                .map(|(&(x, y), color)| Circle::new((x, y), radius + 2, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_to_plot_orientation() {
        // Nose (+x) plots upward, left ear (+y) plots to the left.
        assert_eq!(to_plot(&Vec3::new(1.0, 0.0, 0.0)), (-0.0, 1.0));
        assert_eq!(to_plot(&Vec3::new(0.0, 1.0, 0.0)), (-1.0, 0.0));
    }

    #[test]
    fn test_plot_extent() {
        assert_eq!(plot_extent(&[]), 1.0);
        let e = plot_extent(&[(10.0, -50.0), (3.0, 4.0)]);
        assert!((e - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_plot_top_view_empty() {
        let dir = tempdir().unwrap();
        let landmarks = Landmarks::from_ordered([Vec3::zeros(); 3]);
        let result = plot_top_view(
            &dir.path().join("empty.png"),
            &PointSet::new(),
            &landmarks,
            &PlotConfig::default(),
        );
        assert!(matches!(result, Err(VisualizationError::EmptyPointSet)));
    }

    #[test]
    fn test_plot_top_view_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots").join("top.png");
        let electrodes = PointSet::from_points(vec![
            Vec3::new(80.0, 20.0, 40.0),
            Vec3::new(0.0, 0.0, 100.0),
            Vec3::new(-70.0, -30.0, 30.0),
        ]);
        let landmarks = Landmarks::from_ordered([
            Vec3::new(0.0, -72.0, -30.0),
            Vec3::new(95.0, 0.0, -20.0),
            Vec3::new(0.0, 72.0, -30.0),
        ]);
        let config = PlotConfig {
            width: 200,
            height: 200,
            point_radius: 3,
        };

        plot_top_view(&path, &electrodes, &landmarks, &config).unwrap();
        assert!(path.exists());
    }
}
