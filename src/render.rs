use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::ops::Range;
use tracing::{info, warn};

use crate::colormap::{viridis, NEUTRAL};
use crate::config::{FlatAttributePolicy, RenderSettings};
use crate::error::{PipelineError, Result};
use crate::normalize::{normalize, Normalization};
use crate::record::ProjectedPoint;

const LEGEND_STOPS: usize = 64;
const LEGEND_WIDTH: i32 = 140;
const POINT_RADIUS: i32 = 5;
const POINT_ALPHA: f64 = 0.8;
const AXIS_PADDING: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub color: RGBColor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Legend {
    /// Color bar over normalized values; stops run from 0.0 to 1.0 inclusive.
    /// `min` and `max` are the raw attribute bounds.
    Gradient {
        stops: Vec<(f64, RGBColor)>,
        min: f64,
        max: f64,
    },
    /// Single swatch for an attribute that never varies.
    Flat { value: f64, color: RGBColor },
}

/// Everything needed to draw the figure, computed up front.
#[derive(Debug, Clone)]
pub struct ScatterPlot {
    pub points: Vec<PlotPoint>,
    pub x_range: Range<f64>,
    pub y_range: Range<f64>,
    pub legend: Legend,
    pub title: String,
    pub attribute_label: String,
}

impl ScatterPlot {
    pub fn build(points: &[ProjectedPoint], settings: &RenderSettings) -> Result<Self> {
        if let Some(bad) = points.iter().position(|p| !p.is_finite()) {
            return Err(PipelineError::Render(format!(
                "point {} has a non-finite coordinate",
                bad
            )));
        }

        let attributes: Vec<f64> = points.iter().map(|p| p.scalar_attribute).collect();
        let normalization = normalize(&attributes).ok_or(PipelineError::InsufficientData {
            found: 0,
            required: 1,
        })?;

        let (colors, legend) = match normalization {
            Normalization::Scaled { values, min, max } => {
                let colors: Vec<RGBColor> = values.into_iter().map(viridis).collect();
                let stops = (0..LEGEND_STOPS)
                    .map(|i| {
                        let t = i as f64 / (LEGEND_STOPS - 1) as f64;
                        (t, viridis(t))
                    })
                    .collect();
                (colors, Legend::Gradient { stops, min, max })
            }
            Normalization::NoVariance { value } => match settings.flat_attribute {
                FlatAttributePolicy::Fail => return Err(PipelineError::NoVariance { value }),
                FlatAttributePolicy::Neutral => {
                    warn!(
                        "Attribute has no variance (every point is {}), drawing a single color",
                        value
                    );
                    (
                        vec![NEUTRAL; points.len()],
                        Legend::Flat {
                            value,
                            color: NEUTRAL,
                        },
                    )
                }
            },
        };

        let plot_points = points
            .iter()
            .zip(colors)
            .map(|(p, color)| PlotPoint {
                x: p.x,
                y: p.y,
                color,
            })
            .collect();

        Ok(Self {
            points: plot_points,
            x_range: padded_range(points.iter().map(|p| p.x)),
            y_range: padded_range(points.iter().map(|p| p.y)),
            legend,
            title: settings.title.clone(),
            attribute_label: settings.attribute_label.clone(),
        })
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return -1.0..1.0;
    }
    let span = hi - lo;
    let pad = if span > 0.0 { span * AXIS_PADDING } else { 1.0 };
    (lo - pad)..(hi + pad)
}

/// Writes the plot to `settings.output_path`. An `.svg` extension selects
/// the SVG backend, anything else is written as a bitmap.
pub fn render(plot: &ScatterPlot, settings: &RenderSettings) -> Result<()> {
    let path = &settings.output_path;
    let size = (settings.image_width, settings.image_height);
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("svg"));

    let outcome = if is_svg {
        draw(SVGBackend::new(path, size).into_drawing_area(), plot)
    } else {
        draw(BitMapBackend::new(path, size).into_drawing_area(), plot)
    };
    outcome.map_err(|e| PipelineError::Render(e.to_string()))?;

    info!("Wrote {} points to {}", plot.points.len(), path.display());
    Ok(())
}

fn draw<DB: DrawingBackend>(root: DrawingArea<DB, Shift>, plot: &ScatterPlot) -> std::result::Result<(), Box<dyn Error>>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (width, _) = root.dim_in_pixel();
    let (chart_area, legend_area) = root.split_horizontally(width as i32 - LEGEND_WIDTH);

    let mut chart = ChartBuilder::on(&chart_area)
        .caption(&plot.title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(plot.x_range.clone(), plot.y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc("t-SNE Component 1")
        .y_desc("t-SNE Component 2")
        .draw()?;

    chart.draw_series(
        plot.points
            .iter()
            .map(|p| Circle::new((p.x, p.y), POINT_RADIUS, p.color.mix(POINT_ALPHA).filled())),
    )?;
    chart.draw_series(
        plot.points
            .iter()
            .map(|p| Circle::new((p.x, p.y), POINT_RADIUS, BLACK.stroke_width(1))),
    )?;

    draw_legend(&legend_area, plot)?;

    root.present()?;
    Ok(())
}

fn draw_legend<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, plot: &ScatterPlot) -> std::result::Result<(), Box<dyn Error>>
where
    DB::ErrorType: 'static,
{
    match &plot.legend {
        Legend::Gradient { stops, min, max } => {
            let mut bar = ChartBuilder::on(area)
                .caption(range_caption(*min, *max), ("sans-serif", 14))
                .margin_top(60)
                .margin_bottom(60)
                .margin_right(40)
                .y_label_area_size(70)
                .build_cartesian_2d(0.0..1.0, 0.0..1.0)?;

            bar.configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .disable_x_axis()
                .y_labels(6)
                .y_desc(&plot.attribute_label)
                .draw()?;

            let half = 0.5 / (stops.len().max(2) - 1) as f64;
            bar.draw_series(stops.iter().map(|&(t, color)| {
                let lo = (t - half).max(0.0);
                let hi = (t + half).min(1.0);
                Rectangle::new([(0.0, lo), (1.0, hi)], color.filled())
            }))?;
        }
        Legend::Flat { value, color } => {
            let mut swatch = ChartBuilder::on(area)
                .caption(format!("no variance: {}", value), ("sans-serif", 14))
                .margin_top(60)
                .margin_bottom(60)
                .margin_right(40)
                .y_label_area_size(70)
                .build_cartesian_2d(0.0..1.0, 0.0..1.0)?;

            swatch
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .disable_x_axis()
                .y_labels(0)
                .y_desc(&plot.attribute_label)
                .draw()?;

            swatch.draw_series(std::iter::once(Rectangle::new(
                [(0.0, 0.0), (1.0, 1.0)],
                color.filled(),
            )))?;
        }
    }
    Ok(())
}

/// Raw attribute bounds shown above the color bar, whose ticks run over `[0, 1]`.
fn range_caption(min: f64, max: f64) -> String {
    format!("{:.3} .. {:.3}", min, max)
}
