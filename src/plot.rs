//! Comparison plots rendered to a multi-page SVG document.
//!
//! Pages are stacked vertically in one file. Every page function draws onto
//! the area it is handed and nothing else.

use anyhow::{Result, bail};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;
use tracing::info;

use crate::dataset::{Dataset, intersection_points, rows_sorted_by, sorted_pairs};

/// One page of the output document.
pub type Page<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Series colours, in the order labels are assigned them.
const COLOURS: &[RGBColor] = &[BLACK, RED, BLUE, GREEN, CYAN, MAGENTA, YELLOW];

const DIAGONAL: RGBColor = RGBColor(128, 128, 128);

const FONT: &str = "sans-serif";

/// Settings for the two-input comparison document.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOptions {
    /// Radius of scatter points, in pixels.
    pub point_size: u32,
    /// Width and height of a single page.
    pub page_size: (u32, u32),
    pub xmax_45deg: Option<f64>,
    pub ymax_45deg: Option<f64>,
    pub ymax_sorted_curve: Option<f64>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            point_size: 2,
            page_size: (1024, 768),
            xmax_45deg: None,
            ymax_45deg: None,
            ymax_sorted_curve: None,
        }
    }
}

/// Settings for the single-page sorted scatter of any number of inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterOptions {
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: Option<f64>,
    pub ymax: Option<f64>,
    pub point_size: u32,
    pub page_size: (u32, u32),
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            title: "Correlation of various bwscanning systems".to_string(),
            x_desc: "Relay #".to_string(),
            y_desc: "\"Bandwidth\" units (thousands)".to_string(),
            xmin: 0.0,
            ymin: 0.0,
            xmax: None,
            ymax: None,
            point_size: 2,
            page_size: (1024, 768),
        }
    }
}

/// Axis range from `min` up to `cap`, or a little past the largest value.
fn axis(min: f64, cap: Option<f64>, values: impl Iterator<Item = f64>) -> Result<Range<f64>> {
    let max = cap.unwrap_or_else(|| {
        let largest = values.fold(min, f64::max);
        if largest > min { largest * 1.05 } else { min + 1.0 }
    });
    if !min.is_finite() || !max.is_finite() || max <= min {
        bail!("axis maximum {max} must be greater than minimum {min}");
    }
    Ok(min..max)
}

/// Points sitting on a capped axis edge still get drawn.
fn inside(range: &Range<f64>, v: f64) -> bool {
    range.start <= v && v <= range.end
}

/// X and Y ranges of a chart.
pub type Axes = (Range<f64>, Range<f64>);

/// Axes for the diagonal page, from zero up to the 45 degree caps.
pub fn diagonal_axes(points: &[(f64, f64)], opts: &PlotOptions) -> Result<Axes> {
    Ok((
        axis(0.0, opts.xmax_45deg, points.iter().map(|p| p.0))?,
        axis(0.0, opts.ymax_45deg, points.iter().map(|p| p.1))?,
    ))
}

/// Axes for a sorted page: one x slot per relay, y up to the sorted-curve cap.
pub fn sorted_axes(pairs: &[(u64, u64)], opts: &PlotOptions) -> Result<Axes> {
    Ok((
        axis(0.0, None, std::iter::once(pairs.len() as f64))?,
        axis(
            0.0,
            opts.ymax_sorted_curve,
            pairs.iter().flat_map(|&(a, b)| [a as f64, b as f64]),
        )?,
    ))
}

/// Scatter of one label's values against the other's, with a 45 degree
/// reference line.
pub fn draw_against_diagonal(
    page: &Page<'_>,
    x_label: &str,
    y_label: &str,
    points: &[(f64, f64)],
    (x_range, y_range): Axes,
    opts: &PlotOptions,
) -> Result<()> {
    let title = format!("How closely {x_label} and {y_label} match");
    info!(
        title = %title,
        x = x_label,
        y = y_label,
        "Plotting; dots above the diagonal were measured faster by y, below by x"
    );

    let mut chart = ChartBuilder::on(page)
        .caption(&title, (FONT, 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc(format!("Bandwidth according to {x_label} (KB)"))
        .y_desc(format!("Bandwidth according to {y_label} (KB)"))
        .draw()?;

    let end = x_range.end.min(y_range.end);
    chart.draw_series(LineSeries::new(
        [(0.0, 0.0), (end, end)],
        DIAGONAL.stroke_width(1),
    ))?;

    chart.draw_series(
        points
            .iter()
            .filter(|&&(x, y)| inside(&x_range, x) && inside(&y_range, y))
            .map(|&p| Circle::new(p, opts.point_size, BLUE.filled())),
    )?;

    Ok(())
}

/// Both labels' values for each shared relay, ordered by `sort_label`'s
/// value from fastest to slowest.
pub fn draw_sorted_curves(
    page: &Page<'_>,
    sort_label: &str,
    other_label: &str,
    pairs: &[(u64, u64)],
    (x_range, y_range): Axes,
    opts: &PlotOptions,
) -> Result<()> {
    let title = format!("Relays sorted by bandwidth according to {sort_label}");
    info!(
        title = %title,
        sort = sort_label,
        other = other_label,
        "Plotting; the closer other follows the sort trend, the more similar they are"
    );

    let mut chart = ChartBuilder::on(page)
        .caption(&title, (FONT, 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc("Arbitrary relay number (lower is faster)")
        .y_desc("Bandwidth (KB)")
        .draw()?;

    let series = [
        (sort_label, BLUE, pairs.iter().map(|p| p.0).collect::<Vec<_>>()),
        (other_label, RED, pairs.iter().map(|p| p.1).collect::<Vec<_>>()),
    ];
    for (label, colour, values) in series {
        chart
            .draw_series(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &bw)| (i as f64, bw as f64))
                    .filter(|&(_, y)| inside(&y_range, y))
                    .map(|p| Circle::new(p, opts.point_size, colour.filled())),
            )?
            .label(label)
            .legend(move |(x, y)| Circle::new((x, y), 3, colour.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.filled())
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

/// Writes the comparison document for two datasets: the diagonal scatter,
/// then one sorted page per dataset, `x` first.
#[tracing::instrument(skip_all, fields(path = %path.display(), x = %x.label, y = %y.label))]
pub fn render_comparison(path: &Path, x: &Dataset, y: &Dataset, opts: &PlotOptions) -> Result<()> {
    let points: Vec<(f64, f64)> = intersection_points(x, y)
        .into_values()
        .map(|(a, b)| (a as f64, b as f64))
        .collect();
    if points.is_empty() {
        bail!("{} and {} share no fingerprints", x.label, y.label);
    }
    let curves = [(x, y, sorted_pairs(x, y)), (y, x, sorted_pairs(y, x))];

    // Every axis is settled before the backend exists, so a rejected cap
    // leaves no file behind.
    let diagonal = diagonal_axes(&points, opts)?;
    let sorted = curves
        .iter()
        .map(|(_, _, pairs)| sorted_axes(pairs, opts))
        .collect::<Result<Vec<_>>>()?;

    let (width, height) = opts.page_size;
    let root = SVGBackend::new(path, (width, height * 3)).into_drawing_area();
    root.fill(&WHITE)?;
    let pages = root.split_evenly((3, 1));

    draw_against_diagonal(&pages[0], &x.label, &y.label, &points, diagonal, opts)?;
    for ((page, (sort, other, pairs)), axes) in pages[1..].iter().zip(&curves).zip(sorted) {
        draw_sorted_curves(page, &sort.label, &other.label, pairs, axes, opts)?;
    }

    root.present()?;
    info!(pages = pages.len(), "Comparison written");
    Ok(())
}

/// Writes a single page plotting every dataset's values for the relays they
/// all share, ordered by the first dataset's value from fastest to slowest.
#[tracing::instrument(skip_all, fields(path = %path.display(), inputs = datasets.len()))]
pub fn render_sorted_scatter(path: &Path, datasets: &[Dataset], opts: &ScatterOptions) -> Result<()> {
    let rows = rows_sorted_by(datasets, 0);
    if rows.is_empty() {
        bail!("inputs share no fingerprints");
    }
    info!(shared = rows.len(), "Plotting sorted scatter");

    let x_range = axis(opts.xmin, opts.xmax, std::iter::once(rows.len() as f64))?;
    let y_range = axis(
        opts.ymin,
        opts.ymax,
        rows.iter().flatten().map(|&bw| bw as f64),
    )?;

    let root = SVGBackend::new(path, opts.page_size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&opts.title, (FONT, 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;

    chart
        .configure_mesh()
        .x_desc(opts.x_desc.as_str())
        .y_desc(opts.y_desc.as_str())
        .draw()?;

    // Colours follow label order so reruns with shuffled inputs match.
    let mut order: Vec<usize> = (0..datasets.len()).collect();
    order.sort_by(|&a, &b| datasets[a].label.cmp(&datasets[b].label));

    for (n, &i) in order.iter().enumerate() {
        let colour = COLOURS[n % COLOURS.len()];
        chart
            .draw_series(
                rows.iter()
                    .enumerate()
                    .map(|(x, row)| (x as f64, row[i] as f64))
                    .filter(|&(x, y)| inside(&x_range, x) && inside(&y_range, y))
                    .map(|p| Circle::new(p, opts.point_size, colour.filled())),
            )?
            .label(datasets[i].label.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 3, colour.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.filled())
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Pair;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    fn dataset(label: &str, values: &[(&str, u64)]) -> Dataset {
        let mut d = Dataset::new(label);
        for &(fp, bw) in values {
            d.insert(Pair::new(fp, bw));
        }
        d
    }

    #[test]
    fn test_axis_defaults_past_largest_value() {
        let range = axis(0.0, None, [10.0, 20.0].into_iter()).unwrap();
        assert_eq!(range.start, 0.0);
        assert!(range.end > 20.0);
    }

    #[test]
    fn test_axis_cap_overrides_data() {
        let range = axis(0.0, Some(5.0), [10.0, 20.0].into_iter()).unwrap();
        assert_eq!(range, 0.0..5.0);
    }

    #[test]
    fn test_axis_without_data_is_not_empty() {
        let range = axis(0.0, None, std::iter::empty()).unwrap();
        assert_eq!(range, 0.0..1.0);
    }

    #[test]
    fn test_axis_cap_below_min_is_error() {
        assert!(axis(10.0, Some(5.0), std::iter::empty()).is_err());
    }

    #[test]
    fn test_axis_rejects_non_finite_cap() {
        assert!(axis(0.0, Some(f64::NAN), [10.0].into_iter()).is_err());
        assert!(axis(0.0, Some(f64::INFINITY), [10.0].into_iter()).is_err());
    }

    #[test]
    fn test_render_comparison_rejected_cap_leaves_no_file() {
        let a = dataset("a", &[("X", 10), ("Y", 20)]);
        let b = dataset("b", &[("X", 15), ("Y", 18)]);

        let bad = [
            PlotOptions {
                xmax_45deg: Some(-5.0),
                ..Default::default()
            },
            PlotOptions {
                ymax_sorted_curve: Some(0.0),
                ..Default::default()
            },
            PlotOptions {
                ymax_45deg: Some(f64::NAN),
                ..Default::default()
            },
        ];
        for (i, opts) in bad.iter().enumerate() {
            let path = temp_path(&format!("v3bw_plot_test_bad_cap_{i}.svg"));
            let _ = fs::remove_file(&path);

            assert!(render_comparison(&path, &a, &b, opts).is_err());
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_render_comparison_writes_svg() {
        let path = temp_path("v3bw_plot_test_comparison.svg");
        let _ = fs::remove_file(&path);

        let a = dataset("torflow", &[("X", 10), ("Y", 20), ("Z", 30)]);
        let b = dataset("sbws", &[("X", 15), ("Y", 18), ("W", 1)]);
        render_comparison(&path, &a, &b, &PlotOptions::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"));
        assert!(content.contains("How closely torflow and sbws match"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_render_comparison_without_shared_fingerprints() {
        let path = temp_path("v3bw_plot_test_disjoint.svg");
        let _ = fs::remove_file(&path);

        let a = dataset("a", &[("X", 10)]);
        let b = dataset("b", &[("Y", 15)]);

        assert!(render_comparison(&path, &a, &b, &PlotOptions::default()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_render_sorted_scatter_writes_svg() {
        let path = temp_path("v3bw_plot_test_scatter.svg");
        let _ = fs::remove_file(&path);

        let datasets = [
            dataset("b", &[("X", 10), ("Y", 20)]),
            dataset("a", &[("X", 12), ("Y", 19)]),
            dataset("c", &[("X", 9), ("Y", 21)]),
        ];
        let opts = ScatterOptions {
            ymax: Some(15.0),
            ..Default::default()
        };
        render_sorted_scatter(&path, &datasets, &opts).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("<svg"));

        fs::remove_file(&path).unwrap();
    }
}
