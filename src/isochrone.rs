use contour::ContourBuilder;
use geo::{Area, BooleanOps, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::breaks::{Breaks, DEFAULT_BREAKS};
use crate::crs::{reproject, wrap_longitude, Crs, Reproject, WORLD_WIDTH};
use crate::error::{IsochroneError, ReprojectionError, SamplerError};
use crate::grid::{meters_per_minute, SampleGrid, DEFAULT_RESOLUTION, DEFAULT_SPEED_KMH};
use crate::raster::CostRaster;
use crate::sampler::{CostSample, CostSampler};

/// Metric space the grid, raster and contours live in.
const WORKING_CRS: Crs = Crs::WebMercator;

/// Relative slack, in minutes, added to each break before contouring.
const BREAK_TOLERANCE: f64 = 1e-6;

/// Starting point of an isochrone computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Origin {
    pub point: Point<f64>,
    /// CRS of `point`; WGS84 when absent.
    pub crs: Option<Crs>,
}

impl Origin {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            point: Point::new(lon, lat),
            crs: None,
        }
    }

    pub fn with_crs(point: Point<f64>, crs: Crs) -> Self {
        Self {
            point,
            crs: Some(crs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneOptions {
    /// Travel-time thresholds in minutes.
    pub breaks: Vec<f64>,
    /// Number of grid points along each axis.
    pub resolution: usize,
    /// Assumed average speed used to bound the sampled area.
    pub speed_kmh: f64,
    /// Interpolate contour vertices between cell centers.
    pub smooth: bool,
    /// CRS of the returned geometry; defaults to the origin's CRS.
    pub output_crs: Option<Crs>,
}

impl Default for IsochroneOptions {
    fn default() -> Self {
        Self {
            breaks: DEFAULT_BREAKS.to_vec(),
            resolution: DEFAULT_RESOLUTION,
            speed_kmh: DEFAULT_SPEED_KMH,
            smooth: true,
            output_crs: None,
        }
    }
}

/// Area reachable with a cost in `(min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsochroneBand {
    pub id: usize,
    pub min: f64,
    pub max: f64,
    pub center: f64,
    pub geometry: MultiPolygon<f64>,
}

impl IsochroneBand {
    fn new(id: usize, min: f64, max: f64, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            min,
            max,
            center: (max - min) / 2.0,
            geometry,
        }
    }
}

/// Bands ordered from the origin outwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsochroneSet {
    pub crs: Crs,
    pub bands: Vec<IsochroneBand>,
}

impl IsochroneSet {
    /// One MultiPolygon feature per band, carrying `id`, `min`, `max` and `center`.
    pub fn to_geojson(&self) -> GeoJson {
        let features = self
            .bands
            .iter()
            .map(|band| {
                let mut properties = JsonObject::new();
                properties.insert("id".to_string(), serde_json::json!(band.id));
                properties.insert("min".to_string(), serde_json::json!(band.min));
                properties.insert("max".to_string(), serde_json::json!(band.max));
                properties.insert("center".to_string(), serde_json::json!(band.center));

                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(
                        &band.geometry,
                    ))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect::<Vec<Feature>>();

        // GeoJSON assumes lon/lat; anything else gets the legacy named-CRS member.
        let foreign_members = (self.crs != Crs::Wgs84).then(|| {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                serde_json::json!({
                    "type": "name",
                    "properties": { "name": self.crs.to_string() }
                }),
            );
            members
        });

        GeoJson::from(FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        })
    }
}

/// Runs the whole pipeline for one origin: grid, sampling, raster, bands and
/// reprojection into the output CRS.
pub fn compute_isochrones<S, P>(
    origin: &Origin,
    options: &IsochroneOptions,
    sampler: &S,
    projector: &P,
) -> Result<IsochroneSet, IsochroneError>
where
    S: CostSampler + ?Sized,
    P: Reproject + ?Sized,
{
    let breaks = Breaks::new(&options.breaks)?;
    let source_crs = origin.crs.unwrap_or_default();
    let output_crs = options.output_crs.unwrap_or(source_crs);

    info!(
        x = origin.point.x(),
        y = origin.point.y(),
        crs = %source_crs,
        breaks = ?breaks.values(),
        "computing isochrones"
    );

    let center = reproject(&origin.point, source_crs, WORKING_CRS, projector)?;
    let origin_lonlat = reproject(&origin.point, source_crs, Crs::Wgs84, projector)?;
    let origin_lonlat = Point::new(wrap_longitude(origin_lonlat.x()), origin_lonlat.y());

    let dmax = breaks.max() * meters_per_minute(options.speed_kmh);
    let grid = SampleGrid::generate(center.0, dmax, options.resolution)?;
    debug!(dmax, step = grid.step(), points = grid.points().len(), "generated sample grid");

    let destinations = grid
        .points()
        .iter()
        .map(|coord| {
            let lonlat = reproject(&Point::from(*coord), WORKING_CRS, Crs::Wgs84, projector)?;
            Ok(Point::new(wrap_longitude(lonlat.x()), lonlat.y()))
        })
        .collect::<Result<Vec<_>, ReprojectionError>>()?;

    let samples = sampler.query_costs(origin_lonlat, &destinations)?;
    if samples.len() != destinations.len() {
        return Err(SamplerError::Malformed(format!(
            "expected {} costs, got {}",
            destinations.len(),
            samples.len()
        ))
        .into());
    }
    debug!(
        reachable = samples.iter().filter(|s| s.cost.is_some()).count(),
        total = samples.len(),
        "sampled travel costs"
    );

    let projected = samples
        .iter()
        .map(|sample| {
            let location = reproject(&sample.location, Crs::Wgs84, WORKING_CRS, projector)?;
            Ok(CostSample {
                location: nearest_copy(location, center.x()),
                cost: sample.cost,
            })
        })
        .collect::<Result<Vec<_>, ReprojectionError>>()?;

    let raster = CostRaster::rasterize(&grid, &projected)?;
    let bands = extract_bands(&raster, &breaks, options.smooth)?;

    let bands = bands
        .into_iter()
        .map(|band| {
            Ok(IsochroneBand {
                geometry: reproject(&band.geometry, WORKING_CRS, output_crs, projector)?,
                ..band
            })
        })
        .collect::<Result<Vec<_>, ReprojectionError>>()?;

    info!(bands = bands.len(), crs = %output_crs, "isochrones ready");
    Ok(IsochroneSet {
        crs: output_crs,
        bands,
    })
}

/// Shifts an easting by whole turns of the globe so it lands next to
/// `center_x`, undoing the wrap applied to destinations.
fn nearest_copy(location: Point<f64>, center_x: f64) -> Point<f64> {
    let turns = ((center_x - location.x()) / WORLD_WIDTH).round();
    Point::new(location.x() + turns * WORLD_WIDTH, location.y())
}

/// Turns a cost raster into one band per consecutive pair of breaks,
/// innermost first.
///
/// Bands without area are left out and `id` follows the returned order.
pub fn extract_bands(
    raster: &CostRaster,
    breaks: &Breaks,
    smooth: bool,
) -> Result<Vec<IsochroneBand>, IsochroneError> {
    if raster.sampled_cells() == 0 {
        return Err(IsochroneError::NoReachableArea(
            "cost raster holds no sampled cell".to_string(),
        ));
    }

    let mut isolines = trace_isolines(raster, breaks, smooth)?;
    discard_origin_ring(&mut isolines);
    let mut bands = assemble_bands(breaks, &isolines);
    anchor_inner_band(&mut bands);

    let mut kept = Vec::with_capacity(bands.len());
    for band in bands {
        if band.geometry.0.is_empty() || band.geometry.unsigned_area() <= 0.0 {
            debug!(min = band.min, max = band.max, "dropping empty band");
            continue;
        }
        kept.push(IsochroneBand {
            id: kept.len(),
            ..band
        });
    }

    if kept.is_empty() {
        return Err(IsochroneError::NoReachableArea(format!(
            "no raster cell is reachable within {} minutes",
            breaks.max()
        )));
    }
    Ok(kept)
}

/// Area with `cost <= break` for every break, in break order.
///
/// The raster is negated so that the contour builder's `value >= threshold`
/// rule becomes `cost <= break`. Thresholds sit a hair past each break so that
/// interpolated outlines still enclose cells costing exactly the break. The
/// origin is moved back half a cell so that cell centers land on the grid
/// points.
fn trace_isolines(
    raster: &CostRaster,
    breaks: &Breaks,
    smooth: bool,
) -> Result<Vec<MultiPolygon<f64>>, IsochroneError> {
    let values = raster.values().iter().map(|cost| -cost).collect::<Vec<f64>>();
    let thresholds = breaks
        .values()
        .iter()
        .map(|b| -(b + b.abs().max(1.0) * BREAK_TOLERANCE))
        .collect::<Vec<f64>>();
    let half_step = raster.step() / 2.0;

    let isolines = ContourBuilder::new(raster.size(), raster.size(), smooth)
        .x_origin(raster.min().x - half_step)
        .y_origin(raster.min().y - half_step)
        .x_step(raster.step())
        .y_step(raster.step())
        .contours(&values, &thresholds)?
        .iter()
        .map(|contour| contour.geometry().clone())
        .collect::<Vec<MultiPolygon<f64>>>();

    Ok(isolines)
}

/// Band `k` is the isoline of `breaks[k + 1]` with the isoline of `breaks[k]`
/// cut out.
fn assemble_bands(breaks: &Breaks, isolines: &[MultiPolygon<f64>]) -> Vec<IsochroneBand> {
    breaks
        .intervals()
        .zip(isolines.windows(2))
        .enumerate()
        .map(|(id, ((min, max), pair))| {
            let (inner, outer) = (&pair[0], &pair[1]);
            let geometry = if inner.0.is_empty() {
                outer.clone()
            } else if inner == outer {
                MultiPolygon::new(Vec::new())
            } else {
                outer.difference(inner)
            };
            IsochroneBand::new(id, min, max, geometry)
        })
        .collect()
}

/// The isoline of the smallest break only circles the origin itself and is
/// dropped, so the band next to the origin is the whole area within its `max`.
fn discard_origin_ring(isolines: &mut [MultiPolygon<f64>]) {
    if let Some(ring) = isolines.first_mut() {
        *ring = MultiPolygon::new(Vec::new());
    }
}

/// The band next to the origin starts at 0.
fn anchor_inner_band(bands: &mut [IsochroneBand]) {
    match bands.first_mut() {
        Some(first) => {
            first.min = 0.0;
            first.center = (first.max - first.min) / 2.0;
        }
        None => warn!("no band to anchor at the origin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::SphericalMercator;
    use geo::{polygon, Contains, Coord};

    /// Raster over a `size × size` grid centered on 0 with 100 m cells, costs
    /// given row by row from the bottom.
    fn raster(size: usize, costs: &[f64]) -> CostRaster {
        let dmax = 50.0 * (size - 1) as f64;
        let grid = SampleGrid::generate(Coord { x: 0.0, y: 0.0 }, dmax, size).unwrap();
        let samples = grid
            .points()
            .iter()
            .zip(costs)
            .map(|(coord, cost)| CostSample {
                location: Point::from(*coord),
                cost: Some(*cost),
            })
            .collect::<Vec<_>>();
        CostRaster::rasterize(&grid, &samples).unwrap()
    }

    /// Costs growing with the Chebyshev distance from the center cell.
    fn rings(size: usize, per_ring: f64) -> Vec<f64> {
        let mid = (size / 2) as i64;
        (0..size as i64)
            .flat_map(|row| {
                (0..size as i64).map(move |col| {
                    let ring = (row - mid).abs().max((col - mid).abs());
                    ring as f64 * per_ring
                })
            })
            .collect()
    }

    #[test]
    fn bands_follow_break_order() {
        let raster = raster(9, &rings(9, 10.0));
        let breaks = Breaks::new(&[0.0, 10.0, 20.0, 30.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, true).unwrap();

        let mins: Vec<f64> = bands.iter().map(|b| b.min).collect();
        let maxs: Vec<f64> = bands.iter().map(|b| b.max).collect();
        let ids: Vec<usize> = bands.iter().map(|b| b.id).collect();
        assert_eq!(mins, vec![0.0, 10.0, 20.0]);
        assert_eq!(maxs, vec![10.0, 20.0, 30.0]);
        assert_eq!(ids, vec![0, 1, 2]);
        for band in &bands {
            assert_eq!(band.center, (band.max - band.min) / 2.0);
        }
    }

    #[test]
    fn outer_bands_are_rings_around_inner_ones() {
        let raster = raster(9, &rings(9, 10.0));
        let breaks = Breaks::new(&[0.0, 10.0, 20.0, 30.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, false).unwrap();
        let origin = Point::new(0.0, 0.0);

        assert!(bands[0].geometry.contains(&origin));
        assert!(!bands[1].geometry.contains(&origin));
        assert!(!bands[2].geometry.contains(&origin));
        assert!(bands[1].geometry.0.iter().any(|p| !p.interiors().is_empty()));

        // The bands tile the area within the largest break, whose outline
        // cuts the corners of the 7×7 block of cells costing at most 30.
        let area: f64 = bands.iter().map(|b| b.geometry.unsigned_area()).sum();
        let outline = trace_isolines(&raster, &breaks, false).unwrap()[3].unsigned_area();
        assert!((area - outline).abs() < 1e-3, "area {area}, outline {outline}");
        assert!((outline - 485_000.0).abs() < 1e-3, "outline {outline}");
    }

    #[test]
    fn cost_equal_to_break_is_inside() {
        let raster = raster(5, &rings(5, 10.0));
        let breaks = Breaks::new(&[0.0, 10.0, 20.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, false).unwrap();

        // Ring 1 cells cost exactly 10.
        let on_break = Point::new(100.0, 0.0);
        assert!(bands[0].geometry.contains(&on_break));
        assert!(!bands[1].geometry.contains(&on_break));

        let beyond = Point::new(200.0, 0.0);
        assert!(bands[1].geometry.contains(&beyond));
    }

    #[test]
    fn cost_equal_to_break_is_inside_when_smoothed() {
        let raster = raster(5, &rings(5, 10.0));
        let breaks = Breaks::new(&[0.0, 10.0, 20.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, true).unwrap();

        let on_break = Point::new(100.0, 0.0);
        assert!(bands[0].geometry.contains(&on_break));
        assert!(!bands[1].geometry.contains(&on_break));

        let on_outer_break = Point::new(200.0, 0.0);
        assert!(bands[1].geometry.contains(&on_outer_break));
    }

    #[test]
    fn isolated_cell_at_break_keeps_its_area() {
        // Only the center costs the break exactly; every neighbour is far beyond it.
        let mut costs = vec![50.0; 25];
        costs[0] = 0.0;
        costs[12] = 10.0;
        let raster = raster(5, &costs);
        let breaks = Breaks::new(&[0.0, 10.0, 60.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, true).unwrap();

        let center = Point::new(0.0, 0.0);
        assert_eq!(bands.len(), 2);
        assert!(bands[0].geometry.contains(&center));
        assert!(!bands[1].geometry.contains(&center));
    }

    #[test]
    fn inner_band_starts_at_zero_for_nonzero_breaks() {
        let raster = raster(9, &rings(9, 10.0));
        let breaks = Breaks::new(&[5.0, 15.0, 25.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, false).unwrap();

        assert_eq!(bands[0].min, 0.0);
        assert_eq!(bands[0].max, 15.0);
        assert_eq!(bands[0].center, 7.5);
        assert!(bands[0].geometry.contains(&Point::new(0.0, 0.0)));
        assert_eq!(bands[1].min, 15.0);
        assert_eq!(bands[1].center, 5.0);
    }

    #[test]
    fn empty_bands_are_omitted() {
        // Nothing costs between 10 and 20.
        let costs: Vec<f64> = rings(9, 10.0)
            .into_iter()
            .map(|c| if c >= 20.0 { c + 20.0 } else { c })
            .collect();
        let raster = raster(9, &costs);
        let breaks = Breaks::new(&[0.0, 10.0, 20.0, 50.0]).unwrap();
        let bands = extract_bands(&raster, &breaks, false).unwrap();

        let intervals: Vec<(f64, f64)> = bands.iter().map(|b| (b.min, b.max)).collect();
        assert_eq!(intervals, vec![(0.0, 10.0), (20.0, 50.0)]);
        assert_eq!(bands[1].id, 1);
    }

    #[test]
    fn unreachable_within_breaks_fails() {
        let costs = vec![100.0; 25];
        let raster = raster(5, &costs);
        let breaks = Breaks::new(&[0.0, 10.0]).unwrap();
        assert!(matches!(
            extract_bands(&raster, &breaks, true),
            Err(IsochroneError::NoReachableArea(_))
        ));
    }

    #[test]
    fn boundary_correction_touches_only_the_inner_band() {
        let square = |half: f64| {
            MultiPolygon::new(vec![polygon![
                (x: -half, y: -half),
                (x: half, y: -half),
                (x: half, y: half),
                (x: -half, y: half),
            ]])
        };
        let mut isolines = vec![square(1.0), square(10.0), square(20.0)];
        let breaks = Breaks::new(&[5.0, 10.0, 20.0]).unwrap();

        discard_origin_ring(&mut isolines);
        assert!(isolines[0].0.is_empty());
        assert_eq!(isolines[1], square(10.0));

        let mut bands = assemble_bands(&breaks, &isolines);
        assert_eq!(bands[0].geometry, square(10.0));
        assert_eq!(bands[0].min, 5.0);
        let untouched = bands[1].clone();

        anchor_inner_band(&mut bands);

        assert_eq!(bands[0].min, 0.0);
        assert_eq!(bands[0].max, 10.0);
        assert_eq!(bands[0].center, 5.0);
        assert_eq!(bands[1], untouched);
    }

    #[test]
    fn geojson_carries_band_properties() {
        let raster = raster(5, &rings(5, 10.0));
        let breaks = Breaks::new(&[0.0, 10.0, 20.0]).unwrap();
        let set = IsochroneSet {
            crs: Crs::WebMercator,
            bands: extract_bands(&raster, &breaks, true).unwrap(),
        };

        let GeoJson::FeatureCollection(collection) = set.to_geojson() else {
            panic!("expected a feature collection");
        };
        assert_eq!(collection.features.len(), 2);
        let outer = &collection.features[1];
        assert_eq!(outer.property("id"), Some(&serde_json::json!(1)));
        assert_eq!(outer.property("min"), Some(&serde_json::json!(10.0)));
        assert_eq!(outer.property("max"), Some(&serde_json::json!(20.0)));
        assert_eq!(outer.property("center"), Some(&serde_json::json!(5.0)));
        assert_eq!(
            collection.foreign_members.unwrap()["crs"]["properties"]["name"],
            serde_json::json!("EPSG:3857")
        );
    }

    struct Unreachable;

    impl CostSampler for Unreachable {
        fn query_costs(
            &self,
            _origin: Point<f64>,
            destinations: &[Point<f64>],
        ) -> Result<Vec<CostSample>, SamplerError> {
            Ok(destinations
                .iter()
                .map(|location| CostSample {
                    location: *location,
                    cost: None,
                })
                .collect())
        }
    }

    #[test]
    fn invalid_breaks_abort_before_sampling() {
        let options = IsochroneOptions {
            breaks: vec![0.0, 0.0],
            ..Default::default()
        };
        let result = compute_isochrones(
            &Origin::new(5.936036, 49.24882),
            &options,
            &Unreachable,
            &SphericalMercator,
        );
        assert!(matches!(result, Err(IsochroneError::InvalidBreaks(_))));
    }

    #[test]
    fn all_unreachable_destinations_fail() {
        let result = compute_isochrones(
            &Origin::new(5.936036, 49.24882),
            &IsochroneOptions::default(),
            &Unreachable,
            &SphericalMercator,
        );
        assert!(matches!(result, Err(IsochroneError::NoReachableArea(_))));
    }
}
