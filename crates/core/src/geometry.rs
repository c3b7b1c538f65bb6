//! GeoJSON geometries and distance helpers in feet.
//!
//! Great-circle distances use the haversine formula from `geo`. Buffer
//! membership tests project onto a local equirectangular plane in feet,
//! which is accurate at the tens-of-feet scale used here.

use geo::{BoundingRect, Centroid, Coord, EuclideanDistance, HaversineDistance, LineString, MultiPoint, Point, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::coerce_number;
use crate::types::LngLat;

pub const FEET_PER_METER: f64 = 3.280_839_895;
pub const FEET_PER_MILE: f64 = 5280.0;

/// Mean earth radius used by `geo`'s haversine, in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Distances below this are treated as zero.
const EPSILON_FEET: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// The subset of GeoJSON geometries the pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(LngLat),
    LineString(Vec<LngLat>),
    Polygon(Vec<Vec<LngLat>>),
}

impl Geometry {
    /// Lenient parse of a GeoJSON geometry object.
    ///
    /// Invalid positions are dropped. A point with an invalid position, or
    /// a line/polygon left with no positions, yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let coords = obj.get("coordinates")?;
        match obj.get("type")?.as_str()? {
            "Point" => parse_position(coords).map(Geometry::Point),
            "LineString" => {
                let line = parse_positions(coords);
                (!line.is_empty()).then_some(Geometry::LineString(line))
            }
            "Polygon" => {
                let rings: Vec<Vec<LngLat>> = coords
                    .as_array()?
                    .iter()
                    .map(parse_positions)
                    .filter(|r| !r.is_empty())
                    .collect();
                (!rings.is_empty()).then_some(Geometry::Polygon(rings))
            }
            _ => None,
        }
    }

    /// A single position standing for the geometry: the point itself, or
    /// the centroid of a line or polygon.
    pub fn representative_point(&self) -> Option<LngLat> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::LineString(line) => to_line_string(line).centroid().map(from_point),
            Geometry::Polygon(rings) => {
                let exterior = to_line_string(rings.first()?);
                Polygon::new(exterior, Vec::new()).centroid().map(from_point)
            }
        }
    }
}

fn parse_position(value: &Value) -> Option<LngLat> {
    let arr = value.as_array()?;
    let lng = coerce_number(arr.first()?)?;
    let lat = coerce_number(arr.get(1)?)?;
    let p = LngLat(lng, lat);
    p.is_valid().then_some(p)
}

fn parse_positions(value: &Value) -> Vec<LngLat> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(parse_position).collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn to_point(p: LngLat) -> Point<f64> {
    Point::new(p.0, p.1)
}

pub fn from_point(p: Point<f64>) -> LngLat {
    LngLat(p.x(), p.y())
}

pub fn to_line_string(points: &[LngLat]) -> LineString<f64> {
    LineString::from(points.iter().map(|p| (p.0, p.1)).collect::<Vec<_>>())
}

/// Arithmetic mean of the valid positions, or `None` if there are none.
pub fn mean_position(points: &[LngLat]) -> Option<LngLat> {
    let valid: Vec<Point<f64>> = points.iter().filter(|p| p.is_valid()).map(|p| to_point(*p)).collect();
    if valid.is_empty() {
        return None;
    }
    MultiPoint::from(valid).centroid().map(from_point)
}

// ---------------------------------------------------------------------------
// Distances
// ---------------------------------------------------------------------------

/// Great-circle distance in feet.
pub fn haversine_feet(a: LngLat, b: LngLat) -> f64 {
    to_point(a).haversine_distance(&to_point(b)) * FEET_PER_METER
}

/// Great-circle distance in meters.
pub fn haversine_meters(a: LngLat, b: LngLat) -> f64 {
    to_point(a).haversine_distance(&to_point(b))
}

/// Total polyline length in feet.
pub fn path_length_feet(points: &[LngLat]) -> f64 {
    points.windows(2).map(|w| haversine_feet(w[0], w[1])).sum()
}

/// Degrees of latitude spanned by `feet` along a meridian.
pub fn feet_to_latitude_degrees(feet: f64) -> f64 {
    (feet / FEET_PER_METER / EARTH_RADIUS_METERS).to_degrees()
}

/// Project `p` onto a plane in feet centered at `origin`.
fn project_feet(p: LngLat, origin: LngLat) -> Coord<f64> {
    let feet_per_degree = EARTH_RADIUS_METERS.to_radians() * FEET_PER_METER;
    let cos_lat = origin.1.to_radians().cos();
    Coord {
        x: (p.0 - origin.0) * feet_per_degree * cos_lat,
        y: (p.1 - origin.1) * feet_per_degree,
    }
}

/// Planar distance in feet from `point` to the polyline `path`.
pub fn distance_to_path_feet(point: LngLat, path: &[LngLat]) -> f64 {
    let origin = Point::new(0.0, 0.0);
    match path {
        [] => f64::INFINITY,
        [only] => {
            let c = project_feet(*only, point);
            origin.euclidean_distance(&Point::from(c))
        }
        _ => {
            let line: LineString<f64> = path.iter().map(|p| project_feet(*p, point)).collect();
            origin.euclidean_distance(&line)
        }
    }
}

/// Cheap bounding-box rejection for buffer tests.
pub fn within_expanded_bounds(point: LngLat, path: &[LngLat], buffer_feet: f64) -> bool {
    let Some(rect) = to_line_string(path).bounding_rect() else {
        return false;
    };
    let pad_lat = feet_to_latitude_degrees(buffer_feet);
    let cos_lat = point.1.to_radians().cos().abs().max(1e-6);
    let pad_lng = pad_lat / cos_lat;
    point.0 >= rect.min().x - pad_lng
        && point.0 <= rect.max().x + pad_lng
        && point.1 >= rect.min().y - pad_lat
        && point.1 <= rect.max().y + pad_lat
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// A fixed-length piece of a longer path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathChunk {
    pub coordinates: Vec<LngLat>,
    /// Distance along the source path where the chunk starts, in feet.
    pub start_feet: f64,
    pub end_feet: f64,
}

impl PathChunk {
    pub fn length_feet(&self) -> f64 {
        self.end_feet - self.start_feet
    }
}

fn lerp(a: LngLat, b: LngLat, t: f64) -> LngLat {
    LngLat(a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

/// Cut `points` into consecutive pieces of `chunk_feet` each; the last
/// piece holds the remainder. Cut points are interpolated along the edge
/// that crosses the boundary. Zero-length edges are skipped.
pub fn chunk_path(points: &[LngLat], chunk_feet: f64) -> Vec<PathChunk> {
    let mut chunks = Vec::new();
    let Some(&first) = points.first() else {
        return chunks;
    };
    if !(chunk_feet > 0.0) {
        return chunks;
    }

    let mut current = vec![first];
    let mut chunk_start = 0.0;
    let mut filled = 0.0;

    for edge in points.windows(2) {
        let (a, b) = (edge[0], edge[1]);
        let edge_len = haversine_feet(a, b);
        if edge_len <= EPSILON_FEET {
            continue;
        }

        let mut consumed = 0.0;
        while filled + (edge_len - consumed) >= chunk_feet - EPSILON_FEET {
            consumed += chunk_feet - filled;
            let cut = lerp(a, b, (consumed / edge_len).min(1.0));
            current.push(cut);
            chunks.push(PathChunk {
                coordinates: std::mem::replace(&mut current, vec![cut]),
                start_feet: chunk_start,
                end_feet: chunk_start + chunk_feet,
            });
            chunk_start += chunk_feet;
            filled = 0.0;
        }

        let remainder = edge_len - consumed;
        if remainder > EPSILON_FEET {
            filled += remainder;
            current.push(b);
        }
    }

    if filled > EPSILON_FEET && current.len() >= 2 {
        chunks.push(PathChunk {
            coordinates: current,
            start_feet: chunk_start,
            end_feet: chunk_start + filled,
        });
    }
    chunks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
