//! Planar geometry on latitude/longitude pairs used by the coastline
//! processing. Longitude is treated as x, latitude as y.

use mapscout_types::{GeoBox, GeoCoord};

/// Crossing of segment `a[a_index]..a[a_index + 1]` with
/// `b[b_index]..b[b_index + 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathIntersection {
    pub point: GeoCoord,
    pub a_index: usize,
    pub b_index: usize,
    /// Squared distance from the start of the `a` segment
    pub a_dist_sq: f64,
    pub b_dist_sq: f64,
    /// Positive when `b` crosses `a` from its left to its right, 0 for a touch
    pub orientation: f64,
}

/// Intersection point of the segments `a1..a2` and `b1..b2`, if any.
///
/// Shared endpoints intersect at that endpoint. Collinear overlapping segments
/// intersect at the first endpoint found inside the other segment's box.
pub fn get_line_intersection(
    a1: &GeoCoord,
    a2: &GeoCoord,
    b1: &GeoCoord,
    b2: &GeoCoord,
) -> Option<GeoCoord> {
    if a1 == b1 || a1 == b2 {
        return Some(*a1);
    }
    if a2 == b1 || a2 == b2 {
        return Some(*a2);
    }
    if a1 == a2 && b1 == b2 {
        return None;
    }

    let denr = (b2.lat - b1.lat) * (a2.lon - a1.lon) - (b2.lon - b1.lon) * (a2.lat - a1.lat);
    let ua_numr = (b2.lon - b1.lon) * (a1.lat - b1.lat) - (b2.lat - b1.lat) * (a1.lon - b1.lon);
    let ub_numr = (a2.lon - a1.lon) * (a1.lat - b1.lat) - (a2.lat - a1.lat) * (a1.lon - b1.lon);

    if denr == 0.0 {
        if ua_numr != 0.0 || ub_numr != 0.0 {
            return None;
        }
        let a_box = GeoBox::new(*a1, *a2);
        let b_box = GeoBox::new(*b1, *b2);
        return [(b_box, a1), (b_box, a2), (a_box, b1), (a_box, b2)]
            .into_iter()
            .find(|(bbox, point)| bbox.contains(point))
            .map(|(_, point)| *point);
    }

    let ua = ua_numr / denr;
    let ub = ub_numr / denr;
    if (0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub) {
        return Some(GeoCoord::new(
            a1.lat + ua * (a2.lat - a1.lat),
            a1.lon + ua * (a2.lon - a1.lon),
        ));
    }

    None
}

pub fn lines_intersect(a1: &GeoCoord, a2: &GeoCoord, b1: &GeoCoord, b2: &GeoCoord) -> bool {
    get_line_intersection(a1, a2, b1, b2).is_some()
}

/// All crossings between the paths `a` and `b`. A closed path includes the
/// segment from its last point back to the first.
pub fn find_path_intersections(
    a: &[GeoCoord],
    b: &[GeoCoord],
    a_closed: bool,
    b_closed: bool,
) -> Vec<PathIntersection> {
    let mut intersections = Vec::new();
    if a.len() < 2 || b.len() < 2 {
        return intersections;
    }

    let a_bound = if a_closed { a.len() } else { a.len() - 1 };
    let b_bound = if b_closed { b.len() } else { b.len() - 1 };
    let b_box = GeoBox::from_coords(b);

    for a_index in 0..a_bound {
        let a1 = &a[a_index];
        let a2 = &a[(a_index + 1) % a.len()];
        let a_line = GeoBox::new(*a1, *a2);
        if !b_box.intersects(&a_line) {
            continue;
        }

        for b_index in 0..b_bound {
            let b1 = &b[b_index];
            let b2 = &b[(b_index + 1) % b.len()];
            if !a_line.intersects(&GeoBox::new(*b1, *b2)) {
                continue;
            }

            let Some(point) = get_line_intersection(a1, a2, b1, b2) else {
                continue;
            };

            // Both lines are prolonged so that a crossing exactly at a1 or b2
            // still gets an orientation.
            let before = GeoCoord::new(a1.lat - (a2.lat - a1.lat), a1.lon - (a2.lon - a1.lon));
            let after = GeoCoord::new(b2.lat + (b2.lat - b1.lat), b2.lon + (b2.lon - b1.lon));
            let orientation = (point.lon - before.lon) * (after.lat - point.lat)
                - (point.lat - before.lat) * (after.lon - point.lon);

            intersections.push(PathIntersection {
                point,
                a_index,
                b_index,
                a_dist_sq: a1.distance_square(&point),
                b_dist_sq: b1.distance_square(&point),
                orientation,
            });
        }
    }

    intersections
}

/// 1 if `point` lies inside `area`, 0 if it is one of its vertices, -1 outside.
pub fn point_relation_to_area(point: &GeoCoord, area: &[GeoCoord]) -> i8 {
    if area.is_empty() {
        return -1;
    }

    let mut inside = false;
    let mut j = area.len() - 1;
    for i in 0..area.len() {
        let (ni, nj) = (&area[i], &area[j]);
        if point == ni {
            return 0;
        }
        let crosses = (ni.lat <= point.lat && point.lat < nj.lat)
            || (nj.lat <= point.lat && point.lat < ni.lat);
        if crosses
            && point.lon < (nj.lon - ni.lon) * (point.lat - ni.lat) / (nj.lat - ni.lat) + ni.lon
        {
            inside = !inside;
        }
        j = i;
    }

    if inside { 1 } else { -1 }
}

/// Whether at least one point of `a` lies inside or on a vertex of `b`.
pub fn is_area_at_least_partly_in_area(a: &[GeoCoord], b: &[GeoCoord]) -> bool {
    let a_box = GeoBox::from_coords(a);
    let b_box = GeoBox::from_coords(b);
    if !a_box.intersects(&b_box) {
        return false;
    }

    a.iter()
        .any(|point| b_box.contains(point) && point_relation_to_area(point, b) >= 0)
}

/// Whether every point of `a` lies inside or on a vertex of `b`.
pub fn is_area_completely_in_area(a: &[GeoCoord], b: &[GeoCoord]) -> bool {
    a.iter().all(|point| point_relation_to_area(point, b) >= 0)
}

pub fn bounding_box(coords: &[GeoCoord]) -> GeoBox {
    GeoBox::from_coords(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> GeoCoord {
        GeoCoord::new(lat, lon)
    }

    #[test]
    fn test_crossing_segments() {
        let point = get_line_intersection(&c(0.0, 0.0), &c(2.0, 2.0), &c(0.0, 2.0), &c(2.0, 0.0));
        assert_eq!(point, Some(c(1.0, 1.0)));
    }

    #[test]
    fn test_disjoint_and_parallel_segments() {
        assert!(!lines_intersect(&c(0.0, 0.0), &c(1.0, 0.0), &c(0.0, 1.0), &c(1.0, 1.0)));
        assert!(!lines_intersect(&c(0.0, 0.0), &c(1.0, 1.0), &c(3.0, 0.0), &c(2.0, 0.5)));
    }

    #[test]
    fn test_shared_endpoint() {
        let point = get_line_intersection(&c(0.0, 0.0), &c(1.0, 1.0), &c(1.0, 1.0), &c(2.0, 0.0));
        assert_eq!(point, Some(c(1.0, 1.0)));
    }

    #[test]
    fn test_collinear_overlap() {
        let point = get_line_intersection(&c(0.0, 0.0), &c(0.0, 2.0), &c(0.0, 1.0), &c(0.0, 3.0));
        assert_eq!(point, Some(c(0.0, 2.0)));

        assert!(!lines_intersect(&c(0.0, 0.0), &c(0.0, 1.0), &c(0.0, 2.0), &c(0.0, 3.0)));
    }

    #[test]
    fn test_path_intersection_orientation() {
        // Horizontal a (west to east), b crossing from north to south and back.
        let a = [c(0.0, 0.0), c(0.0, 10.0)];
        let down = [c(1.0, 5.0), c(-1.0, 5.0)];
        let up = [c(-1.0, 5.0), c(1.0, 5.0)];

        let crossing = find_path_intersections(&a, &down, false, false);
        assert_eq!(crossing.len(), 1);
        assert_eq!(crossing[0].point, c(0.0, 5.0));
        assert_eq!(crossing[0].a_dist_sq, 25.0);
        assert!(crossing[0].orientation < 0.0);

        let crossing = find_path_intersections(&a, &up, false, false);
        assert!(crossing[0].orientation > 0.0);
    }

    #[test]
    fn test_closed_path_includes_last_segment() {
        let square = [c(0.0, 0.0), c(0.0, 2.0), c(2.0, 2.0), c(2.0, 0.0)];
        let line = [c(1.0, -1.0), c(1.0, 1.0)];

        assert!(find_path_intersections(&square, &line, false, false).is_empty());
        let closed = find_path_intersections(&square, &line, true, false);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].a_index, 3);
    }

    #[test]
    fn test_point_relation() {
        let square = [c(0.0, 0.0), c(0.0, 2.0), c(2.0, 2.0), c(2.0, 0.0)];
        assert_eq!(point_relation_to_area(&c(1.0, 1.0), &square), 1);
        assert_eq!(point_relation_to_area(&c(2.0, 2.0), &square), 0);
        assert_eq!(point_relation_to_area(&c(3.0, 1.0), &square), -1);
    }

    #[test]
    fn test_partly_in_area() {
        let square = [c(0.0, 0.0), c(0.0, 2.0), c(2.0, 2.0), c(2.0, 0.0)];
        let overlapping = [c(1.0, 1.0), c(1.0, 5.0), c(5.0, 5.0)];
        let outside = [c(5.0, 5.0), c(5.0, 6.0), c(6.0, 6.0)];

        assert!(is_area_at_least_partly_in_area(&overlapping, &square));
        assert!(!is_area_completely_in_area(&overlapping, &square));
        assert!(!is_area_at_least_partly_in_area(&outside, &square));
    }
}
