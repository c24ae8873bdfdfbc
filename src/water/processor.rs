//! Coastline merging and synthesis against bounding polygons.

use mapscout_types::GeoCoord;
use std::collections::BTreeMap;

use super::coast::{Coast, CoastPoint, CoastState};
use super::geometry::{PathIntersection, find_path_intersections, is_area_at_least_partly_in_area};
use crate::progress::Progress;

/// Join open coastline segments that share an endpoint node.
///
/// Segments are joined only on equal, non-zero node ids and only if their
/// left and right states are compatible. A chain that ends where it starts
/// becomes an area. Empty segments are dropped silently, degenerate results
/// with a warning. Areas pass through unchanged.
pub fn merge_coastlines(progress: &mut dyn Progress, coastlines: Vec<Coast>) -> Vec<Coast> {
    progress.set_action("Merging coastlines");

    let mut merged = Vec::new();
    let mut chains = Vec::new();
    let mut area_count = 0usize;
    let mut way_count = 0usize;

    for coast in coastlines {
        if coast.coast.is_empty() {
            continue;
        }
        if coast.is_area {
            area_count += 1;
            merged.push(coast);
        } else {
            chains.push(coast);
        }
    }

    let mut starts: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (index, chain) in chains.iter().enumerate() {
        if chain.front_node_id != 0 {
            starts.entry(chain.front_node_id).or_default().push(index);
        }
    }

    let mut consumed = vec![false; chains.len()];
    let mut joined = true;
    while joined {
        joined = false;

        for i in 0..chains.len() {
            if consumed[i] || chains[i].back_node_id == 0 {
                continue;
            }
            let Some(candidates) = starts.get(&chains[i].back_node_id) else {
                continue;
            };
            let Some(j) = candidates.iter().copied().find(|&j| {
                j != i
                    && !consumed[j]
                    && CoastState::compatible(chains[i].left, chains[j].left)
                    && CoastState::compatible(chains[i].right, chains[j].right)
            }) else {
                continue;
            };

            let tail = std::mem::take(&mut chains[j].coast);
            let (left, right) = (chains[j].left, chains[j].right);
            consumed[j] = true;

            let chain = &mut chains[i];
            chain.coast.extend(tail.into_iter().skip(1));
            chain.back_node_id = chain.coast.last().map_or(0, |p| p.id);
            chain.left = CoastState::merged(chain.left, left);
            chain.right = CoastState::merged(chain.right, right);
            joined = true;
        }
    }

    for (mut chain, consumed) in chains.into_iter().zip(consumed) {
        if consumed {
            continue;
        }

        if chain.front_node_id != 0 && chain.front_node_id == chain.back_node_id {
            chain.is_area = true;
            chain.coast.pop();
            area_count += 1;
        } else {
            way_count += 1;
        }

        if (chain.is_area && chain.coast.len() <= 2) || chain.coast.len() < 2 {
            progress.warn(&format!("Dropping too short coastline with id {}", chain.id));
            continue;
        }

        merged.push(chain);
    }

    progress.info(&format!(
        "{} way coastline(s), {} area coastline(s)",
        way_count, area_count
    ));
    merged
}

/// Append `src[start..end]` to `dst`, wrapping around the end of `src` when
/// the range runs backwards.
fn cut_path(
    dst: &mut Vec<CoastPoint>,
    src: &[CoastPoint],
    start: usize,
    end: usize,
    start_dist_sq: f64,
    end_dist_sq: f64,
) {
    let start = start % src.len();
    let end = end % src.len();

    if start > end || (start == end && start_dist_sq > end_dist_sq) {
        dst.extend_from_slice(&src[start..]);
        dst.extend_from_slice(&src[..end]);
    } else {
        dst.extend_from_slice(&src[start..end]);
    }
}

fn coords_of(coast: &Coast) -> Vec<GeoCoord> {
    coast.coords().collect()
}

fn cut_part(
    source: &Coast,
    from: &PathIntersection,
    to: &PathIntersection,
    along_a: bool,
) -> Vec<CoastPoint> {
    let mut points = vec![CoastPoint::synthetic(from.point)];
    if along_a {
        cut_path(
            &mut points,
            &source.coast,
            from.a_index + 1,
            to.a_index + 1,
            from.a_dist_sq,
            to.a_dist_sq,
        );
    } else {
        cut_path(
            &mut points,
            &source.coast,
            from.b_index + 1,
            to.b_index + 1,
            from.b_dist_sq,
            to.b_dist_sq,
        );
    }
    points.push(CoastPoint::synthetic(to.point));
    points
}

fn synthesized_part(
    source: &Coast,
    points: Vec<CoastPoint>,
    left: CoastState,
    right: CoastState,
) -> Coast {
    Coast {
        id: source.id,
        is_area: false,
        sort_criteria: source.sort_criteria,
        front_node_id: 0,
        back_node_id: 0,
        coast: points,
        left,
        right,
    }
}

/// Cut the bounding polygons and the coastlines at their crossings.
///
/// Each polygon is split into the arcs between consecutive crossings; an arc
/// starting at a crossing with positive orientation has water on its left,
/// otherwise land, and keeps the polygon's right state. Coastlines are cut
/// into the parts that lie inside a polygon. Islands without crossings are
/// kept when they lie at least partly inside a polygon. Remaining undefined
/// states are resolved afterwards.
pub fn synthesize_coastlines(
    progress: &mut dyn Progress,
    coastlines: Vec<Coast>,
    bounding_polygons: &[Coast],
) -> Vec<Coast> {
    progress.set_action("Synthesize coastlines");

    let coastline_coords: Vec<Vec<GeoCoord>> = coastlines.iter().map(coords_of).collect();
    let polygon_coords: Vec<Vec<GeoCoord>> = bounding_polygons.iter().map(coords_of).collect();

    let mut synthesized = Vec::new();
    let mut way_intersections: Vec<Vec<PathIntersection>> = vec![Vec::new(); coastlines.len()];

    for (polygon, poly_coords) in bounding_polygons.iter().zip(&polygon_coords) {
        let candidate = Coast {
            is_area: true,
            ..polygon.clone()
        };
        let mut candidate_intersections = Vec::new();

        for (coastline, (coords, way)) in coastlines
            .iter()
            .zip(coastline_coords.iter().zip(way_intersections.iter_mut()))
        {
            let valid: Vec<_> = find_path_intersections(poly_coords, coords, true, coastline.is_area)
                .into_iter()
                .filter(|i| i.orientation != 0.0)
                .collect();

            if valid.len() % 2 != 0 {
                progress.warn(&format!(
                    "Odd count ({}) of valid intersections. Coastline {}",
                    valid.len(),
                    coastline.id
                ));
            }
            candidate_intersections.extend_from_slice(&valid);
            way.extend(valid);
        }

        if candidate_intersections.is_empty() {
            synthesized.push(candidate);
            continue;
        }
        if candidate_intersections.len() % 2 != 0 {
            progress.warn(&format!(
                "Odd count of intersections: {}",
                candidate_intersections.len()
            ));
            continue;
        }

        candidate_intersections.sort_by(|x, y| {
            x.a_index
                .cmp(&y.a_index)
                .then(x.a_dist_sq.total_cmp(&y.a_dist_sq))
        });

        let count = candidate_intersections.len();
        for index in 0..count {
            let from = &candidate_intersections[index];
            let to = &candidate_intersections[(index + 1) % count];
            let left = if from.orientation > 0.0 {
                CoastState::Water
            } else {
                CoastState::Land
            };
            let points = cut_part(&candidate, from, to, true);
            synthesized.push(synthesized_part(&candidate, points, left, candidate.right));
        }
    }

    for ((coastline, coords), mut intersections) in coastlines
        .iter()
        .zip(&coastline_coords)
        .zip(way_intersections)
    {
        if intersections.is_empty() {
            if coastline.is_area
                && polygon_coords
                    .iter()
                    .any(|poly| is_area_at_least_partly_in_area(coords, poly))
            {
                synthesized.push(coastline.clone());
            }
            continue;
        }
        if intersections.len() % 2 != 0 {
            progress.warn(&format!(
                "Odd count of intersections: {}",
                intersections.len()
            ));
            continue;
        }

        intersections.sort_by(|x, y| {
            x.b_index
                .cmp(&y.b_index)
                .then(x.b_dist_sq.total_cmp(&y.b_dist_sq))
        });

        let count = intersections.len();
        let limit = if coastline.is_area { count } else { count - 1 };
        for index in 0..limit {
            let from = &intersections[index];
            if from.orientation < 0.0 {
                continue;
            }
            let to = &intersections[(index + 1) % count];
            let points = cut_part(coastline, from, to, false);
            synthesized.push(synthesized_part(
                coastline,
                points,
                coastline.left,
                coastline.right,
            ));
        }
    }

    resolve_undefined_states(&mut synthesized);

    progress.info(&format!(
        "{} bounding polygon(s) and {} coastline(s) synthesized into {} coastline(s)",
        bounding_polygons.len(),
        coastlines.len(),
        synthesized.len()
    ));
    synthesized
}

fn resolve_undefined_states(coastlines: &mut [Coast]) {
    let coords: Vec<Vec<GeoCoord>> = coastlines.iter().map(coords_of).collect();

    for index in 0..coastlines.len() {
        if coastlines[index].right == CoastState::Undefined {
            coastlines[index].right = CoastState::Unknown;
        }

        if coastlines[index].left == CoastState::Undefined && coastlines[index].is_area {
            let encloses_water = coastlines.iter().zip(&coords).any(|(test, test_coords)| {
                test.right == CoastState::Water
                    && is_area_at_least_partly_in_area(test_coords, &coords[index])
            });
            if encloses_water {
                coastlines[index].left = CoastState::Water;
            }
        }

        if coastlines[index].left == CoastState::Undefined {
            coastlines[index].left = CoastState::Land;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(ids: &[u64]) -> Vec<CoastPoint> {
        ids.iter()
            .map(|&id| CoastPoint::new(id, GeoCoord::new(id as f64, id as f64)))
            .collect()
    }

    #[test]
    fn test_cut_path_forward_and_wrapping() {
        let src = points(&[1, 2, 3, 4]);

        let mut forward = Vec::new();
        cut_path(&mut forward, &src, 1, 3, 0.0, 0.0);
        assert_eq!(forward.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);

        let mut wrapped = Vec::new();
        cut_path(&mut wrapped, &src, 3, 5, 0.0, 0.0);
        assert_eq!(wrapped.iter().map(|p| p.id).collect::<Vec<_>>(), vec![4, 1]);

        // Same segment, but the end lies before the start on it.
        let mut around = Vec::new();
        cut_path(&mut around, &src, 2, 2, 2.0, 1.0);
        assert_eq!(around.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 4, 1, 2]);
    }

    #[test]
    fn test_merge_skips_synthetic_ids() {
        let a = Coast::from_points(
            1,
            vec![
                CoastPoint::new(5, GeoCoord::new(0.0, 0.0)),
                CoastPoint::synthetic(GeoCoord::new(1.0, 1.0)),
            ],
            CoastState::Land,
            CoastState::Water,
        );
        let b = Coast::from_points(
            2,
            vec![
                CoastPoint::synthetic(GeoCoord::new(1.0, 1.0)),
                CoastPoint::new(6, GeoCoord::new(2.0, 2.0)),
            ],
            CoastState::Land,
            CoastState::Water,
        );

        let merged = merge_coastlines(&mut crate::progress::SilentProgress, vec![a, b]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_undefined_right_becomes_unknown() {
        let mut coasts = vec![Coast::from_points(
            1,
            points(&[1, 2]),
            CoastState::Undefined,
            CoastState::Undefined,
        )];
        resolve_undefined_states(&mut coasts);
        assert_eq!(coasts[0].right, CoastState::Unknown);
        assert_eq!(coasts[0].left, CoastState::Land);
    }

    #[test]
    fn test_lake_around_water_becomes_water() {
        let outer = Coast::area_from_coords(
            1,
            &[
                GeoCoord::new(0.0, 0.0),
                GeoCoord::new(0.0, 10.0),
                GeoCoord::new(10.0, 10.0),
                GeoCoord::new(10.0, 0.0),
            ],
            CoastState::Undefined,
            CoastState::Unknown,
        );
        let inner = Coast::area_from_coords(
            2,
            &[
                GeoCoord::new(4.0, 4.0),
                GeoCoord::new(4.0, 6.0),
                GeoCoord::new(6.0, 6.0),
                GeoCoord::new(6.0, 4.0),
            ],
            CoastState::Land,
            CoastState::Water,
        );

        let mut coasts = vec![outer, inner];
        resolve_undefined_states(&mut coasts);
        assert_eq!(coasts[0].left, CoastState::Water);
    }
}
