use glam::Vec2;

use crate::obstacle::ObstacleQuery;

/// Two legs whose unit directions have a dot product at or above this are
/// treated as the same heading.
pub const SIMILARITY_THRESHOLD: f32 = 0.95;

/// Collapses a raw node path into a shorter polyline along the same route.
///
/// An interior point survives when the route turns there or when the last
/// kept point cannot see the point that follows it. The first and last points
/// are always kept. Passes repeat until nothing more can be removed, so the
/// result is a fixed point: simplifying it again returns it unchanged.
pub fn simplify<Q: ObstacleQuery + ?Sized>(raw: &[Vec2], obstacles: &Q) -> Vec<Vec2> {
    let mut current = simplify_pass(raw, obstacles);
    loop {
        let next = simplify_pass(&current, obstacles);
        // A pass only ever drops points, so equal length means equal content.
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}

fn simplify_pass<Q: ObstacleQuery + ?Sized>(points: &[Vec2], obstacles: &Q) -> Vec<Vec2> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut kept = Vec::with_capacity(points.len());
    let mut last = points[0];
    kept.push(last);

    for i in 1..points.len() - 1 {
        let (current, following) = (points[i], points[i + 1]);
        let incoming = (current - last).normalize_or_zero();
        let outgoing = (following - current).normalize_or_zero();
        let turns = incoming != Vec2::ZERO
            && outgoing != Vec2::ZERO
            && incoming.dot(outgoing) < SIMILARITY_THRESHOLD;

        if turns || !obstacles.is_clear_line(last, following) {
            kept.push(current);
            last = current;
        }
    }

    kept.push(points[points.len() - 1]);
    kept
}
