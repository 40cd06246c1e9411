use glam::Vec2;

/// Read-only view of the wall layer supplied by the host physics world.
///
/// Every query is synchronous and free of side effects; the core may call them
/// any number of times per tick.
pub trait ObstacleQuery {
    /// Returns `true` if a circle of `radius` centred at `point` overlaps a wall.
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool;

    /// Returns `true` if no wall intersects the segment `from -> to`.
    fn is_clear_line(&self, from: Vec2, to: Vec2) -> bool;

    /// Casts a ray and returns the distance to the first wall hit within
    /// `max_distance`, or `None` if nothing is hit.
    fn raycast_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32>;
}

impl<T: ObstacleQuery + ?Sized> ObstacleQuery for &T {
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool {
        (**self).is_blocked(point, radius)
    }

    fn is_clear_line(&self, from: Vec2, to: Vec2) -> bool {
        (**self).is_clear_line(from, to)
    }

    fn raycast_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32> {
        (**self).raycast_distance(origin, direction, max_distance)
    }
}

impl<T: ObstacleQuery + ?Sized> ObstacleQuery for Box<T> {
    fn is_blocked(&self, point: Vec2, radius: f32) -> bool {
        (**self).is_blocked(point, radius)
    }

    fn is_clear_line(&self, from: Vec2, to: Vec2) -> bool {
        (**self).is_clear_line(from, to)
    }

    fn raycast_distance(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<f32> {
        (**self).raycast_distance(origin, direction, max_distance)
    }
}

/// Distance from `point` to the segment `a -> b`.
pub fn segment_distance(a: Vec2, b: Vec2, point: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return a.distance(point);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t).distance(point)
}
