// Piecewise-linear scoring curves.
//
// A fitness function maps an integer feature (a pitch, a duration in slots,
// an interval in semitones, ...) to a score. It is defined by vertices kept
// sorted by x; for equal x the higher y comes first, which lets a curve jump
// at a point. Outside the vertex domain the curve is zero.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: i32,
    pub y: f32,
}

fn vertex_order(a: &Vertex, b: &Vertex) -> Ordering {
    a.x.cmp(&b.x)
        .then_with(|| b.y.partial_cmp(&a.y).unwrap_or(Ordering::Equal))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PiecewiseLinear {
    name: String,
    vertices: Vec<Vertex>,
}

impl PiecewiseLinear {
    pub fn new(name: impl Into<String>) -> Self {
        PiecewiseLinear {
            name: name.into(),
            vertices: Vec::new(),
        }
    }

    pub fn from_vertices(
        name: impl Into<String>,
        vertices: impl IntoIterator<Item = (i32, f32)>,
    ) -> Self {
        let mut function = Self::new(name);
        for (x, y) in vertices {
            function.add_vertex(x, y);
        }
        function
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn add_vertex(&mut self, x: i32, y: f32) {
        let vertex = Vertex { x, y };
        let at = self
            .vertices
            .partition_point(|v| vertex_order(v, &vertex) != Ordering::Greater);
        self.vertices.insert(at, vertex);
    }

    /// Remove the first vertex at exactly `(x, y)`.
    pub fn remove_vertex(&mut self, x: i32, y: f32) -> bool {
        match self.vertices.iter().position(|v| v.x == x && v.y == y) {
            Some(i) => {
                self.vertices.remove(i);
                true
            }
            None => false,
        }
    }

    /// Move every vertex at `old_x` horizontally to `new_x`.
    pub fn move_vertex_x(&mut self, old_x: i32, new_x: i32) -> bool {
        let mut moved = false;
        for v in self.vertices.iter_mut().filter(|v| v.x == old_x) {
            v.x = new_x;
            moved = true;
        }
        if moved {
            self.sort();
        }
        moved
    }

    /// Move the vertex at `(x, old_y)` vertically to `new_y`.
    pub fn move_vertex_y(&mut self, x: i32, old_y: f32, new_y: f32) -> bool {
        match self.vertices.iter_mut().find(|v| v.x == x && v.y == old_y) {
            Some(v) => {
                v.y = new_y;
                self.sort();
                true
            }
            None => false,
        }
    }

    /// Restore vertex order, e.g. after deserializing hand-edited data.
    pub fn sort(&mut self) {
        self.vertices.sort_by(vertex_order);
    }

    pub fn evaluate(&self, x: i32) -> f32 {
        let (Some(first), Some(last)) = (self.vertices.first(), self.vertices.last()) else {
            return 0.0;
        };
        if x < first.x || x > last.x {
            return 0.0;
        }
        for (i, v) in self.vertices.iter().enumerate() {
            if v.x == x {
                return v.y;
            }
            if v.x > x {
                let prev = self.vertices[i - 1];
                let t = (x - prev.x) as f32 / (v.x - prev.x) as f32;
                return prev.y + t * (v.y - prev.y);
            }
        }
        0.0
    }
}
