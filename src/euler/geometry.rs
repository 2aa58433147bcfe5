//! Quadrilateral cell and face geometry.
//!
//! Cells are described by their 4 vertices in counter-clockwise order
//! `[(j,i), (j,i+1), (j+1,i+1), (j+1,i)]`.

use crate::global_variables::*;
use glam::DVec2;

pub fn center(vertices: &[DVec2; 4]) -> DVec2 {
    (vertices[0] + vertices[1] + vertices[2] + vertices[3]) * 0.25
}

pub fn signed_volume(vertices: &[DVec2; 4]) -> Float {
    0.5 * (vertices[0] - vertices[2]).perp_dot(vertices[1] - vertices[3])
}

pub fn volume(vertices: &[DVec2; 4]) -> Float {
    signed_volume(vertices).abs()
}

pub fn size(vertices: &[DVec2; 4]) -> Float {
    let dx = (vertices[1] - vertices[0] + vertices[2] - vertices[3]) * 0.5;
    let dy = (vertices[2] - vertices[1] + vertices[3] - vertices[0]) * 0.5;
    dx.length().min(dy.length())
}

pub fn area(side_vector: DVec2) -> Float {
    side_vector.length()
}

pub fn normal(side_vector: DVec2) -> DVec2 {
    DVec2::new(side_vector.y, -side_vector.x) / area(side_vector)
}
