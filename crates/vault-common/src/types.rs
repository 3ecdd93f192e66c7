// types.rs — shared math types and save-format sentinels

pub type Vec3 = [f32; 3];
pub type Quaternion = [f32; 4];

/// Packed RGBA color, one byte per channel.
pub type Color32 = [u8; 4];

/// Row-major 3x4 transform; translation lives in column 3.
pub type Matrix3x4 = [[f32; 4]; 3];

/// Full 4x4 matrix; translation lives in column 3 of rows 0..3.
pub type VMatrix = [[f32; 4]; 4];

/// Index of an entity slot in the live entity list. Negative means "none".
pub type EntityIndex = i32;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Interval {
    pub start: f32,
    pub range: f32,
}

/// On-disk stand-in for a time field whose in-memory value is exactly zero.
/// Distinguishes "explicitly zero" from "omitted because default" once the
/// base-time delta has been applied. Half of f32::MAX, never a real time.
pub const ZERO_TIME: f32 = 1.701_411_7e38;

/// Tick value meaning "never think again".
pub const TICK_NEVER_THINK: i32 = -1;

/// On-disk encoding of TICK_NEVER_THINK; outside any reachable tick delta.
pub const TICK_NEVER_THINK_ENCODE: i32 = i32::MAX - 3;

pub fn vec3_add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn vec3_sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn vec3_is_zero(v: Vec3) -> bool {
    v[0] == 0.0 && v[1] == 0.0 && v[2] == 0.0
}
