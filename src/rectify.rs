//! Perspective rectification core
//!
//! This module implements the geometric pipeline that maps a user-selected
//! quadrilateral onto an axis-aligned rectangle: canonical corner ordering,
//! destination-rectangle sizing, homography estimation, and inverse-mapped
//! bilinear resampling.

use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest side of the rectified output after normalization
pub const OUTPUT_BOUND: u32 = 1000;

/// Errors from the geometric pipeline. None of these are fatal: the
/// selection is kept so the user can reset and re-select.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("expected exactly 4 points, got {0}")]
    PointCount(usize),

    #[error("selected quadrilateral collapses to a {width}x{height} output")]
    Degenerate { width: u32, height: u32 },

    #[error("selected points are collinear or coincident")]
    Singular,
}

/// A 2D point in display-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Four points in fixed cyclic order: top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalQuad {
    corners: [Point; 4],
}

impl CanonicalQuad {
    /// Corners in [TL, TR, BR, BL] order
    pub fn corners(&self) -> [Point; 4] {
        self.corners
    }
}

/// Reorder four raw click points into [top-left, top-right, bottom-right,
/// bottom-left].
///
/// The two points with smaller y are taken as the top edge and split by x;
/// the two with larger y as the bottom edge. Quads rotated beyond ~45
/// degrees are outside what this ordering can recover; collinear input is
/// caught by the dimension and homography checks downstream.
pub fn canonicalize(points: &[Point]) -> Result<CanonicalQuad, GeometryError> {
    if points.len() != 4 {
        return Err(GeometryError::PointCount(points.len()));
    }

    let mut sorted = [points[0], points[1], points[2], points[3]];
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let (upper, lower) = sorted.split_at(2);
    let (tl, tr) = if upper[0].x <= upper[1].x {
        (upper[0], upper[1])
    } else {
        (upper[1], upper[0])
    };
    let (bl, br) = if lower[0].x <= lower[1].x {
        (lower[0], lower[1])
    } else {
        (lower[1], lower[0])
    };

    Ok(CanonicalQuad {
        corners: [tl, tr, br, bl],
    })
}

/// Destination-rectangle size for a canonical quad.
///
/// Takes the longer of the two parallel edges on each axis so no source
/// content is lost to an undersized output.
pub fn target_dimensions(quad: &CanonicalQuad) -> Result<(u32, u32), GeometryError> {
    let [tl, tr, br, bl] = quad.corners();

    let width = tr.distance(&tl).max(br.distance(&bl)).floor() as u32;
    let height = br.distance(&tr).max(bl.distance(&tl)).floor() as u32;

    if width < 1 || height < 1 {
        return Err(GeometryError::Degenerate { width, height });
    }

    Ok((width, height))
}

/// Perspective transformation matrix (3x3 homography)
#[derive(Debug, Clone)]
pub struct PerspectiveTransform {
    /// The 3x3 matrix in row-major order, mapping quad to rectangle
    matrix: [f64; 9],
    /// Inverse matrix for backward mapping (used for warping)
    inverse: [f64; 9],
    /// Destination image dimensions
    dst_width: u32,
    dst_height: u32,
}

impl PerspectiveTransform {
    /// Compute the homography mapping the quad corners respectively to
    /// (0,0), (width,0), (width,height), (0,height).
    pub fn quad_to_rect(
        quad: &CanonicalQuad,
        width: u32,
        height: u32,
    ) -> Result<Self, GeometryError> {
        let src = quad.corners().map(|p| (p.x, p.y));
        let (w, h) = (f64::from(width), f64::from(height));
        let dst = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        // Solving the swapped correspondence gives the inverse directly.
        let matrix = compute_homography(src, dst)?;
        let inverse = compute_homography(dst, src)?;

        Ok(Self {
            matrix,
            inverse,
            dst_width: width,
            dst_height: height,
        })
    }

    /// Map a source-image point into the rectified rectangle
    #[inline]
    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        apply_homography(&self.matrix, x, y)
    }

    /// Map a rectified-rectangle point back into the source image
    #[inline]
    pub fn inverse_transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        apply_homography(&self.inverse, x, y)
    }

    /// Resample `src` through the inverse mapping into a raster of exactly
    /// the destination dimensions, using bilinear interpolation. The source
    /// raster is not mutated.
    pub fn warp(&self, src: &RgbaImage) -> RgbaImage {
        let (src_w, src_h) = src.dimensions();
        let stride = src_w as usize * 4;
        let data = src.as_raw();

        let mut out = RgbaImage::new(self.dst_width, self.dst_height);
        for dst_y in 0..self.dst_height {
            for dst_x in 0..self.dst_width {
                let (sx, sy) = self.inverse_transform_point(f64::from(dst_x), f64::from(dst_y));
                let pixel =
                    bilinear_sample(data, stride, src_w as usize, src_h as usize, sx, sy);
                out.put_pixel(dst_x, dst_y, Rgba(pixel));
            }
        }
        out
    }
}

/// Full rectification pipeline: canonical ordering, destination sizing,
/// homography estimation, warp, and bounded-fit normalization.
pub fn rectify(src: &RgbaImage, points: &[Point]) -> Result<RgbaImage, GeometryError> {
    let quad = canonicalize(points)?;
    let (width, height) = target_dimensions(&quad)?;
    let transform = PerspectiveTransform::quad_to_rect(&quad, width, height)?;
    let warped = transform.warp(src);
    Ok(fit_within(&warped, OUTPUT_BOUND))
}

/// Fit a raster within `bound` on its longer side, preserving aspect
/// ratio. Downscale only; smaller rasters pass through unchanged.
pub fn fit_within(img: &RgbaImage, bound: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w <= bound && h <= bound {
        return img.clone();
    }

    let scale = f64::from(bound) / f64::from(w.max(h));
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    imageops::resize(img, nw, nh, imageops::FilterType::Triangle)
}

/// Compute a 3x3 homography matrix from 4 point correspondences
/// using the Direct Linear Transform (DLT) algorithm.
///
/// For each correspondence (x,y) -> (x',y') there are two equations:
///   x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
///   x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
/// With h9 fixed to 1 this is an 8x8 linear system, exact for four
/// correspondences with no three points collinear.
fn compute_homography(
    src: [(f64, f64); 4],
    dst: [(f64, f64); 4],
) -> Result<[f64; 9], GeometryError> {
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let (x, y) = src[i];
        let (xp, yp) = dst[i];

        let row1 = i * 2;
        let row2 = i * 2 + 1;

        a[row1][0] = x;
        a[row1][1] = y;
        a[row1][2] = 1.0;
        a[row1][6] = -xp * x;
        a[row1][7] = -xp * y;
        b[row1] = xp;

        a[row2][3] = x;
        a[row2][4] = y;
        a[row2][5] = 1.0;
        a[row2][6] = -yp * x;
        a[row2][7] = -yp * y;
        b[row2] = yp;
    }

    let h = solve_linear_system(&mut a, &mut b)?;

    Ok([h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0])
}

/// Solve an 8x8 linear system using Gaussian elimination with partial
/// pivoting. A vanishing pivot means the correspondences are degenerate
/// (three collinear or coincident points).
fn solve_linear_system(
    a: &mut [[f64; 8]; 8],
    b: &mut [f64; 8],
) -> Result<[f64; 8], GeometryError> {
    let n = 8;

    // Forward elimination with partial pivoting
    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if pivot.abs() < 1e-10 {
            return Err(GeometryError::Singular);
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Ok(x)
}

/// Apply a homography matrix to a point
#[inline]
fn apply_homography(h: &[f64; 9], x: f64, y: f64) -> (f64, f64) {
    let w = h[6] * x + h[7] * y + h[8];
    if w.abs() < 1e-10 {
        return (x, y); // Avoid division by zero
    }
    let xp = (h[0] * x + h[1] * y + h[2]) / w;
    let yp = (h[3] * x + h[4] * y + h[5]) / w;
    (xp, yp)
}

/// Bilinear interpolation in an RGBA buffer, coordinates clamped to the
/// image borders.
#[inline]
fn bilinear_sample(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> [u8; 4] {
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut result = [0u8; 4];

    for c in 0..4 {
        let p00 = src.get(y0 * stride + x0 * 4 + c).copied().unwrap_or(0) as f64;
        let p10 = src.get(y0 * stride + x1 * 4 + c).copied().unwrap_or(0) as f64;
        let p01 = src.get(y1 * stride + x0 * 4 + c).copied().unwrap_or(0) as f64;
        let p11 = src.get(y1 * stride + x1 * 4 + c).copied().unwrap_or(0) as f64;

        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;

        result[c] = value.round().clamp(0.0, 255.0) as u8;
    }

    result
}
