//! Type 2 (axial) and Type 3 (radial) shading renderers (§4.J), grounded on
//! `original_source/libs/render/src/shading.c`. The source's Type 3 body is
//! the reference for both: it drives a per-sample loop over a bounding box,
//! solves for a parametric `t`, evaluates the shading function(s), and maps
//! through the color space. Type 2's renderer body is absent from the
//! source — §9 invites adding it "by analogy to Type 3 with the linear
//! parametrisation `t = ((P-p0)·(p1-p0))/|p1-p0|²`", which is what
//! [`AxialShading`] below does.

use std::rc::Rc;

use crate::color::{map_color, ColorSpace};
use crate::config::EngineConfig;
use crate::error::{Error, Result, SchemaError};
use crate::function::{deserialize_function, PdfFunction};
use crate::matrix::Mat3;
use crate::object::PdfObject;
use crate::resolver::Resolver;
use crate::schema::Fields;

/// Either one function whose output is the full set of color components, or
/// `n` scalar functions whose outputs are concatenated in order (PDF
/// 32000-1 §7.10.5's "Functions" entry allows both shapes).
pub enum ShadingFunctions {
    Single(Rc<dyn PdfFunction>),
    PerComponent(Vec<Rc<dyn PdfFunction>>),
}

impl ShadingFunctions {
    fn eval(&self, t: f64) -> Result<Vec<f64>> {
        match self {
            ShadingFunctions::Single(f) => f.eval(&[t]),
            ShadingFunctions::PerComponent(fs) => {
                let mut out = Vec::with_capacity(fs.len());
                for f in fs {
                    out.extend(f.eval(&[t])?);
                }
                Ok(out)
            }
        }
    }
}

fn deserialize_shading_functions<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<ShadingFunctions> {
    let resolved = resolver.resolve(object)?;
    match resolved {
        PdfObject::Array(items) => {
            let mut functions = Vec::with_capacity(items.len());
            for &item in items.iter() {
                let item = resolver.resolve(item)?;
                functions.push(deserialize_function(resolver, item, config)?);
            }
            Ok(ShadingFunctions::PerComponent(functions))
        }
        other => Ok(ShadingFunctions::Single(deserialize_function(
            resolver, other, config,
        )?)),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AxialShading {
    pub p0: (f64, f64),
    pub p1: (f64, f64),
    pub domain: (f64, f64),
    pub extend: (bool, bool),
}

impl AxialShading {
    /// Linear parametrisation per §9's given formula: the projection of `p`
    /// onto the `p0`->`p1` axis, as a fraction of `|p1-p0|²`.
    fn solve_t(&self, p: (f64, f64)) -> Option<f64> {
        let dx = self.p1.0 - self.p0.0;
        let dy = self.p1.1 - self.p0.1;
        let len_sq = dx * dx + dy * dy;
        if len_sq < 1e-12 {
            return None;
        }
        let vx = p.0 - self.p0.0;
        let vy = p.1 - self.p0.1;
        let t = (vx * dx + vy * dy) / len_sq;

        if t < 0.0 {
            if self.extend.0 {
                Some(0.0)
            } else {
                None
            }
        } else if t > 1.0 {
            if self.extend.1 {
                Some(1.0)
            } else {
                None
            }
        } else {
            Some(t)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RadialShading {
    pub p0: (f64, f64),
    pub r0: f64,
    pub p1: (f64, f64),
    pub r1: f64,
    pub domain: (f64, f64),
    pub extend: (bool, bool),
}

impl RadialShading {
    /// Solves the circle-envelope equation `|P-((1-t)p0+t·p1)|² =
    /// ((1-t)r0+t·r1)²` for `t`, per §4.J step 3: the largest root in
    /// `[0, 1]` wins (frontmost surface); failing that, the extension rules
    /// pick the nearest out-of-range root if its side is extended.
    fn solve_t(&self, p: (f64, f64)) -> Option<f64> {
        let dcx = self.p1.0 - self.p0.0;
        let dcy = self.p1.1 - self.p0.1;
        let dr = self.r1 - self.r0;

        let px = p.0 - self.p0.0;
        let py = p.1 - self.p0.1;

        let a = dcx * dcx + dcy * dcy - dr * dr;
        let b = 2.0 * (px * dcx + py * dcy + self.r0 * dr);
        let c = px * px + py * py - self.r0 * self.r0;

        let mut roots: Vec<f64> = Vec::new();
        if a.abs() < 1e-12 {
            if b.abs() > 1e-12 {
                roots.push(c / b);
            }
        } else {
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let sqrt_disc = disc.sqrt();
                roots.push((-b + sqrt_disc) / (2.0 * a));
                roots.push((-b - sqrt_disc) / (2.0 * a));
            }
        }

        // A root is only valid if its interpolated radius is non-negative.
        let valid_radius = |t: f64| self.r0 + t * dr >= 0.0;
        roots.retain(|&t| valid_radius(t));
        if roots.is_empty() {
            return None;
        }

        // Inside the end circle at t=1: that surface always wins.
        let end_dx = p.0 - self.p1.0;
        let end_dy = p.1 - self.p1.1;
        if (end_dx * end_dx + end_dy * end_dy) <= self.r1 * self.r1 {
            return Some(1.0);
        }

        let in_range: Vec<f64> = roots.iter().copied().filter(|&t| (0.0..=1.0).contains(&t)).collect();
        if let Some(&largest) = in_range.iter().max_by(|a, b| a.partial_cmp(b).unwrap()) {
            return Some(largest);
        }

        if self.extend.0 {
            if let Some(&closest) = roots
                .iter()
                .filter(|&&t| t < 0.0)
                .max_by(|a, b| a.partial_cmp(b).unwrap())
            {
                return Some(closest.max(0.0));
            }
        }
        if self.extend.1 {
            if let Some(&closest) = roots
                .iter()
                .filter(|&&t| t > 1.0)
                .min_by(|a, b| a.partial_cmp(b).unwrap())
            {
                return Some(closest.min(1.0));
            }
        }

        None
    }
}

pub enum Shading {
    Axial(AxialShading),
    Radial(RadialShading),
}

/// The three pieces [`deserialize_shading`] produces, bundled so a resource
/// dictionary can cache one value per `/Shading` name and the content-stream
/// interpreter's `sh` operator (§4.I) can hand all three to
/// [`render_shading`] in one lookup.
pub struct ShadingResource {
    pub shading: Shading,
    pub functions: ShadingFunctions,
    pub space: ColorSpace,
}

/// Evaluates a shading over every sample in `bbox` (device-space, already
/// intersected/unioned per §4.J step 1), transforming each sample back
/// through `ctm_inverse` into shading space, solving for `t`, evaluating
/// `functions`, mapping through `space`, and writing an opaque pixel via
/// `write_pixel`. `step` is the caller's raster grid spacing
/// ([`crate::canvas::Canvas::raster_resolution`]).
pub fn render_shading(
    shading: &Shading,
    functions: &ShadingFunctions,
    space: &ColorSpace,
    ctm: Mat3,
    bbox: (f64, f64, f64, f64),
    step: f64,
    mut write_pixel: impl FnMut(f64, f64, [f64; 3]),
) -> Result<()> {
    let ctm_inv = ctm.inverse().ok_or(Error::Schema(SchemaError::IncorrectType))?;
    let (x0, y0, x1, y1) = bbox;
    let step = step.max(1e-6);

    let mut y = y0;
    while y <= y1 {
        let mut x = x0;
        while x <= x1 {
            let (sx, sy) = ctm_inv.apply(x, y);
            let t = match shading {
                Shading::Axial(a) => a.solve_t((sx, sy)),
                Shading::Radial(r) => r.solve_t((sx, sy)),
            };
            if let Some(t) = t {
                let (domain_lo, domain_hi) = match shading {
                    Shading::Axial(a) => a.domain,
                    Shading::Radial(r) => r.domain,
                };
                let mapped_t = domain_lo + t * (domain_hi - domain_lo);
                let components = functions.eval(mapped_t)?;
                let rgb = map_color(&components, space)?;
                write_pixel(x, y, rgb);
            }
            x += step;
        }
        y += step;
    }

    Ok(())
}

fn as_point(object: Option<f64>, other: Option<f64>) -> Option<(f64, f64)> {
    Some((object?, other?))
}

fn deserialize_bool_pair(object: PdfObject) -> Option<(bool, bool)> {
    let items = object.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some((items[0].as_bool()?, items[1].as_bool()?))
}

/// Parses a `/ShadingType 2` or `/ShadingType 3` dictionary into a
/// [`Shading`] plus its function(s) and color space, ready for
/// [`render_shading`].
pub fn deserialize_shading<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<(Shading, ShadingFunctions, ColorSpace)> {
    let mut fields = Fields::new(resolver, object)?;
    let shading_type = fields.scalar(b"ShadingType", |o| o.as_integer())?;
    let color_space_obj = fields.resolvable(b"ColorSpace")?;
    let space = crate::color::deserialize_color_space(resolver, color_space_obj, config)?;
    let extend = fields.scalar_or(b"Extend", (false, false), deserialize_bool_pair)?;
    let function_obj = fields.resolvable(b"Function")?;
    let functions = deserialize_shading_functions(resolver, function_obj, config)?;

    match shading_type {
        2 => {
            let domain = fields.scalar_or(b"Domain", (0.0, 1.0), |o| {
                let items = o.as_array()?;
                if items.len() != 2 {
                    return None;
                }
                as_point(items[0].as_number(), items[1].as_number())
            })?;
            let coords = fields.scalar(b"Coords", |o| {
                let items = o.as_array()?;
                if items.len() != 4 {
                    return None;
                }
                Some((
                    items[0].as_number()?,
                    items[1].as_number()?,
                    items[2].as_number()?,
                    items[3].as_number()?,
                ))
            })?;
            fields.ignored(b"BBox");
            fields.ignored(b"Background");
            fields.ignored(b"AntiAlias");
            fields.finish(config)?;
            Ok((
                Shading::Axial(AxialShading {
                    p0: (coords.0, coords.1),
                    p1: (coords.2, coords.3),
                    domain,
                    extend,
                }),
                functions,
                space,
            ))
        }
        3 => {
            let domain = fields.scalar_or(b"Domain", (0.0, 1.0), |o| {
                let items = o.as_array()?;
                if items.len() != 2 {
                    return None;
                }
                as_point(items[0].as_number(), items[1].as_number())
            })?;
            let coords = fields.scalar(b"Coords", |o| {
                let items = o.as_array()?;
                if items.len() != 6 {
                    return None;
                }
                Some((
                    items[0].as_number()?,
                    items[1].as_number()?,
                    items[2].as_number()?,
                    items[3].as_number()?,
                    items[4].as_number()?,
                    items[5].as_number()?,
                ))
            })?;
            fields.ignored(b"BBox");
            fields.ignored(b"Background");
            fields.ignored(b"AntiAlias");
            fields.finish(config)?;
            Ok((
                Shading::Radial(RadialShading {
                    p0: (coords.0, coords.1),
                    r0: coords.2,
                    p1: (coords.3, coords.4),
                    r1: coords.5,
                    domain,
                    extend,
                }),
                functions,
                space,
            ))
        }
        _ => Err(Error::Schema(SchemaError::InvalidSubtype)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axial_solve_t_interpolates_along_axis() {
        let shading = AxialShading {
            p0: (0.0, 0.0),
            p1: (10.0, 0.0),
            domain: (0.0, 1.0),
            extend: (false, false),
        };
        assert!((shading.solve_t((5.0, 0.0)).unwrap() - 0.5).abs() < 1e-9);
        assert!(shading.solve_t((-1.0, 0.0)).is_none());
    }

    #[test]
    fn axial_extend_clamps_out_of_range_samples() {
        let shading = AxialShading {
            p0: (0.0, 0.0),
            p1: (10.0, 0.0),
            domain: (0.0, 1.0),
            extend: (true, true),
        };
        assert_eq!(shading.solve_t((-5.0, 0.0)), Some(0.0));
        assert_eq!(shading.solve_t((15.0, 0.0)), Some(1.0));
    }

    #[test]
    fn radial_solve_t_picks_frontmost_root_between_concentric_circles() {
        let shading = RadialShading {
            p0: (0.0, 0.0),
            r0: 0.0,
            p1: (0.0, 0.0),
            r1: 10.0,
            domain: (0.0, 1.0),
            extend: (false, false),
        };
        // A point 5 units from the common center lies on the r=5 envelope
        // at t=0.5, since the circle grows linearly from r0=0 to r1=10.
        let t = shading.solve_t((5.0, 0.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-9);
    }

    #[test]
    fn radial_inside_end_circle_returns_one() {
        let shading = RadialShading {
            p0: (0.0, 0.0),
            r0: 1.0,
            p1: (20.0, 0.0),
            r1: 5.0,
            domain: (0.0, 1.0),
            extend: (false, false),
        };
        assert_eq!(shading.solve_t((20.0, 0.0)), Some(1.0));
    }

    #[test]
    fn radial_no_root_outside_unextended_circles_is_unshaded() {
        let shading = RadialShading {
            p0: (0.0, 0.0),
            r0: 1.0,
            p1: (100.0, 0.0),
            r1: 1.0,
            domain: (0.0, 1.0),
            extend: (false, false),
        };
        assert!(shading.solve_t((50.0, 50.0)).is_none());
    }

    struct IdentityGray;

    impl PdfFunction for IdentityGray {
        fn eval(&self, input: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![input[0]])
        }
    }

    #[test]
    fn render_shading_writes_pixels_across_the_bbox() {
        let shading = Shading::Axial(AxialShading {
            p0: (0.0, 0.0),
            p1: (10.0, 0.0),
            domain: (0.0, 1.0),
            extend: (true, true),
        });
        let functions = ShadingFunctions::Single(Rc::new(IdentityGray));
        let space = ColorSpace::DeviceGray;
        let mut count = 0;
        let result = render_shading(
            &shading,
            &functions,
            &space,
            Mat3::IDENTITY,
            (0.0, 0.0, 10.0, 10.0),
            5.0,
            |_, _, _| count += 1,
        );
        assert!(result.is_ok());
        assert!(count > 0);
    }
}
