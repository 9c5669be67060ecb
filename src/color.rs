//! Color-space dispatch and conversion (§4.J), grounded on
//! `original_source/libs/pdf/src/color_space.c` (`pdf_deserde_color_space`,
//! `pdf_map_color`, `cie_xyz_to_srgb`, `linear_srgb_to_nonlinear`) and
//! `original_source/libs/color/src/{conversion,cie}.c` for the wider CIE
//! background. `color_space.c`'s `pdf_map_color` is the function that
//! actually runs per pixel, so its (more rounded) XYZ->linear-sRGB matrix
//! is the one used here rather than `conversion.c`'s higher-precision one.
//!
//! **CalRGB default gamma.** The source defaults an absent `/Gamma` to
//! `(0,0,0)`, which through `pow(x, 0) == 1` discards every input
//! component — almost certainly a latent defect, since PDF 32000-1 defines
//! the default as `[1 1 1]` and spec.md's own text states that default
//! explicitly. This module follows spec.md's stated default rather than
//! reproducing the source's behavior (recorded in DESIGN.md).

use std::rc::Rc;

use crate::config::EngineConfig;
use crate::error::{Error, Result, SchemaError};
use crate::function::{deserialize_function, PdfFunction};
use crate::object::PdfObject;
use crate::resolver::Resolver;
use crate::schema::Fields;

#[derive(Debug, Clone, Copy)]
pub struct CalRgbParams {
    pub whitepoint: [f64; 3],
    pub blackpoint: [f64; 3],
    pub gamma: [f64; 3],
    /// `matrix[component][axis]`, matching the source's `mat.mat[i][j]`
    /// indexing (`mat[0][0]`/`mat[1][0]`/`mat[2][0]` feed the X axis, etc).
    pub matrix: [[f64; 3]; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct CalGrayParams {
    pub whitepoint: [f64; 3],
    pub blackpoint: [f64; 3],
    pub gamma: f64,
}

#[derive(Clone)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    CalGray(CalGrayParams),
    CalRGB(CalRgbParams),
    Lab,
    /// Parsed but not profile-evaluated; `/N` drives the fallback mapping
    /// in [`map_color`] (§9 "ICC 65535 divisor" open question — full ICC
    /// LUT evaluation is out of scope here, same as the source's own
    /// `LOG_WARN(PDF, "TODO: ICC Color spaces")`).
    IccBased { n_components: u32 },
    Indexed {
        base: Rc<ColorSpace>,
        hival: i32,
        lookup: Vec<u8>,
    },
    Pattern,
    Separation {
        alternate: Rc<ColorSpace>,
        tint_transform: Rc<dyn PdfFunction>,
    },
    /// Single-tint per spec.md §4.J: `map_color` dispatches on `colorant`
    /// (the first name in `/Names`) rather than running `tint_transform`
    /// through `alternate` — those two are kept only because they are part
    /// of a `/DeviceN` array's grammar and a well-formed color-space
    /// dictionary must still deserialize them.
    DeviceN {
        colorant: Vec<u8>,
        alternate: Rc<ColorSpace>,
        tint_transform: Rc<dyn PdfFunction>,
    },
}

impl ColorSpace {
    pub fn n_components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::CalGray(_) => 1,
            ColorSpace::DeviceRGB | ColorSpace::CalRGB(_) | ColorSpace::Lab => 3,
            ColorSpace::DeviceCMYK => 4,
            ColorSpace::IccBased { n_components } => *n_components as usize,
            ColorSpace::Indexed { .. } => 1,
            ColorSpace::Pattern => 0,
            ColorSpace::Separation { .. } => 1,
            ColorSpace::DeviceN { .. } => 1,
        }
    }
}

fn linear_srgb_to_nonlinear(linear: [f64; 3], whitepoint: [f64; 3], blackpoint: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for i in 0..3 {
        let x = linear[i];
        let non_linear = if x <= 0.00304 {
            x * 12.92
        } else {
            1.055 * x.powf(1.0 / 2.4) - 0.055
        };
        out[i] = (whitepoint[i] - blackpoint[i]) * non_linear + blackpoint[i];
    }
    out
}

fn cie_xyz_to_srgb(xyz: [f64; 3], whitepoint: [f64; 3], blackpoint: [f64; 3]) -> [f64; 3] {
    let m = [
        [3.2410, -1.5374, -0.4986],
        [-0.9692, 1.8760, 0.0416],
        [0.0556, -0.2040, 1.0570],
    ];
    let mut linear = [0.0; 3];
    for (i, row) in m.iter().enumerate() {
        linear[i] = row[0] * xyz[0] + row[1] * xyz[1] + row[2] * xyz[2];
    }
    linear_srgb_to_nonlinear(linear, whitepoint, blackpoint)
}

/// Used when a family has no full conversion here (Lab, unresolved ICC,
/// Pattern): >=3 components pass through as RGB, a single component is
/// gray, otherwise black. Mirrors the shading renderer's own default
/// fallback for color families it doesn't fully model (§4.J).
fn default_component_fallback(components: &[f64]) -> [f64; 3] {
    match components.len() {
        0 => [0.0, 0.0, 0.0],
        1 => [components[0], components[0], components[0]],
        2 => [components[0], components[1], 0.0],
        _ => [components[0], components[1], components[2]],
    }
}

/// `/DeviceN`'s single-tint rule (§4.J): a Cyan/Magenta/Yellow/Black
/// colorant maps as the corresponding CMYK channel with the other three
/// zero; any other colorant name falls back to gray `(1-tint)`.
fn device_n_colorant_color(colorant: &[u8], tint: f64) -> [f64; 3] {
    let cmyk = match colorant {
        b"Cyan" => Some([tint, 0.0, 0.0, 0.0]),
        b"Magenta" => Some([0.0, tint, 0.0, 0.0]),
        b"Yellow" => Some([0.0, 0.0, tint, 0.0]),
        b"Black" => Some([0.0, 0.0, 0.0, tint]),
        _ => None,
    };
    match cmyk {
        Some(c) => map_color(&c, &ColorSpace::DeviceCMYK).unwrap_or([0.0, 0.0, 0.0]),
        None => {
            let g = 1.0 - tint;
            [g, g, g]
        }
    }
}

/// Maps `components` (already normalized to each space's domain) to sRGB.
pub fn map_color(components: &[f64], space: &ColorSpace) -> Result<[f64; 3]> {
    match space {
        ColorSpace::DeviceGray => Ok([components[0], components[0], components[0]]),
        ColorSpace::DeviceRGB => Ok([components[0], components[1], components[2]]),
        ColorSpace::DeviceCMYK => {
            let (c, m, y, k) = (components[0], components[1], components[2], components[3]);
            let linear = [(1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)];
            Ok(linear_srgb_to_nonlinear(linear, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]))
        }
        ColorSpace::CalGray(params) => {
            let a = components[0].powf(params.gamma);
            let xyz = [
                params.whitepoint[0] * a,
                params.whitepoint[1] * a,
                params.whitepoint[2] * a,
            ];
            Ok(cie_xyz_to_srgb(xyz, params.whitepoint, params.blackpoint))
        }
        ColorSpace::CalRGB(params) => {
            let powered = [
                components[0].powf(params.gamma[0]),
                components[1].powf(params.gamma[1]),
                components[2].powf(params.gamma[2]),
            ];
            let mut xyz = [0.0; 3];
            for axis in 0..3 {
                xyz[axis] = params.matrix[0][axis] * powered[0]
                    + params.matrix[1][axis] * powered[1]
                    + params.matrix[2][axis] * powered[2];
            }
            Ok(cie_xyz_to_srgb(xyz, params.whitepoint, params.blackpoint))
        }
        ColorSpace::Indexed { base, lookup, .. } => {
            let n = base.n_components();
            let index = components[0].round().max(0.0) as usize;
            let start = index * n;
            if start + n > lookup.len() {
                return Ok([0.0, 0.0, 0.0]);
            }
            let base_components: Vec<f64> =
                lookup[start..start + n].iter().map(|&b| b as f64 / 255.0).collect();
            map_color(&base_components, base)
        }
        ColorSpace::Separation { alternate, tint_transform } => {
            let mapped = tint_transform.eval(components)?;
            map_color(&mapped, alternate)
        }
        ColorSpace::DeviceN { colorant, .. } => {
            let tint = components.first().copied().unwrap_or(0.0);
            Ok(device_n_colorant_color(colorant, tint))
        }
        ColorSpace::Lab | ColorSpace::IccBased { .. } | ColorSpace::Pattern => {
            Ok(default_component_fallback(components))
        }
    }
}

fn as_vec3(object: PdfObject) -> Option<[f64; 3]> {
    let items = object.as_array()?;
    if items.len() != 3 {
        return None;
    }
    Some([items[0].as_number()?, items[1].as_number()?, items[2].as_number()?])
}

fn as_mat3(object: PdfObject) -> Option<[[f64; 3]; 3]> {
    let items = object.as_array()?;
    if items.len() != 9 {
        return None;
    }
    let mut values = [0.0; 9];
    for (slot, &item) in values.iter_mut().zip(items.iter()) {
        *slot = item.as_number()?;
    }
    Some([
        [values[0], values[1], values[2]],
        [values[3], values[4], values[5]],
        [values[6], values[7], values[8]],
    ])
}

const IDENTITY_MAT3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn deserialize_cal_rgb_params<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<CalRgbParams> {
    let mut fields = Fields::new(resolver, object)?;
    let whitepoint = fields.fixed_array(b"WhitePoint", |o| o.as_number())?;
    let blackpoint = fields.fixed_array_or(b"BlackPoint", [0.0; 3], |o| o.as_number())?;
    // spec.md's stated default (see module doc comment); the source uses
    // (0,0,0), which would zero out every component via pow(x, 0).
    let gamma = fields.scalar_or(b"Gamma", [1.0, 1.0, 1.0], as_vec3)?;
    let matrix = fields.scalar_or(b"Matrix", IDENTITY_MAT3, as_mat3)?;
    fields.finish(config)?;
    Ok(CalRgbParams { whitepoint, blackpoint, gamma, matrix })
}

fn deserialize_cal_gray_params<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<CalGrayParams> {
    let mut fields = Fields::new(resolver, object)?;
    let whitepoint = fields.fixed_array(b"WhitePoint", |o| o.as_number())?;
    let blackpoint = fields.fixed_array_or(b"BlackPoint", [0.0; 3], |o| o.as_number())?;
    let gamma = fields.scalar_or(b"Gamma", 1.0, |o| o.as_number())?;
    fields.finish(config)?;
    Ok(CalGrayParams { whitepoint, blackpoint, gamma })
}

/// Resolves `object` as a color-space spec: either a bare family name
/// (`/DeviceRGB`) or `[/Family params...]`.
pub fn deserialize_color_space<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<ColorSpace> {
    let resolved = resolver.resolve(object)?;

    let (family, array) = match resolved {
        PdfObject::Name(name) => (name, None),
        PdfObject::Array(items) => {
            let first = items
                .first()
                .copied()
                .ok_or(Error::Schema(SchemaError::IncorrectType))?;
            let first = resolver.resolve(first)?;
            let name = first
                .as_name()
                .ok_or(Error::Schema(SchemaError::IncorrectType))?;
            (name, Some(items))
        }
        _ => return Err(Error::Schema(SchemaError::IncorrectType)),
    };

    match family {
        b"DeviceGray" => Ok(ColorSpace::DeviceGray),
        b"DeviceRGB" => Ok(ColorSpace::DeviceRGB),
        b"DeviceCMYK" => Ok(ColorSpace::DeviceCMYK),
        b"CalGray" => {
            let params_obj = array
                .and_then(|items| items.get(1).copied())
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let params_obj = resolver.resolve(params_obj)?;
            Ok(ColorSpace::CalGray(deserialize_cal_gray_params(
                resolver, params_obj, config,
            )?))
        }
        b"CalRGB" => {
            let params_obj = array
                .and_then(|items| items.get(1).copied())
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let params_obj = resolver.resolve(params_obj)?;
            Ok(ColorSpace::CalRGB(deserialize_cal_rgb_params(
                resolver, params_obj, config,
            )?))
        }
        b"Lab" => Ok(ColorSpace::Lab),
        b"ICCBased" => {
            let stream_obj = array
                .and_then(|items| items.get(1).copied())
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let stream_obj = resolver.resolve(stream_obj)?;
            let mut fields = Fields::new(resolver, stream_obj)?;
            let n_components = fields.scalar(b"N", |o| o.as_integer())? as u32;
            fields.unimplemented(b"Alternate");
            fields.ignored(b"Range");
            fields.ignored(b"Filter");
            fields.ignored(b"Length");
            fields.finish(config)?;
            Ok(ColorSpace::IccBased { n_components })
        }
        b"Indexed" => {
            let items = array.ok_or(Error::Schema(SchemaError::IncorrectType))?;
            let base_obj = items
                .get(1)
                .copied()
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let base = Rc::new(deserialize_color_space(resolver, base_obj, config)?);

            let hival_obj = resolver.resolve(
                items
                    .get(2)
                    .copied()
                    .ok_or(Error::Schema(SchemaError::MissingDictKey))?,
            )?;
            let hival = hival_obj
                .as_integer()
                .ok_or(Error::Schema(SchemaError::IncorrectType))?;

            let lookup_obj = resolver.resolve(
                items
                    .get(3)
                    .copied()
                    .ok_or(Error::Schema(SchemaError::MissingDictKey))?,
            )?;
            let lookup = match lookup_obj {
                PdfObject::String(bytes) => bytes.to_vec(),
                other => other
                    .as_stream()
                    .map(|s| s.data.to_vec())
                    .ok_or(Error::Schema(SchemaError::IncorrectType))?,
            };

            Ok(ColorSpace::Indexed { base, hival, lookup })
        }
        b"Pattern" => Ok(ColorSpace::Pattern),
        b"Separation" => {
            let items = array.ok_or(Error::Schema(SchemaError::IncorrectType))?;
            let alternate_obj = items
                .get(2)
                .copied()
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let alternate = Rc::new(deserialize_color_space(resolver, alternate_obj, config)?);
            let function_obj = resolver.resolve(
                items
                    .get(3)
                    .copied()
                    .ok_or(Error::Schema(SchemaError::MissingDictKey))?,
            )?;
            let tint_transform = deserialize_function(resolver, function_obj, config)?;
            Ok(ColorSpace::Separation { alternate, tint_transform })
        }
        b"DeviceN" => {
            let items = array.ok_or(Error::Schema(SchemaError::IncorrectType))?;
            let names_obj = resolver.resolve(
                items
                    .get(1)
                    .copied()
                    .ok_or(Error::Schema(SchemaError::MissingDictKey))?,
            )?;
            let colorant = names_obj
                .as_array()
                .and_then(|names| names.first())
                .and_then(|n| n.as_name())
                .ok_or(Error::Schema(SchemaError::IncorrectType))?
                .to_vec();
            let alternate_obj = items
                .get(2)
                .copied()
                .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
            let alternate = Rc::new(deserialize_color_space(resolver, alternate_obj, config)?);
            let function_obj = resolver.resolve(
                items
                    .get(3)
                    .copied()
                    .ok_or(Error::Schema(SchemaError::MissingDictKey))?,
            )?;
            let tint_transform = deserialize_function(resolver, function_obj, config)?;
            Ok(ColorSpace::DeviceN { colorant, alternate, tint_transform })
        }
        _ => Err(Error::Schema(SchemaError::InvalidSubtype)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_gray_maps_through_unchanged() {
        let out = map_color(&[0.5], &ColorSpace::DeviceGray).unwrap();
        assert_eq!(out, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn device_cmyk_black_ink_gives_black() {
        let out = map_color(&[0.0, 0.0, 0.0, 1.0], &ColorSpace::DeviceCMYK).unwrap();
        assert!(out.iter().all(|&c| c.abs() < 1e-9));
    }

    #[test]
    fn cal_rgb_with_identity_matrix_and_unit_gamma_passes_through_linearly() {
        let params = CalRgbParams {
            whitepoint: [1.0, 1.0, 1.0],
            blackpoint: [0.0, 0.0, 0.0],
            gamma: [1.0, 1.0, 1.0],
            matrix: IDENTITY_MAT3,
        };
        let out = map_color(&[1.0, 1.0, 1.0], &ColorSpace::CalRGB(params)).unwrap();
        // (1,1,1) in an identity-matrix CalRGB space maps to XYZ (1,1,1),
        // i.e. the whitepoint itself, which sRGB-encodes to white.
        assert!(out.iter().all(|&c| (c - 1.0).abs() < 1e-6));
    }

    #[test]
    fn indexed_looks_up_base_components() {
        let base = Rc::new(ColorSpace::DeviceRGB);
        let lookup = vec![255, 0, 0, 0, 255, 0];
        let space = ColorSpace::Indexed { base, hival: 1, lookup };
        let out = map_color(&[1.0], &space).unwrap();
        assert_eq!(out, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn default_fallback_treats_single_component_as_gray() {
        assert_eq!(default_component_fallback(&[0.25]), [0.25, 0.25, 0.25]);
    }

    #[test]
    fn device_n_cyan_colorant_maps_as_cmyk_cyan_channel() {
        assert_eq!(device_n_colorant_color(b"Cyan", 1.0), [0.0, 1.0, 1.0]);
    }

    #[test]
    fn device_n_unknown_colorant_maps_to_gray_one_minus_tint() {
        assert_eq!(device_n_colorant_color(b"Spot1", 0.25), [0.75, 0.75, 0.75]);
    }
}
