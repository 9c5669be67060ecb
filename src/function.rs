//! PDF function evaluator (§4.M), grounded on
//! `original_source/include/pdf/function.h`'s `PdfFunction` struct shape
//! (`type`/`domain`/`range`, with type 4 boxed behind an opaque
//! `PostscriptInterpreter*`). The header ships no executable body for
//! types 0/2/3 — only the struct fields and the `pdf_run_function` entry
//! point — so evaluation here follows PDF 32000-1 §7.10's definitions
//! directly, the same way this crate's shading module fills in the type 2
//! axial case the source leaves empty.
//!
//! `type4` stays a deliberate boundary: the source's own union only stores
//! a `PostscriptInterpreter*` without giving one a body either, so
//! [`PostScriptFunction::eval`] reports
//! [`FunctionError::PostScriptUnimplemented`] rather than guessing at
//! calculator-language semantics.

use std::rc::Rc;

use crate::config::EngineConfig;
use crate::error::{Error, FunctionError, Result, SchemaError};
use crate::object::PdfObject;
use crate::resolver::Resolver;
use crate::schema::Fields;

/// The evaluation boundary every function type implements (§4.M).
pub trait PdfFunction {
    fn eval(&self, input: &[f64]) -> Result<Vec<f64>>;
}

fn parse_pairs(object: PdfObject) -> Option<Vec<(f64, f64)>> {
    let items = object.as_array()?;
    if items.len() % 2 != 0 {
        return None;
    }
    items
        .chunks(2)
        .map(|pair| Some((pair[0].as_number()?, pair[1].as_number()?)))
        .collect()
}

fn parse_numbers(object: PdfObject) -> Option<Vec<f64>> {
    object.as_array()?.iter().map(|&n| n.as_number()).collect()
}

fn parse_uints(object: PdfObject) -> Option<Vec<u32>> {
    object
        .as_array()?
        .iter()
        .map(|&n| n.as_integer().filter(|&v| v >= 0).map(|v| v as u32))
        .collect()
}

fn clip(input: &[f64], domain: &[(f64, f64)]) -> Vec<f64> {
    input
        .iter()
        .zip(domain)
        .map(|(&x, &(lo, hi))| x.clamp(lo.min(hi), lo.max(hi)))
        .collect()
}

fn interpolate(x: f64, x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> f64 {
    if (x_max - x_min).abs() < f64::EPSILON {
        return y_min;
    }
    y_min + (x - x_min) * (y_max - y_min) / (x_max - x_min)
}

/// Type 0: sampled multidimensional function, PDF 32000-1 §7.10.2.
/// `Size[i]` samples per input dimension, `BitsPerSample`-wide unsigned
/// samples packed MSB-first into the (already filter-decoded) stream body,
/// `Encode`/`Decode` remap each axis before/after the sample lookup.
pub struct SampledFunction {
    domain: Vec<(f64, f64)>,
    range: Vec<(f64, f64)>,
    size: Vec<u32>,
    bits_per_sample: u32,
    encode: Vec<(f64, f64)>,
    decode: Vec<(f64, f64)>,
    samples: Vec<u8>,
}

impl SampledFunction {
    fn read_sample(&self, sample_index: usize, output_index: usize) -> u32 {
        let n_outputs = self.range.len();
        let bit_offset =
            (sample_index * n_outputs + output_index) * self.bits_per_sample as usize;
        let mut value: u32 = 0;
        for bit in 0..self.bits_per_sample as usize {
            let abs_bit = bit_offset + bit;
            let byte = self.samples.get(abs_bit / 8).copied().unwrap_or(0);
            let bit_value = (byte >> (7 - (abs_bit % 8))) & 1;
            value = (value << 1) | bit_value as u32;
        }
        value
    }

    fn linear_index(&self, corner: &[u32]) -> usize {
        let mut index = 0usize;
        let mut stride = 1usize;
        for (i, &c) in corner.iter().enumerate() {
            index += c as usize * stride;
            stride *= self.size[i] as usize;
        }
        index
    }
}

impl PdfFunction for SampledFunction {
    fn eval(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.domain.len() {
            return Err(Error::Function(FunctionError::DomainMismatch));
        }
        let clipped = clip(input, &self.domain);

        // Encode each input into a fractional sample-grid coordinate.
        let mut coord = Vec::with_capacity(clipped.len());
        for (i, &x) in clipped.iter().enumerate() {
            let (d_lo, d_hi) = self.domain[i];
            let (e_lo, e_hi) = self.encode[i];
            let e = interpolate(x, d_lo, d_hi, e_lo, e_hi);
            let max_index = (self.size[i].saturating_sub(1)) as f64;
            coord.push(e.clamp(0.0, max_index));
        }

        let n_outputs = self.range.len();
        let max_sample = if self.bits_per_sample >= 32 {
            u32::MAX as f64
        } else {
            ((1u64 << self.bits_per_sample) - 1) as f64
        };

        let n_inputs = coord.len();
        let mut outputs = vec![0.0f64; n_outputs];

        // Multilinear interpolation over the 2^m surrounding grid corners.
        for corner_bits in 0u32..(1u32 << n_inputs) {
            let mut corner_idx = Vec::with_capacity(n_inputs);
            let mut weight = 1.0f64;
            for i in 0..n_inputs {
                let floor = coord[i].floor();
                let frac = coord[i] - floor;
                let take_ceil = (corner_bits >> i) & 1 == 1;
                let size_i = self.size[i] as f64;
                let idx = if take_ceil {
                    (floor + 1.0).min(size_i - 1.0)
                } else {
                    floor
                };
                corner_idx.push(idx as u32);
                weight *= if take_ceil { frac } else { 1.0 - frac };
            }
            if weight == 0.0 {
                continue;
            }
            let sample_index = self.linear_index(&corner_idx);
            for (j, out) in outputs.iter_mut().enumerate() {
                let raw = self.read_sample(sample_index, j) as f64;
                *out += weight * raw;
            }
        }

        for (j, out) in outputs.iter_mut().enumerate() {
            let (dec_lo, dec_hi) = self.decode[j];
            let decoded = interpolate(*out, 0.0, max_sample, dec_lo, dec_hi);
            let (r_lo, r_hi) = self.range[j];
            *out = decoded.clamp(r_lo.min(r_hi), r_lo.max(r_hi));
        }

        Ok(outputs)
    }
}

/// Type 2: exponential interpolation, PDF 32000-1 §7.10.3. Single input
/// `x`; `y_j = C0_j + x^N * (C1_j - C0_j)`.
pub struct ExponentialFunction {
    domain: Vec<(f64, f64)>,
    c0: Vec<f64>,
    c1: Vec<f64>,
    n: f64,
}

impl PdfFunction for ExponentialFunction {
    fn eval(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != 1 {
            return Err(Error::Function(FunctionError::DomainMismatch));
        }
        let x = clip(input, &self.domain)[0];
        let powered = x.powf(self.n);
        Ok(self
            .c0
            .iter()
            .zip(&self.c1)
            .map(|(&c0, &c1)| c0 + powered * (c1 - c0))
            .collect())
    }
}

/// Type 3: stitching function, PDF 32000-1 §7.10.4. Partitions `Domain`
/// with `Bounds` into `k` subdomains, each routed through the matching
/// sub-`Functions[i]` after its own `Encode[i]` remap.
pub struct StitchingFunction {
    domain: (f64, f64),
    functions: Vec<Rc<dyn PdfFunction>>,
    bounds: Vec<f64>,
    encode: Vec<(f64, f64)>,
}

impl PdfFunction for StitchingFunction {
    fn eval(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != 1 {
            return Err(Error::Function(FunctionError::DomainMismatch));
        }
        let x = clip(input, &[self.domain])[0];

        let mut sub_index = self.bounds.len();
        for (i, &bound) in self.bounds.iter().enumerate() {
            if x < bound {
                sub_index = i;
                break;
            }
        }

        let lower = if sub_index == 0 {
            self.domain.0
        } else {
            self.bounds[sub_index - 1]
        };
        let upper = if sub_index == self.bounds.len() {
            self.domain.1
        } else {
            self.bounds[sub_index]
        };

        let (e_lo, e_hi) = self.encode[sub_index];
        let encoded = interpolate(x, lower, upper, e_lo, e_hi);
        self.functions[sub_index].eval(&[encoded])
    }
}

/// Type 4: PostScript calculator function. Parsed (so `/FunctionType 4`
/// doesn't abort document loading) but not executed.
pub struct PostScriptFunction {
    #[allow(dead_code)]
    domain: Vec<(f64, f64)>,
}

impl PdfFunction for PostScriptFunction {
    fn eval(&self, _input: &[f64]) -> Result<Vec<f64>> {
        Err(Error::Function(FunctionError::PostScriptUnimplemented))
    }
}

pub fn deserialize_function<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<Rc<dyn PdfFunction>> {
    let mut fields = Fields::new(resolver, object)?;
    let function_type = fields.scalar(b"FunctionType", |o| o.as_integer())?;
    let domain = fields.array_of(b"Domain", |o| o.as_number())?;
    let domain_pairs: Vec<(f64, f64)> = domain.chunks(2).map(|p| (p[0], p[1])).collect();

    match function_type {
        0 => {
            let range = fields.array_of(b"Range", |o| o.as_number())?;
            let range_pairs: Vec<(f64, f64)> = range.chunks(2).map(|p| (p[0], p[1])).collect();
            let size = fields.scalar(b"Size", parse_uints)?;
            let bits_per_sample = fields.scalar(b"BitsPerSample", |o| o.as_integer())? as u32;

            let default_encode: Vec<(f64, f64)> =
                size.iter().map(|&s| (0.0, (s.saturating_sub(1)) as f64)).collect();
            let encode = fields.scalar_or(b"Encode", default_encode, parse_pairs)?;
            let decode = fields.scalar_or(b"Decode", range_pairs.clone(), parse_pairs)?;

            let stream = object
                .unwrap_indirect()
                .as_stream()
                .ok_or(Error::Schema(SchemaError::IncorrectType))?;
            let samples = stream.data.to_vec();

            fields.ignored(b"Filter");
            fields.ignored(b"DecodeParms");
            fields.ignored(b"Length");
            fields.finish(config)?;

            Ok(Rc::new(SampledFunction {
                domain: domain_pairs,
                range: range_pairs,
                size,
                bits_per_sample,
                encode,
                decode,
                samples,
            }))
        }
        2 => {
            let n = fields.scalar(b"N", |o| o.as_number())?;
            let c0 = fields.scalar_or(b"C0", vec![0.0], parse_numbers)?;
            let c1 = fields.scalar_or(b"C1", vec![1.0], parse_numbers)?;
            fields.finish(config)?;
            Ok(Rc::new(ExponentialFunction {
                domain: domain_pairs,
                c0,
                c1,
                n,
            }))
        }
        3 => {
            let sub_objects = fields.array_of(b"Functions", Some)?;
            let bounds = fields.scalar_or(b"Bounds", Vec::new(), parse_numbers)?;
            let default_encode: Vec<(f64, f64)> =
                sub_objects.iter().map(|_| (0.0, 1.0)).collect();
            let encode_flat = fields.scalar_or(
                b"Encode",
                default_encode.iter().flat_map(|&(a, b)| [a, b]).collect(),
                parse_numbers,
            )?;
            let encode: Vec<(f64, f64)> = encode_flat.chunks(2).map(|p| (p[0], p[1])).collect();
            fields.finish(config)?;

            if domain_pairs.len() != 1 {
                return Err(Error::Function(FunctionError::DomainMismatch));
            }

            let mut functions = Vec::with_capacity(sub_objects.len());
            for sub in sub_objects {
                functions.push(deserialize_function(resolver, sub, config)?);
            }

            Ok(Rc::new(StitchingFunction {
                domain: domain_pairs[0],
                functions,
                bounds,
                encode,
            }))
        }
        4 => {
            fields.ignored(b"Range");
            fields.ignored(b"Length");
            fields.ignored(b"Filter");
            fields.finish(config)?;
            Ok(Rc::new(PostScriptFunction {
                domain: domain_pairs,
            }))
        }
        _ => Err(Error::Function(FunctionError::InvalidType)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_function_linear_identity() {
        let f = ExponentialFunction {
            domain: vec![(0.0, 1.0)],
            c0: vec![0.0],
            c1: vec![1.0],
            n: 1.0,
        };
        let out = f.eval(&[0.25]).unwrap();
        assert!((out[0] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn exponential_function_clips_to_domain() {
        let f = ExponentialFunction {
            domain: vec![(0.0, 1.0)],
            c0: vec![0.0],
            c1: vec![1.0],
            n: 1.0,
        };
        let out = f.eval(&[5.0]).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sampled_function_1d_interpolates_between_samples() {
        // 1 input, 1 output, 2 samples (0 -> 0, 1 -> 255) at 8 bits/sample.
        let f = SampledFunction {
            domain: vec![(0.0, 1.0)],
            range: vec![(0.0, 1.0)],
            size: vec![2],
            bits_per_sample: 8,
            encode: vec![(0.0, 1.0)],
            decode: vec![(0.0, 1.0)],
            samples: vec![0x00, 0xff],
        };
        let out = f.eval(&[0.5]).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stitching_function_routes_by_bound() {
        let low = ExponentialFunction {
            domain: vec![(0.0, 1.0)],
            c0: vec![0.0],
            c1: vec![0.0],
            n: 1.0,
        };
        let high = ExponentialFunction {
            domain: vec![(0.0, 1.0)],
            c0: vec![1.0],
            c1: vec![1.0],
            n: 1.0,
        };
        let stitch = StitchingFunction {
            domain: (0.0, 1.0),
            functions: vec![Rc::new(low), Rc::new(high)],
            bounds: vec![0.5],
            encode: vec![(0.0, 1.0), (0.0, 1.0)],
        };
        assert!((stitch.eval(&[0.1]).unwrap()[0] - 0.0).abs() < 1e-9);
        assert!((stitch.eval(&[0.9]).unwrap()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn postscript_function_reports_unimplemented() {
        let f = PostScriptFunction {
            domain: vec![(0.0, 1.0)],
        };
        assert_eq!(
            f.eval(&[0.0]),
            Err(Error::Function(FunctionError::PostScriptUnimplemented))
        );
    }
}
