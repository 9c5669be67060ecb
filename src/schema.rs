//! Declarative dictionary deserializer (§4.F), grounded on
//! `original_source/libs/pdf/src/deserde.c` / `include/pdf/deserde.h` /
//! `include/decl_schema.h`. The source drives each field through a
//! `PdfFieldDescriptor` table of tagged unions pointing at C function
//! pointers (`PDF_DECL_FIELD`/`PDF_IMPL_FIELD` and friends); Rust has no
//! trampoline-generating macro system worth fighting, so [`Fields`] exposes
//! the same field *kinds* (scalar, optional, resolvable, array-of,
//! as-array-of, fixed-array, ignored, unimplemented) as plain methods that
//! take an ordinary closure — no descriptor table, no codegen (§9 REDESIGN
//! FLAGS).
//!
//! Every method marks its key "seen"; [`Fields::finish`] then reports
//! unknown keys when `EngineConfig::reject_unknown_fields` demands it, and
//! construction itself rejects a dictionary with a repeated key.

use crate::config::EngineConfig;
use crate::error::{Error, Result, SchemaError};
use crate::object::{DictEntry, PdfObject};
use crate::resolver::Resolver;

pub struct Fields<'a, 'r> {
    resolver: Option<&'r Resolver<'a>>,
    entries: &'a [DictEntry<'a>],
    seen: Vec<&'a [u8]>,
}

impl<'a, 'r> Fields<'a, 'r> {
    pub fn new(resolver: &'r Resolver<'a>, object: PdfObject<'a>) -> Result<Self> {
        Self::build(Some(resolver), object)
    }

    /// Builds a `Fields` with no resolver attached — usable only when the
    /// dict is known to contain no indirect references (tests, or values
    /// already resolved by the caller).
    pub fn new_standalone(object: PdfObject<'a>) -> Result<Self> {
        Self::build(None, object)
    }

    fn build(resolver: Option<&'r Resolver<'a>>, object: PdfObject<'a>) -> Result<Self> {
        let entries = object
            .as_dict()
            .ok_or(Error::Schema(SchemaError::ObjectNotDict))?;

        let mut keys: Vec<&[u8]> = entries.iter().map(|e| e.key).collect();
        keys.sort_unstable();
        if keys.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Schema(SchemaError::DuplicateKey));
        }

        Ok(Fields {
            resolver,
            entries,
            seen: Vec::new(),
        })
    }

    fn raw(&mut self, key: &'static [u8]) -> Option<PdfObject<'a>> {
        self.seen.push(key);
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value)
    }

    fn resolved(&mut self, key: &'static [u8]) -> Result<Option<PdfObject<'a>>> {
        match self.raw(key) {
            Some(PdfObject::Ref(r)) => {
                let resolver = self
                    .resolver
                    .ok_or(Error::Schema(SchemaError::IncorrectType))?;
                Ok(Some(resolver.resolve_ref(r.id, r.generation)?))
            }
            Some(other) => Ok(Some(other)),
            None => Ok(None),
        }
    }

    /// A required field, converted by `convert`. Missing key or a
    /// conversion failure (wrong PDF type) are both `MissingDictKey` /
    /// `IncorrectType` respectively.
    pub fn scalar<T>(
        &mut self,
        key: &'static [u8],
        convert: impl FnOnce(PdfObject<'a>) -> Option<T>,
    ) -> Result<T> {
        let value = self
            .resolved(key)?
            .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
        convert(value).ok_or(Error::Schema(SchemaError::IncorrectType))
    }

    /// Same as [`Fields::scalar`] but tolerates an absent key, returning
    /// `default` in that case — the common "optional field with a spec'd
    /// default" shape (e.g. CalRGB's `Gamma`, §4.J).
    pub fn scalar_or<T>(
        &mut self,
        key: &'static [u8],
        default: T,
        convert: impl FnOnce(PdfObject<'a>) -> Option<T>,
    ) -> Result<T> {
        match self.resolved(key)? {
            Some(value) => convert(value).ok_or(Error::Schema(SchemaError::IncorrectType)),
            None => Ok(default),
        }
    }

    /// An optional field: `None` if absent, `Some(err)` propagated if
    /// present but malformed.
    pub fn optional<T>(
        &mut self,
        key: &'static [u8],
        convert: impl FnOnce(PdfObject<'a>) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.resolved(key)? {
            Some(value) => Ok(Some(
                convert(value).ok_or(Error::Schema(SchemaError::IncorrectType))?,
            )),
            None => Ok(None),
        }
    }

    fn resolve_object(&self, object: PdfObject<'a>) -> Result<PdfObject<'a>> {
        match object {
            PdfObject::Ref(r) => {
                let resolver = self
                    .resolver
                    .ok_or(Error::Schema(SchemaError::IncorrectType))?;
                resolver.resolve_ref(r.id, r.generation)
            }
            other => Ok(other),
        }
    }

    /// A required field left as a resolved-but-untyped `PdfObject`, for
    /// callers that project it into another schema themselves (e.g. a
    /// `/Resources` dict, or a `/Parent` page-tree link).
    pub fn resolvable(&mut self, key: &'static [u8]) -> Result<PdfObject<'a>> {
        self.resolved(key)?
            .ok_or(Error::Schema(SchemaError::MissingDictKey))
    }

    pub fn resolvable_optional(&mut self, key: &'static [u8]) -> Result<Option<PdfObject<'a>>> {
        self.resolved(key)
    }

    /// A required `/Key [a b c]` array, each element resolved and
    /// converted independently.
    pub fn array_of<T>(
        &mut self,
        key: &'static [u8],
        convert: impl Fn(PdfObject<'a>) -> Option<T>,
    ) -> Result<Vec<T>> {
        let value = self
            .resolved(key)?
            .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
        let items = value
            .as_array()
            .ok_or(Error::Schema(SchemaError::IncorrectType))?;
        items
            .iter()
            .map(|&item| {
                let resolved = self.resolve_object(item)?;
                convert(resolved).ok_or(Error::Schema(SchemaError::IncorrectType))
            })
            .collect()
    }

    pub fn array_of_or_empty<T>(
        &mut self,
        key: &'static [u8],
        convert: impl Fn(PdfObject<'a>) -> Option<T>,
    ) -> Result<Vec<T>> {
        match self.resolved(key)? {
            Some(value) => {
                let items = value
                    .as_array()
                    .ok_or(Error::Schema(SchemaError::IncorrectType))?;
                items
                    .iter()
                    .map(|&item| {
                        let resolved = self.resolve_object(item)?;
                        convert(resolved).ok_or(Error::Schema(SchemaError::IncorrectType))
                    })
                    .collect()
            }
            None => Ok(Vec::new()),
        }
    }

    /// A field that PDF allows to appear either as a bare value or as a
    /// one-or-more-element array of that value (`deserde.h`'s "as array"
    /// field kind, used e.g. by `/Filter` and `/DecodeParms`). Missing is
    /// an empty vec, not an error.
    pub fn as_array_of<T>(
        &mut self,
        key: &'static [u8],
        convert: impl Fn(PdfObject<'a>) -> Option<T>,
    ) -> Result<Vec<T>> {
        match self.resolved(key)? {
            None => Ok(Vec::new()),
            Some(value) => match value.as_array() {
                Some(items) => items
                    .iter()
                    .map(|&item| {
                        let resolved = self.resolve_object(item)?;
                        convert(resolved).ok_or(Error::Schema(SchemaError::IncorrectType))
                    })
                    .collect(),
                None => Ok(vec![
                    convert(value).ok_or(Error::Schema(SchemaError::IncorrectType))?
                ]),
            },
        }
    }

    /// An array field whose length is fixed by the schema (e.g. a 3-vector
    /// `/WhitePoint`, a 6-entry `/Matrix`). Wrong length is `IncorrectType`.
    pub fn fixed_array<T: Copy + Default, const N: usize>(
        &mut self,
        key: &'static [u8],
        convert: impl Fn(PdfObject<'a>) -> Option<T>,
    ) -> Result<[T; N]> {
        let value = self
            .resolved(key)?
            .ok_or(Error::Schema(SchemaError::MissingDictKey))?;
        let items = value
            .as_array()
            .ok_or(Error::Schema(SchemaError::IncorrectType))?;
        if items.len() != N {
            return Err(Error::Schema(SchemaError::IncorrectType));
        }
        let mut out = [T::default(); N];
        for (slot, &item) in out.iter_mut().zip(items.iter()) {
            let resolved = self.resolve_object(item)?;
            *slot = convert(resolved).ok_or(Error::Schema(SchemaError::IncorrectType))?;
        }
        Ok(out)
    }

    pub fn fixed_array_or<T: Copy + Default, const N: usize>(
        &mut self,
        key: &'static [u8],
        default: [T; N],
        convert: impl Fn(PdfObject<'a>) -> Option<T>,
    ) -> Result<[T; N]> {
        if self.raw(key).is_none() {
            return Ok(default);
        }
        self.fixed_array(key, convert)
    }

    /// Marks `key` consumed without reading its value — used for fields
    /// the projection intentionally does not model (e.g. `/Metadata`).
    pub fn ignored(&mut self, key: &'static [u8]) {
        self.raw(key);
    }

    /// Same as [`Fields::ignored`], but logs once at debug level — for
    /// fields a complete implementation would eventually need.
    pub fn unimplemented(&mut self, key: &'static [u8]) {
        if self.raw(key).is_some() {
            log::debug!("schema field not yet implemented: {:?}", String::from_utf8_lossy(key));
        }
    }

    /// Checks every dict key was consumed by some `Fields::*` call.
    /// Controlled by [`EngineConfig::reject_unknown_fields`]: when `false`
    /// (the lenient default) unknown keys are silently accepted, matching
    /// real-world producers that stamp proprietary extension keys into
    /// standard dictionaries.
    pub fn finish(self, config: &EngineConfig) -> Result<()> {
        if !config.reject_unknown_fields {
            return Ok(());
        }
        for entry in self.entries {
            if !self.seen.contains(&entry.key) {
                return Err(Error::Schema(SchemaError::UnknownKey));
            }
        }
        Ok(())
    }
}

/// §4.K: the document catalog (`/Type /Catalog`).
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    pub pages: PdfObject<'a>,
}

pub fn deserialize_catalog<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<Catalog<'a>> {
    let mut fields = Fields::new(resolver, object)?;
    fields.ignored(b"Type");
    let pages = fields.resolvable(b"Pages")?;
    fields.unimplemented(b"Metadata");
    fields.unimplemented(b"Outlines");
    fields.unimplemented(b"AcroForm");
    fields.finish(config)?;
    Ok(Catalog { pages })
}

/// A page-tree node: either `/Type /Pages` (with `/Kids`) or `/Type /Page`
/// (a leaf). Attributes that PDF lets inherit down `/Parent` links
/// (`/Resources`, `/MediaBox`, `/CropBox`, `/Rotate`) are left unresolved
/// here; `document.rs`'s page-tree walk (§4.K) performs the inheritance.
#[derive(Debug, Clone)]
pub enum PageTreeNode<'a> {
    Intermediate {
        kids: Vec<PdfObject<'a>>,
        resources: Option<PdfObject<'a>>,
        media_box: Option<[f64; 4]>,
        rotate: Option<i32>,
    },
    Leaf {
        resources: Option<PdfObject<'a>>,
        media_box: Option<[f64; 4]>,
        rotate: Option<i32>,
        contents: Option<PdfObject<'a>>,
    },
}

fn as_rect(object: PdfObject) -> Option<[f64; 4]> {
    let items = object.as_array()?;
    if items.len() != 4 {
        return None;
    }
    Some([
        items[0].as_number()?,
        items[1].as_number()?,
        items[2].as_number()?,
        items[3].as_number()?,
    ])
}

pub fn deserialize_page_tree_node<'a>(
    resolver: &Resolver<'a>,
    object: PdfObject<'a>,
    config: &EngineConfig,
) -> Result<PageTreeNode<'a>> {
    let dict = object
        .as_dict()
        .ok_or(Error::Schema(SchemaError::ObjectNotDict))?;
    let is_pages = dict
        .iter()
        .find(|e| e.key == b"Type")
        .and_then(|e| e.value.as_name())
        == Some(b"Pages");

    let mut fields = Fields::new(resolver, object)?;
    fields.ignored(b"Type");
    fields.ignored(b"Parent");
    let resources = fields.resolvable_optional(b"Resources")?;
    let media_box = fields.optional(b"MediaBox", as_rect)?;
    let rotate = fields.optional(b"Rotate", |o| o.as_integer())?;

    if is_pages {
        let kids = fields.array_of(b"Kids", Some)?;
        fields.ignored(b"Count");
        fields.finish(config)?;
        Ok(PageTreeNode::Intermediate {
            kids,
            resources,
            media_box,
            rotate,
        })
    } else {
        let contents = fields.resolvable_optional(b"Contents")?;
        fields.unimplemented(b"Annots");
        fields.finish(config)?;
        Ok(PageTreeNode::Leaf {
            resources,
            media_box,
            rotate,
            contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::object::parse_object;
    use crate::parse_ctx::ParseCtx;

    fn parse_dict<'a>(arena: &'a Arena, input: &'a [u8]) -> PdfObject<'a> {
        let mut ctx = ParseCtx::new(input);
        parse_object(arena, &mut ctx, false).unwrap()
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let arena = Arena::default();
        let dict = parse_dict(&arena, b"<< /A 1 /A 2 >>");
        let result = Fields::new_standalone(dict);
        assert_eq!(result.err(), Some(Error::Schema(SchemaError::DuplicateKey)));
    }

    #[test]
    fn missing_required_field_errors() {
        let arena = Arena::default();
        let dict = parse_dict(&arena, b"<< /A 1 >>");
        let result: Result<i32> =
            Fields::new_standalone(dict).and_then(|mut f| f.scalar(b"B", |o| o.as_integer()));
        assert_eq!(result.err(), Some(Error::Schema(SchemaError::MissingDictKey)));
    }

    #[test]
    fn as_array_of_accepts_bare_value() {
        let arena = Arena::default();
        let dict = parse_dict(&arena, b"<< /Filter /FlateDecode >>");
        let filters = Fields::new_standalone(dict)
            .and_then(|mut f| f.as_array_of(b"Filter", |o| o.as_name()))
            .unwrap();
        assert_eq!(filters, vec![b"FlateDecode".as_slice()]);
    }

    #[test]
    fn fixed_array_rejects_wrong_length() {
        let arena = Arena::default();
        let dict = parse_dict(&arena, b"<< /WhitePoint [1 2] >>");
        let result = Fields::new_standalone(dict)
            .and_then(|mut f| f.fixed_array::<f64, 3>(b"WhitePoint", |o| o.as_number()));
        assert_eq!(result, Err(Error::Schema(SchemaError::IncorrectType)));
    }
}
