//! Field packer: assigns every struct/union field a deterministic
//! wire-compatible byte offset (and bit index for booleans) and computes the
//! aggregate's total size, padding, and per-version sizes.

use std::collections::HashSet;

use wireidl_ir::{
    ConstantValue, Field, FieldPlacement, IdlError, Kind, Module, StructLayout, StructPtr,
    UnionLayout, UnionPtr, VersionInfo, MIN_VERSION_ATTRIBUTE,
};

/// Every packed struct starts with an 8-byte header carrying its size and
/// version.
pub const HEADER_SIZE: u32 = 8;

/// On-wire size of a union inline in a struct: 8-byte size+tag header plus
/// an 8-byte payload slot.
pub const UNION_SIZE: u32 = 16;

/// On-wire byte size of a non-boolean field of this kind. Booleans are
/// handled separately: they occupy one bit of a shared byte.
fn wire_size(kind: &Kind) -> u32 {
    match kind {
        Kind::Bool | Kind::Int8 | Kind::UInt8 => 1,
        Kind::Int16 | Kind::UInt16 => 2,
        Kind::Int32
        | Kind::UInt32
        | Kind::Float
        | Kind::Enum { .. }
        | Kind::Handle { .. }
        | Kind::InterfaceRequest { .. } => 4,
        Kind::Int64 | Kind::UInt64 | Kind::Double => 8,
        // Pointer to out-of-line payload.
        Kind::String { .. } | Kind::Array { .. } | Kind::Map { .. } | Kind::Struct { .. } => 8,
        // Handle plus interface version word.
        Kind::Interface { .. } => 8,
        Kind::Union { .. } => UNION_SIZE,
    }
}

fn alignment(size: u32) -> u32 {
    size.min(8)
}

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// Declared minimum version of a field, from its `MinVersion` attribute.
fn field_min_version(field: &Field, path: &str) -> Result<u32, IdlError> {
    match field.attributes.get(MIN_VERSION_ATTRIBUTE) {
        None => Ok(0),
        Some(ConstantValue::Int(v)) if *v >= 0 => Ok(*v as u32),
        Some(other) => Err(IdlError::VersionError {
            path: format!("{}.{}", path, field.name),
            msg:  format!("invalid MinVersion value {:?}", other),
        }),
    }
}

/// Effective wire ordinals: explicit where declared, otherwise assigned
/// sequentially after the previous field's ordinal.
fn effective_ordinals(fields: &[Field], path: &str) -> Result<Vec<u32>, IdlError> {
    let mut out = Vec::with_capacity(fields.len());
    let mut seen = HashSet::new();
    let mut next = 0;
    for field in fields {
        let ordinal = field.ordinal.unwrap_or(next);
        next = ordinal + 1;
        if !seen.insert(ordinal) {
            return Err(IdlError::InvariantViolation {
                path: format!("{}.{}", path, field.name),
                msg:  format!("ordinal {} is already used", ordinal),
            });
        }
        out.push(ordinal);
    }
    Ok(out)
}

/// Lowest aligned offset where `size` bytes fit without overlapping an
/// allocated extent. Extents stay sorted by start offset.
fn first_fit(extents: &mut Vec<(u32, u32)>, size: u32, alignment: u32) -> u32 {
    let mut offset = 0;
    loop {
        offset = align_up(offset, alignment);
        let end = offset + size;
        match extents.iter().find(|(s, e)| offset < *e && end > *s) {
            None => {
                let at = extents.partition_point(|(s, _)| *s < offset);
                extents.insert(at, (offset, end));
                return offset;
            }
            Some(&(_, e)) => offset = e,
        }
    }
}

/// Packs a field set into a deterministic layout.
///
/// Fields are visited in effective-ordinal order and placed first-fit at the
/// lowest aligned free offset, so smaller later fields fill the alignment
/// holes left by earlier larger ones. The result is a pure function of the
/// field set: caller-supplied declaration order never changes an offset.
/// Consecutive booleans share a byte, eight bits before the cursor advances.
pub fn pack_fields(fields: &[Field], path: &str) -> Result<StructLayout, IdlError> {
    let ordinals = effective_ordinals(fields, path)?;
    let mut order: Vec<usize> = (0..fields.len()).collect();
    order.sort_by_key(|&i| ordinals[i]);

    // MinVersion must not decrease along the wire order.
    let mut last_version = 0;
    for &i in &order {
        let version = field_min_version(&fields[i], path)?;
        if version < last_version {
            return Err(IdlError::VersionError {
                path: format!("{}.{}", path, fields[i].name),
                msg:  format!(
                    "MinVersion {} is lower than an earlier field's {}",
                    version, last_version
                ),
            });
        }
        last_version = version;
    }

    let mut extents: Vec<(u32, u32)> = Vec::new();
    let mut open_bool: Option<(u32, u8)> = None;
    let mut placements = Vec::with_capacity(fields.len());

    for &i in &order {
        let field = &fields[i];
        let min_version = field_min_version(field, path)?;
        if matches!(field.kind, Kind::Bool) {
            let (offset, bit) = match open_bool {
                Some((offset, bit)) if bit < 8 => (offset, bit),
                _ => (first_fit(&mut extents, 1, 1), 0),
            };
            open_bool = Some((offset, bit + 1));
            placements.push(FieldPlacement {
                field_index: i,
                ordinal: ordinals[i],
                offset,
                bit: Some(bit),
                size_bytes: 1,
                min_version,
            });
        } else {
            open_bool = None;
            let size = wire_size(&field.kind);
            let offset = first_fit(&mut extents, size, alignment(size));
            placements.push(FieldPlacement {
                field_index: i,
                ordinal: ordinals[i],
                offset,
                bit: None,
                size_bytes: size,
                min_version,
            });
        }
    }

    // Self-check: a correct allocator never produces overlapping placements.
    let mut check = placements.clone();
    check.sort_by_key(|p| (p.offset, p.bit));
    for pair in check.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let distinct_bits = a.offset == b.offset && a.bit != b.bit && a.bit.is_some() && b.bit.is_some();
        assert!(
            b.offset >= a.offset + a.size_bytes || distinct_bits,
            "field placements overlap: {:?} and {:?}",
            a,
            b
        );
    }

    let payload_size = extents.iter().map(|(_, e)| *e).max().unwrap_or(0);
    let total_size = align_up(HEADER_SIZE + payload_size, 8);
    let versions = version_sizes(&placements);

    Ok(StructLayout {
        placements: check,
        payload_size,
        total_size,
        padding: total_size - HEADER_SIZE - payload_size,
        versions,
    })
}

/// Struct size as of each declared version, so an older and a newer peer can
/// validate a possibly-truncated struct during decode.
fn version_sizes(placements: &[FieldPlacement]) -> Vec<VersionInfo> {
    let mut versions: Vec<u32> = placements.iter().map(|p| p.min_version).collect();
    versions.push(0);
    versions.sort_unstable();
    versions.dedup();

    versions
        .into_iter()
        .map(|version| {
            let visible: Vec<&FieldPlacement> =
                placements.iter().filter(|p| p.min_version <= version).collect();
            let payload = visible.iter().map(|p| p.offset + p.size_bytes).max().unwrap_or(0);
            VersionInfo {
                version,
                num_fields: visible.len() as u32,
                num_bytes:  align_up(HEADER_SIZE + payload, 8),
            }
        })
        .collect()
}

/// Packs a struct definition and caches the layout on it.
pub fn pack_struct(def: &StructPtr) -> Result<(), IdlError> {
    let (fields, path) = {
        let d = def.borrow();
        (d.fields.clone(), d.qualified.clone())
    };
    let layout = pack_fields(&fields, &path)?;
    def.borrow_mut().layout = Some(layout);
    Ok(())
}

/// Assigns union fields their wire tags and caches the fixed 16-byte layout.
pub fn pack_union(def: &UnionPtr) -> Result<(), IdlError> {
    let (fields, path) = {
        let d = def.borrow();
        (d.fields.clone(), d.qualified.clone())
    };
    let ordinals = effective_ordinals(&fields, &path)?;
    let layout = UnionLayout {
        tags:       ordinals.into_iter().enumerate().collect(),
        total_size: UNION_SIZE,
    };
    def.borrow_mut().layout = Some(layout);
    Ok(())
}

/// Packs every struct and union in a module.
pub fn pack_module(module: &Module) -> Result<(), IdlError> {
    for def in &module.structs {
        pack_struct(def)?;
    }
    for def in &module.unions {
        pack_union(def)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement_of<'a>(layout: &'a StructLayout, field_index: usize) -> &'a FieldPlacement {
        layout
            .placements
            .iter()
            .find(|p| p.field_index == field_index)
            .expect("field was not placed")
    }

    #[test]
    fn concrete_layout_scenario() {
        // struct { int32 a; bool b; bool c; int32 d; }
        let fields = vec![
            Field::new("a", Kind::Int32),
            Field::new("b", Kind::Bool),
            Field::new("c", Kind::Bool),
            Field::new("d", Kind::Int32),
        ];
        let layout = pack_fields(&fields, "test.S").unwrap();

        let a = placement_of(&layout, 0);
        assert_eq!((a.offset, a.bit), (0, None));
        let b = placement_of(&layout, 1);
        assert_eq!((b.offset, b.bit), (4, Some(0)));
        let c = placement_of(&layout, 2);
        assert_eq!((c.offset, c.bit), (4, Some(1)));
        let d = placement_of(&layout, 3);
        assert_eq!((d.offset, d.bit), (8, None));

        assert_eq!(layout.payload_size, 12);
        assert_eq!(layout.total_size, 24);
        assert_eq!(layout.padding, 4);
    }

    #[test]
    fn packing_is_invariant_to_declaration_order() {
        let fields = vec![
            Field::new("a", Kind::Int32).with_ordinal(0),
            Field::new("b", Kind::Bool).with_ordinal(1),
            Field::new("c", Kind::Int64).with_ordinal(2),
            Field::new("d", Kind::UInt16).with_ordinal(3),
        ];
        let layout = pack_fields(&fields, "test.S").unwrap();

        let shuffled = vec![
            fields[2].clone(),
            fields[0].clone(),
            fields[3].clone(),
            fields[1].clone(),
        ];
        let relayout = pack_fields(&shuffled, "test.S").unwrap();

        for (name, index) in [("a", 0usize), ("b", 1), ("c", 2), ("d", 3)] {
            let original = layout.placements.iter().find(|p| fields[p.field_index].name == name);
            let permuted = relayout.placements.iter().find(|p| p.ordinal == index as u32);
            let (original, permuted) = (original.unwrap(), permuted.unwrap());
            assert_eq!((original.offset, original.bit), (permuted.offset, permuted.bit));
        }
        assert_eq!(layout.total_size, relayout.total_size);
    }

    #[test]
    fn smaller_fields_fill_alignment_holes() {
        let fields = vec![
            Field::new("a", Kind::Int32),
            Field::new("b", Kind::Int64),
            Field::new("c", Kind::Int16),
        ];
        let layout = pack_fields(&fields, "test.S").unwrap();
        assert_eq!(placement_of(&layout, 0).offset, 0);
        assert_eq!(placement_of(&layout, 1).offset, 8);
        // The i16 lands in the hole after the i32.
        assert_eq!(placement_of(&layout, 2).offset, 4);
        assert_eq!(layout.payload_size, 16);
    }

    #[test]
    fn nine_bools_spill_into_a_second_byte() {
        let fields: Vec<Field> =
            (0..9).map(|i| Field::new(&format!("b{}", i), Kind::Bool)).collect();
        let layout = pack_fields(&fields, "test.S").unwrap();
        let eighth = placement_of(&layout, 7);
        assert_eq!((eighth.offset, eighth.bit), (0, Some(7)));
        let ninth = placement_of(&layout, 8);
        assert_eq!((ninth.offset, ninth.bit), (1, Some(0)));
        assert_eq!(layout.payload_size, 2);
    }

    #[test]
    fn duplicate_ordinals_are_rejected() {
        let fields = vec![
            Field::new("a", Kind::Int32).with_ordinal(1),
            Field::new("b", Kind::Int32).with_ordinal(1),
        ];
        let err = pack_fields(&fields, "test.S").unwrap_err();
        assert!(matches!(err, IdlError::InvariantViolation { .. }));
    }

    #[test]
    fn version_sizes_track_minimum_versions() {
        let fields = vec![
            Field::new("a", Kind::Int32),
            Field::new("b", Kind::Int32),
            Field::new("c", Kind::Int64).with_min_version(1),
            Field::new("d", Kind::Int32).with_min_version(2),
        ];
        let layout = pack_fields(&fields, "test.S").unwrap();
        assert_eq!(
            layout.versions,
            vec![
                VersionInfo { version: 0, num_fields: 2, num_bytes: 16 },
                VersionInfo { version: 1, num_fields: 3, num_bytes: 24 },
                VersionInfo { version: 2, num_fields: 4, num_bytes: 32 },
            ]
        );
    }

    #[test]
    fn min_versions_must_not_decrease() {
        let fields = vec![
            Field::new("a", Kind::Int32).with_min_version(2),
            Field::new("b", Kind::Int32).with_min_version(1),
        ];
        let err = pack_fields(&fields, "test.S").unwrap_err();
        assert!(matches!(err, IdlError::VersionError { .. }));
    }

    #[test]
    fn empty_struct_is_just_the_header() {
        let layout = pack_fields(&[], "test.Empty").unwrap();
        assert_eq!(layout.payload_size, 0);
        assert_eq!(layout.total_size, 8);
        assert_eq!(layout.versions, vec![VersionInfo { version: 0, num_fields: 0, num_bytes: 8 }]);
    }
}
