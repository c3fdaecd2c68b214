//! The container's embedded schema table (the `DNA1` record).
//!
//! ```text
//! "SDNA"
//! "NAME" i32 count, count NUL-terminated member names     (pad to 4)
//! "TYPE" i32 count, count NUL-terminated type names       (pad to 4)
//! "TLEN" u16 size per type                                 (pad to 4)
//! "STRC" i32 count, per struct:
//!        u16 type, u16 member count, member count x (u16 type, u16 name)
//! ```
//!
//! Padding is relative to the start of the payload.  Counts and 16-bit
//! values are in the writer's byte order and are corrected through the
//! container's [`EndianSwitch`]; this is the only payload the codec ever
//! endian-corrects itself.

use byteorder::{NativeEndian, ReadBytesExt};

use crate::endian::EndianSwitch;
use crate::error::{Result, SplitError};
use crate::header::{ContainerHeader, PointerWidth};
use crate::schema::{SchemaBroker, StructCompare};

/// Type name of the named-entity header struct.
pub const IDENTITY_TYPE: &str = "ID";
/// Member of [`IDENTITY_TYPE`] holding the entity name.
pub const IDENTITY_NAME_FIELD: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub type_index: usize,
    pub name_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub type_index: usize,
    pub members:    Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTable {
    pub names:      Vec<String>,
    /// Raw type names; not necessarily UTF-8.
    pub types:      Vec<Vec<u8>>,
    pub type_sizes: Vec<u16>,
    pub structs:    Vec<StructDef>,
}

impl SchemaTable {
    pub fn parse(payload: &[u8], swap: EndianSwitch) -> Result<Self> {
        let mut cur = TableCursor { data: payload, pos: 0, swap };

        cur.expect_tag(b"SDNA")?;

        cur.expect_tag(b"NAME")?;
        let n = cur.read_count()?;
        let names = (0..n).map(|_| cur.read_cstr()).collect::<Result<Vec<_>>>()?;
        cur.align4();

        cur.expect_tag(b"TYPE")?;
        let n = cur.read_count()?;
        let types = (0..n).map(|_| cur.read_bytes()).collect::<Result<Vec<_>>>()?;
        cur.align4();

        cur.expect_tag(b"TLEN")?;
        let type_sizes = (0..types.len()).map(|_| cur.read_u16()).collect::<Result<Vec<_>>>()?;
        cur.align4();

        cur.expect_tag(b"STRC")?;
        let n = cur.read_count()?;
        let mut structs = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            let type_index  = usize::from(cur.read_u16()?);
            let member_count = cur.read_u16()?;
            let mut members = Vec::with_capacity(usize::from(member_count));
            for _ in 0..member_count {
                let type_index = usize::from(cur.read_u16()?);
                let name_index = usize::from(cur.read_u16()?);
                members.push(Member { type_index, name_index });
            }
            structs.push(StructDef { type_index, members });
        }

        let table = Self { names, types, type_sizes, structs };
        table.validate()?;
        log::debug!(
            "schema table: {} names, {} types, {} structs",
            table.names.len(), table.types.len(), table.structs.len()
        );
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for (i, s) in self.structs.iter().enumerate() {
            if s.type_index >= self.types.len() {
                return Err(SplitError::SchemaTable(format!("struct {i} has type index {} out of range", s.type_index)));
            }
            for m in &s.members {
                if m.type_index >= self.types.len() || m.name_index >= self.names.len() {
                    return Err(SplitError::SchemaTable(format!("struct {i} has a member out of range")));
                }
            }
        }
        Ok(())
    }

    pub fn struct_at(&self, schema_index: i32) -> Option<&StructDef> {
        usize::try_from(schema_index).ok().and_then(|i| self.structs.get(i))
    }

    pub fn type_name(&self, def: &StructDef) -> &[u8] {
        &self.types[def.type_index]
    }

    pub fn find_struct(&self, type_name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| self.types[s.type_index] == type_name.as_bytes())
    }

    /// On-disk size of one member; `None` if it does not fit in `usize`.
    pub fn member_size(&self, member: &Member, pointer_width: PointerWidth) -> Option<usize> {
        let name  = &self.names[member.name_index];
        let count = array_len(name)?;
        let unit  = if is_pointer(name) {
            pointer_width.bytes()
        } else {
            usize::from(self.type_sizes[member.type_index])
        };
        unit.checked_mul(count)
    }

    /// Total size of `def`; `None` on overflow.
    pub fn struct_size(&self, def: &StructDef, pointer_width: PointerWidth) -> Option<usize> {
        def.members
            .iter()
            .try_fold(0usize, |acc, m| acc.checked_add(self.member_size(m, pointer_width)?))
    }

    /// Byte offset and size of the member called `field` (array suffix and
    /// pointer prefix ignored).  `None` when absent or on overflow.
    pub fn field_span(&self, def: &StructDef, field: &str, pointer_width: PointerWidth) -> Option<(usize, usize)> {
        let mut offset = 0usize;
        for m in &def.members {
            let size = self.member_size(m, pointer_width)?;
            if base_name(&self.names[m.name_index]) == field {
                return Some((offset, size));
            }
            offset = offset.checked_add(size)?;
        }
        None
    }

    /// Every struct layout must be addressable at `pointer_width`.
    fn check_layouts(&self, pointer_width: PointerWidth) -> Result<()> {
        for (i, def) in self.structs.iter().enumerate() {
            if self.struct_size(def, pointer_width).is_none() {
                return Err(SplitError::SchemaTable(format!(
                    "struct {i} ({}) has a size that overflows",
                    String::from_utf8_lossy(self.type_name(def))
                )));
            }
        }
        Ok(())
    }
}

fn is_pointer(name: &str) -> bool {
    name.starts_with('*') || name.starts_with("(*")
}

fn base_name(name: &str) -> &str {
    let trimmed = name.trim_start_matches(['(', '*']);
    let end = trimmed.find(['[', ')']).unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Product of all `[n]` dimensions in a member name; 1 when there are none,
/// `None` on overflow.
fn array_len(name: &str) -> Option<usize> {
    let mut total = 1usize;
    let mut rest  = name;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else { break };
        if let Ok(n) = after[..close].trim().parse::<usize>() {
            total = total.checked_mul(n)?;
        }
        rest = &after[close + 1..];
    }
    Some(total)
}

struct TableCursor<'a> {
    data: &'a [u8],
    pos:  usize,
    swap: EndianSwitch,
}

impl<'a> TableCursor<'a> {
    fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn short(&self, what: &str) -> SplitError {
        SplitError::SchemaTable(format!("truncated while reading {what} at offset {}", self.pos))
    }

    fn expect_tag(&mut self, tag: &[u8; 4]) -> Result<()> {
        if !self.remaining().starts_with(tag) {
            return Err(SplitError::SchemaTable(format!(
                "expected {:?} at offset {}", String::from_utf8_lossy(tag), self.pos
            )));
        }
        self.pos += 4;
        Ok(())
    }

    fn read_count(&mut self) -> Result<usize> {
        let raw = self.remaining().read_i32::<NativeEndian>().map_err(|_| self.short("count"))?;
        self.pos += 4;
        let n = self.swap.fix(raw);
        usize::try_from(n).map_err(|_| SplitError::SchemaTable(format!("negative count {n}")))
    }

    fn read_u16(&mut self) -> Result<u16> {
        let raw = self.remaining().read_u16::<NativeEndian>().map_err(|_| self.short("u16"))?;
        self.pos += 2;
        Ok(self.swap.fix(raw))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let rest = self.remaining();
        let len  = rest.iter().position(|&b| b == 0).ok_or_else(|| self.short("name"))?;
        self.pos += len + 1;
        Ok(rest[..len].to_vec())
    }

    /// Member names only feed layout arithmetic; lossy decoding is fine.
    fn read_cstr(&mut self) -> Result<String> {
        self.read_bytes().map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    fn align4(&mut self) {
        self.pos = (self.pos + 3) & !3;
    }
}

// ── Broker ───────────────────────────────────────────────────────────────────

/// Broker backed by the container's own schema table.
///
/// The table describes the layout the payloads were written with, so every
/// known struct is [`StructCompare::Unchanged`] and nothing is rebuilt.
#[derive(Debug, Clone)]
pub struct TableBroker {
    table:         SchemaTable,
    pointer_width: PointerWidth,
    /// Offset and size of the entity name inside the identity header.
    identity_name: Option<(usize, usize)>,
}

impl TableBroker {
    /// Fails with [`SplitError::SchemaTable`] when any struct's size
    /// overflows at `pointer_width`.
    pub fn new(table: SchemaTable, pointer_width: PointerWidth) -> Result<Self> {
        table.check_layouts(pointer_width)?;
        let identity_name = table
            .find_struct(IDENTITY_TYPE)
            .and_then(|id| table.field_span(id, IDENTITY_NAME_FIELD, pointer_width));
        if identity_name.is_none() {
            log::warn!("schema table has no {IDENTITY_TYPE}.{IDENTITY_NAME_FIELD}; entity names unavailable");
        }
        Ok(Self { table, pointer_width, identity_name })
    }

    /// Parse the `DNA1` payload of a container.
    pub fn from_payload(payload: &[u8], header: &ContainerHeader) -> Result<Self> {
        let table = SchemaTable::parse(payload, header.endian_switch())?;
        Self::new(table, header.pointer_width)
    }

    pub fn table(&self) -> &SchemaTable {
        &self.table
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }
}

impl SchemaBroker for TableBroker {
    fn classify(&self, schema_index: i32) -> StructCompare {
        match self.table.struct_at(schema_index) {
            Some(_) => StructCompare::Unchanged,
            None => {
                log::warn!("schema index {schema_index} is outside the schema table");
                StructCompare::Unknown
            }
        }
    }

    fn reconstruct(&self, schema_index: i32, _count: i32, _raw: &[u8]) -> Result<Vec<u8>> {
        Err(SplitError::SchemaReconciliation {
            schema_index,
            reason: "the container schema table describes a single layout; nothing to rebuild".into(),
        })
    }

    fn name_of(&self, schema_index: i32) -> Option<&[u8]> {
        self.table.struct_at(schema_index).map(|s| self.table.type_name(s))
    }

    fn has_leading_identity(&self, schema_index: i32) -> bool {
        self.table
            .struct_at(schema_index)
            .and_then(|s| s.members.first())
            .is_some_and(|m| self.table.types[m.type_index] == IDENTITY_TYPE.as_bytes())
    }

    fn identity_name(&self, schema_index: i32, payload: &[u8]) -> Option<Vec<u8>> {
        if !self.has_leading_identity(schema_index) {
            return None;
        }
        let (offset, size) = self.identity_name?;
        if offset >= payload.len() {
            return None;
        }
        let field = &payload[offset..offset.saturating_add(size).min(payload.len())];
        let len   = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Some(field[..len].to_vec())
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Builds small schema tables in the on-disk format.

    use crate::endian::EndianSwitch;

    pub struct TableDesc<'a> {
        pub names:   &'a [&'a str],
        pub types:   &'a [(&'a str, u16)],
        pub structs: &'a [(u16, &'a [(u16, u16)])],
    }

    fn pad4(out: &mut Vec<u8>) {
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    pub fn encode(desc: &TableDesc<'_>, swap: EndianSwitch) -> Vec<u8> {
        let mut out = b"SDNANAME".to_vec();
        out.extend_from_slice(&swap.fix(desc.names.len() as i32).to_ne_bytes());
        for n in desc.names {
            out.extend_from_slice(n.as_bytes());
            out.push(0);
        }
        pad4(&mut out);
        out.extend_from_slice(b"TYPE");
        out.extend_from_slice(&swap.fix(desc.types.len() as i32).to_ne_bytes());
        for (t, _) in desc.types {
            out.extend_from_slice(t.as_bytes());
            out.push(0);
        }
        pad4(&mut out);
        out.extend_from_slice(b"TLEN");
        for (_, size) in desc.types {
            out.extend_from_slice(&swap.fix(*size).to_ne_bytes());
        }
        pad4(&mut out);
        out.extend_from_slice(b"STRC");
        out.extend_from_slice(&swap.fix(desc.structs.len() as i32).to_ne_bytes());
        for (ty, members) in desc.structs {
            out.extend_from_slice(&swap.fix(*ty).to_ne_bytes());
            out.extend_from_slice(&swap.fix(members.len() as u16).to_ne_bytes());
            for (mt, mn) in members.iter() {
                out.extend_from_slice(&swap.fix(*mt).to_ne_bytes());
                out.extend_from_slice(&swap.fix(*mn).to_ne_bytes());
            }
        }
        out
    }

    /// Link(0), ID(1), Object(2, leading ID), Vert(3).
    pub fn scene(swap: EndianSwitch) -> Vec<u8> {
        encode(&TableDesc {
            names: &["*next", "*prev", "name[24]", "flag", "id", "(*callback)()", "co[3]"],
            types: &[("char", 1), ("int", 4), ("float", 4), ("void", 0), ("Link", 0), ("ID", 0), ("Object", 0), ("Vert", 12)],
            structs: &[
                (4, &[(3, 0), (3, 1)]),
                (5, &[(3, 0), (3, 1), (0, 2), (1, 3)]),
                (6, &[(5, 4), (1, 3), (3, 5)]),
                (7, &[(2, 6)]),
            ],
        }, swap)
    }
}
