//! Synthetic containers shared by the integration tests.
#![allow(dead_code)]

use blendsplit::block::{BlockCode, RecordHeader};
use blendsplit::endian::{EndianSwitch, Endianness};
use blendsplit::header::{ContainerHeader, PointerWidth};
use blendsplit::io_stream::ContainerWriter;

pub const OBJECT_INDEX: i32 = 2;
pub const VERT_INDEX:   i32 = 3;

pub fn foreign() -> Endianness {
    match Endianness::HOST {
        Endianness::Big    => Endianness::Little,
        Endianness::Little => Endianness::Big,
    }
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// Link(0), ID(1), Object(2, leading ID), Vert(3), in `swap`'s byte order.
pub fn schema_table(swap: EndianSwitch) -> Vec<u8> {
    let names = ["*next", "*prev", "name[24]", "flag", "id", "(*callback)()", "co[3]"];
    let types: [(&str, u16); 8] = [
        ("char", 1), ("int", 4), ("float", 4), ("void", 0),
        ("Link", 0), ("ID", 0), ("Object", 0), ("Vert", 12),
    ];
    let structs: [(u16, &[(u16, u16)]); 4] = [
        (4, &[(3, 0), (3, 1)]),
        (5, &[(3, 0), (3, 1), (0, 2), (1, 3)]),
        (6, &[(5, 4), (1, 3), (3, 5)]),
        (7, &[(2, 6)]),
    ];

    let mut out = b"SDNANAME".to_vec();
    out.extend_from_slice(&swap.fix(names.len() as i32).to_ne_bytes());
    for n in names {
        out.extend_from_slice(n.as_bytes());
        out.push(0);
    }
    pad4(&mut out);
    out.extend_from_slice(b"TYPE");
    out.extend_from_slice(&swap.fix(types.len() as i32).to_ne_bytes());
    for (t, _) in types {
        out.extend_from_slice(t.as_bytes());
        out.push(0);
    }
    pad4(&mut out);
    out.extend_from_slice(b"TLEN");
    for (_, size) in types {
        out.extend_from_slice(&swap.fix(size).to_ne_bytes());
    }
    pad4(&mut out);
    out.extend_from_slice(b"STRC");
    out.extend_from_slice(&swap.fix(structs.len() as i32).to_ne_bytes());
    for (ty, members) in structs {
        out.extend_from_slice(&swap.fix(ty).to_ne_bytes());
        out.extend_from_slice(&swap.fix(members.len() as u16).to_ne_bytes());
        for (mt, mn) in members {
            out.extend_from_slice(&swap.fix(*mt).to_ne_bytes());
            out.extend_from_slice(&swap.fix(*mn).to_ne_bytes());
        }
    }
    out
}

/// Object payload with `name` in its leading ID block: two pointers, then name[24].
pub fn object_payload(width: PointerWidth, name: &str, len: usize) -> Vec<u8> {
    let mut out = vec![0xEEu8; 2 * width.bytes()];
    let mut field = [0u8; 24];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
    out.resize(len, 0x11);
    out
}

fn rec(code: &[u8; 4], old_address: u64, schema_index: i32, count: i32) -> RecordHeader {
    RecordHeader { code: BlockCode(*code), length: 0, old_address, schema_index, count }
}

pub fn scene_records(width: PointerWidth, endianness: Endianness) -> Vec<(RecordHeader, Vec<u8>)> {
    vec![
        (rec(b"REND", 0x1000, 0, 1), vec![1, 2, 3, 4, 5, 6, 7, 8]),
        (rec(b"OB\0\0", 0x1040, OBJECT_INDEX, 1), object_payload(width, "OBCube", 160)),
        (rec(b"OB\0\0", 0x1080, OBJECT_INDEX, 1), object_payload(width, "OBCube", 180)),
        (rec(b"OB\0\0", 0x10c0, OBJECT_INDEX, 1), object_payload(width, "OBLamp", 40)),
        (rec(b"DATA", 0x1100, VERT_INDEX, 20), (0..240).map(|i| i as u8).collect()),
        (rec(b"DATA", 0, 0, 1), Vec::new()),
        (rec(b"DNA1", 0, 0, 1), schema_table(EndianSwitch::new(endianness))),
        (rec(b"ENDB", 0, 0, 0), Vec::new()),
    ]
}

pub fn build(header: &ContainerHeader, records: &[(RecordHeader, Vec<u8>)]) -> Vec<u8> {
    let mut w = ContainerWriter::new(Vec::new(), header, "memory").unwrap();
    for (r, p) in records {
        w.write_record(r, p).unwrap();
    }
    w.finish().unwrap()
}

pub fn scene(width: PointerWidth, endianness: Endianness) -> Vec<u8> {
    let header = ContainerHeader { version: 302, endianness, pointer_width: width };
    build(&header, &scene_records(width, endianness))
}
