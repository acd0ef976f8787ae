use std::io;

use assert_matches::assert_matches;
use nrbf::result::Error;
use nrbf::{decode, Decoder, Member, Value};

mod common;

use common::{s, Bt, Stream};

#[test]
fn primitive_array_elements_are_writable() {
    let mut stream = Stream::new(1);
    stream.array_i32(1, &[7, -3, 1_000_000]);
    let mut bytes = stream.end();
    let baseline = bytes.clone();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        for index in 0..3usize {
            assert!(decoder.is_writable(&root, index));
        }
        assert!(!decoder.is_writable(&root, 3usize));
        decoder.write(&root, 1usize, &Value::I32(42)).unwrap();
        // the in-memory graph is deliberately left untouched
        assert_eq!(root.as_array().unwrap().borrow()[1], Value::I32(-3));
    }

    assert_ne!(bytes, baseline);
    let reread = decode(bytes.as_slice()).unwrap();
    assert_eq!(
        *reread.as_array().unwrap().borrow(),
        vec![Value::I32(7), Value::I32(42), Value::I32(1_000_000)]
    );

    // a second identical write leaves the file bytewise identical
    let snapshot = bytes.clone();
    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        decoder.write(&root, 1usize, &Value::I32(42)).unwrap();
    }
    assert_eq!(bytes, snapshot);
}

#[test]
fn typed_members_are_writable_by_name() {
    let mut stream = Stream::new(1);
    stream.system_class_with_types(
        1,
        "Mixed",
        &[("flag", Bt::Prim(1)), ("count", Bt::Prim(8)), ("name", Bt::Str)],
    );
    stream.u8(1);
    stream.i32(5);
    stream.string_record(2, "unchanged");
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert!(decoder.is_writable(&root, "flag"));
        assert!(decoder.is_writable(&root, "count"));
        assert!(!decoder.is_writable(&root, "name"));

        assert_matches!(
            decoder.write(&root, "name", &s("nope")),
            Err(Error::NotWritable)
        );
        assert_matches!(
            decoder.write(&root, "count", &Value::I64(1 << 40)),
            Err(Error::EncodingRange)
        );
        assert_matches!(
            decoder.write(&root, "count", &s("five")),
            Err(Error::EncodingRange)
        );

        decoder.write(&root, "flag", &Value::Bool(false)).unwrap();
        decoder.write(&root, "count", &Value::I32(-9)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    let object = reread.as_object().unwrap().borrow();
    assert_eq!(object.get("flag"), Some(&Value::Bool(false)));
    assert_eq!(object.get("count"), Some(&Value::I32(-9)));
    assert_eq!(object.get("name"), Some(&s("unchanged")));
}

#[test]
fn member_primitive_typed_values_get_slots() {
    let mut stream = Stream::new(1);
    stream.system_class(1, "Holder", &["v"]);
    stream.member_primitive(9);
    stream.i64(123);
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert!(decoder.is_writable(&root, "v"));
        decoder.write(&root, "v", &Value::I64(-1)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    assert_eq!(
        reread.as_object().unwrap().borrow().get("v"),
        Some(&Value::I64(-1))
    );
}

#[test]
fn slots_move_with_list_conversion() {
    let mut stream = Stream::new(1);
    stream.system_class_with_types(
        1,
        "System.Collections.ArrayList",
        &[("_items", Bt::ObjArray), ("_size", Bt::Prim(8))],
    );
    stream.array_i32(2, &[10, 20, 30]);
    stream.i32(2); // _size
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert_eq!(
            *root.as_array().unwrap().borrow(),
            vec![Value::I32(10), Value::I32(20)]
        );
        assert!(decoder.is_writable(&root, 0usize));
        assert!(decoder.is_writable(&root, 1usize));
        decoder.write(&root, 1usize, &Value::I32(99)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    assert_eq!(
        *reread.as_array().unwrap().borrow(),
        vec![Value::I32(10), Value::I32(99)]
    );
}

#[test]
fn slots_move_with_map_conversion() {
    let mut stream = Stream::new(1);
    stream.system_class_with_types(
        1,
        "System.Collections.Hashtable",
        &[("Keys", Bt::Obj), ("Values", Bt::Obj)],
    );
    stream.array_single_object(2, 2);
    stream.string_record(3, "a");
    stream.string_record(4, "b");
    stream.array_i32(5, &[1, 2]);
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert!(decoder.is_writable(&root, "a"));
        assert!(decoder.is_writable(&root, Member::Key(&s("b"))));
        assert!(!decoder.is_writable(&root, "missing"));
        decoder.write(&root, "a", &Value::I32(5)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    let map = reread.as_map().unwrap().borrow();
    assert_eq!(map.get(&s("a")), Some(&Value::I32(5)));
    assert_eq!(map.get(&s("b")), Some(&Value::I32(2)));
}

#[test]
fn byte_buffers_are_writable_per_element() {
    let mut stream = Stream::new(1);
    stream.array_single_primitive(1, 3, 2);
    for byte in [9u8, 9, 9] {
        stream.u8(byte);
    }
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert!(decoder.is_writable(&root, 2usize));
        decoder.write(&root, 1usize, &Value::U8(0)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    assert_eq!(*reread.as_bytes().unwrap().borrow(), vec![9u8, 0, 9]);
}

#[test]
fn rectangular_primitive_elements_are_writable_flat() {
    let mut stream = Stream::new(1);
    stream.u8(7);
    stream.i32(1);
    stream.u8(2); // rectangular
    stream.i32(2);
    stream.i32(2);
    stream.i32(3);
    stream.u8(0);
    stream.u8(6); // double
    for v in 1..=6 {
        stream.f64(f64::from(v));
    }
    let mut bytes = stream.end();

    {
        let mut decoder = Decoder::with_overwrite(io::Cursor::new(&mut bytes)).unwrap();
        let root = decoder.read().unwrap();
        assert!(decoder.is_writable(&root, 5usize));
        decoder.write(&root, 4usize, &Value::F64(-2.5)).unwrap();
    }

    let reread = decode(bytes.as_slice()).unwrap();
    let nd = reread.as_nd_array().unwrap().borrow();
    assert_eq!(nd.get(&[1, 1]), Some(&Value::F64(-2.5)));
}

#[test]
fn reading_without_overwrite_records_nothing() {
    let mut stream = Stream::new(1);
    stream.array_i32(1, &[1, 2]);
    let bytes = stream.end();
    let mut decoder = Decoder::new(bytes.as_slice());
    let root = decoder.read().unwrap();
    assert!(!decoder.is_writable(&root, 0usize));
}
