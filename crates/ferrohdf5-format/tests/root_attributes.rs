//! End-to-end tests for the root-attribute write path: compact storage,
//! dense storage, the transition between them, and read-back of every
//! supported value shape.

use ferrohdf5_format::attr_storage::AttrValue;
use ferrohdf5_format::attribute::AttributeMessage;
use ferrohdf5_format::attribute_info::AttributeInfoMessage;
use ferrohdf5_format::btree_v2::BTreeV2Header;
use ferrohdf5_format::error::FormatError;
use ferrohdf5_format::file_writer::{build_file_image, FileWriter, WriteError};
use ferrohdf5_format::fractal_heap::FractalHeapHeader;
use ferrohdf5_format::message_type::MessageType;
use ferrohdf5_format::object_header::ObjectHeader;
use ferrohdf5_format::signature::find_signature;
use ferrohdf5_format::superblock::Superblock;

fn attrs(n: usize) -> Vec<(String, AttrValue)> {
    (1..=n)
        .map(|i| (format!("Attr{i}"), AttrValue::from(format!("value{i}"))))
        .collect()
}

fn count_signatures(image: &[u8], sig: &[u8]) -> usize {
    image.windows(4).filter(|w| *w == sig).count()
}

/// Read every root attribute back out of a file image, walking both the
/// inline messages and the dense heap/B-tree path. All checksum trailers
/// are verified by the parsers along the way.
fn read_root_attributes(image: &[u8]) -> Vec<AttributeMessage> {
    let sig = find_signature(image).unwrap();
    let sb = Superblock::parse(image, sig).unwrap();
    let oh = ObjectHeader::parse(
        image,
        sb.root_group_address as usize,
        sb.offset_size,
        sb.length_size,
    )
    .unwrap();

    let mut out = Vec::new();
    for msg in &oh.messages {
        match msg.msg_type {
            MessageType::Attribute => {
                out.push(AttributeMessage::parse(&msg.data, sb.length_size).unwrap());
            }
            MessageType::AttributeInfo => {
                let info = AttributeInfoMessage::parse(&msg.data, sb.offset_size).unwrap();
                let heap_addr = info.fractal_heap_address.unwrap();
                let btree_addr = info.btree_name_index_address.unwrap();
                let heap = FractalHeapHeader::parse(image, heap_addr as usize).unwrap();
                let btree = BTreeV2Header::parse(image, btree_addr as usize).unwrap();
                let mut records = btree.read_leaf_records(image).unwrap();
                records.sort_by_key(|r| r.creation_order);
                for record in records {
                    let body = heap.read_managed_object(image, &record.heap_id).unwrap();
                    out.push(AttributeMessage::parse(&body, sb.length_size).unwrap());
                }
            }
            _ => {}
        }
    }
    out
}

fn find<'a>(attrs: &'a [AttributeMessage], name: &str) -> &'a AttributeMessage {
    attrs
        .iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("attribute {name} missing"))
}

// ---- Scenario seeds ----

#[test]
fn single_string_attribute_roundtrip() {
    let image = build_file_image(&[("TestAttr".into(), AttrValue::from("TestValue"))]).unwrap();
    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].name, "TestAttr");
    assert_eq!(read[0].read_string().unwrap(), "TestValue");
}

#[test]
fn mixed_types_roundtrip() {
    let declared: Vec<(String, AttrValue)> = vec![
        ("StringAttr".into(), AttrValue::from("test string")),
        ("Int32Attr".into(), AttrValue::Int32(42)),
        ("Float64Attr".into(), AttrValue::Float64(3.14159)),
        ("Int32ArrayAttr".into(), AttrValue::from(vec![1i32, 2, 3, 4, 5])),
        ("Conventions".into(), AttrValue::from("TestFormat")),
    ];
    let image = build_file_image(&declared).unwrap();
    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 5);

    assert_eq!(find(&read, "StringAttr").read_string().unwrap(), "test string");
    assert_eq!(find(&read, "Int32Attr").read_i32s().unwrap(), vec![42]);
    let f = find(&read, "Float64Attr").read_f64s().unwrap();
    assert!((f[0] - 3.14159).abs() < 1e-5);
    assert_eq!(
        find(&read, "Int32ArrayAttr").read_i32s().unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(find(&read, "Conventions").read_string().unwrap(), "TestFormat");
}

#[test]
fn eight_attributes_stay_compact() {
    let image = build_file_image(&attrs(8)).unwrap();
    assert_eq!(count_signatures(&image, b"FRHP"), 0);

    let oh = ObjectHeader::parse(&image, 48, 8, 8).unwrap();
    let inline = oh
        .messages
        .iter()
        .filter(|m| m.msg_type == MessageType::Attribute)
        .count();
    assert_eq!(inline, 8);

    let read = read_root_attributes(&image);
    for i in 1..=8 {
        assert_eq!(
            find(&read, &format!("Attr{i}")).read_string().unwrap(),
            format!("value{i}")
        );
    }
}

#[test]
fn nine_attributes_go_dense() {
    let image = build_file_image(&attrs(9)).unwrap();
    assert_eq!(count_signatures(&image, b"FRHP"), 1);
    assert_eq!(count_signatures(&image, b"FHDB"), 1);
    assert_eq!(count_signatures(&image, b"BTHD"), 1);
    assert_eq!(count_signatures(&image, b"BTLF"), 1);

    let oh = ObjectHeader::parse(&image, 48, 8, 8).unwrap();
    let inline = oh
        .messages
        .iter()
        .filter(|m| m.msg_type == MessageType::Attribute)
        .count();
    assert_eq!(inline, 0, "dense storage must not inline attribute messages");

    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 9);
    for i in 1..=9 {
        assert_eq!(
            find(&read, &format!("Attr{i}")).read_string().unwrap(),
            format!("value{i}")
        );
    }
}

#[test]
fn twenty_attributes_enumerate_in_hash_order() {
    let image = build_file_image(&attrs(20)).unwrap();
    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 20);

    let sb = Superblock::parse(&image, 0).unwrap();
    let oh = ObjectHeader::parse(&image, sb.root_group_address as usize, 8, 8).unwrap();
    let info_msg = oh
        .messages
        .iter()
        .find(|m| m.msg_type == MessageType::AttributeInfo)
        .unwrap();
    let info = AttributeInfoMessage::parse(&info_msg.data, 8).unwrap();
    let btree =
        BTreeV2Header::parse(&image, info.btree_name_index_address.unwrap() as usize).unwrap();
    let records = btree.read_leaf_records(&image).unwrap();
    assert_eq!(records.len(), 20);
    for pair in records.windows(2) {
        assert!(
            (pair[0].name_hash, &pair[0].heap_id) <= (pair[1].name_hash, &pair[1].heap_id),
            "leaf records out of order"
        );
    }
}

#[test]
fn fifty_attributes_still_fit_one_leaf_and_block() {
    let image = build_file_image(&attrs(50)).unwrap();
    assert_eq!(count_signatures(&image, b"FRHP"), 1);
    assert_eq!(count_signatures(&image, b"BTLF"), 1);
    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 50);
    for i in 1..=50 {
        assert_eq!(
            find(&read, &format!("Attr{i}")).read_string().unwrap(),
            format!("value{i}")
        );
    }
}

#[test]
fn storage_transition_matrix() {
    for n in 0..=12usize {
        let image = build_file_image(&attrs(n)).unwrap();
        let heaps = count_signatures(&image, b"FRHP");
        if n <= 8 {
            assert_eq!(heaps, 0, "{n} attributes must stay compact");
        } else {
            assert_eq!(heaps, 1, "{n} attributes must go dense");
            assert_eq!(count_signatures(&image, b"FHDB"), 1);
            assert_eq!(count_signatures(&image, b"BTHD"), 1);
            assert_eq!(count_signatures(&image, b"BTLF"), 1);
        }
        assert_eq!(read_root_attributes(&image).len(), n);
    }
}

// ---- Value shapes ----

#[test]
fn every_supported_value_shape_roundtrips() {
    let cases: Vec<(String, AttrValue)> = vec![
        ("i32".into(), AttrValue::Int32(-7)),
        ("i64".into(), AttrValue::Int64(1 << 40)),
        ("f32".into(), AttrValue::Float32(3.14)),
        ("f64".into(), AttrValue::Float64(2.718281828)),
        ("text".into(), AttrValue::from("metadata")),
        ("i32s".into(), AttrValue::from(vec![1i32, -2, 3])),
        ("i64s".into(), AttrValue::from(vec![10i64, 20])),
        ("f32s".into(), AttrValue::from(vec![1.5f32, -2.5])),
        ("f64s".into(), AttrValue::from(vec![1.1f64, 2.2, 3.3])),
        (
            "texts".into(),
            AttrValue::TextArray(vec!["ab".into(), "wxyz".into()]),
        ),
    ];

    for (name, value) in &cases {
        let image = build_file_image(&[(name.clone(), value.clone())]).unwrap();
        let read = read_root_attributes(&image);
        assert_eq!(read.len(), 1);
        let attr = &read[0];
        assert_eq!(&attr.name, name);
        match value {
            AttrValue::Int32(v) => assert_eq!(attr.read_i32s().unwrap(), vec![*v]),
            AttrValue::Int64(v) => assert_eq!(attr.read_i64s().unwrap(), vec![*v]),
            AttrValue::Float32(v) => assert_eq!(attr.read_f32s().unwrap(), vec![*v]),
            AttrValue::Float64(v) => assert_eq!(attr.read_f64s().unwrap(), vec![*v]),
            AttrValue::Text(v) => assert_eq!(&attr.read_string().unwrap(), v),
            AttrValue::Int32Array(v) => assert_eq!(&attr.read_i32s().unwrap(), v),
            AttrValue::Int64Array(v) => assert_eq!(&attr.read_i64s().unwrap(), v),
            AttrValue::Float32Array(v) => assert_eq!(&attr.read_f32s().unwrap(), v),
            AttrValue::Float64Array(v) => assert_eq!(&attr.read_f64s().unwrap(), v),
            AttrValue::TextArray(v) => assert_eq!(&attr.read_strings().unwrap(), v),
            AttrValue::Nil => unreachable!(),
        }
    }
}

// ---- Layout invariants ----

#[test]
fn superblock_trailer_and_addresses() {
    let image = build_file_image(&attrs(3)).unwrap();
    let sb = Superblock::parse(&image, 0).unwrap();
    assert_eq!(sb.version, 2);
    assert_eq!(sb.offset_size, 8);
    assert_eq!(sb.length_size, 8);
    assert_eq!(sb.root_group_address, 48);
    assert_eq!(sb.eof_address, image.len() as u64);
}

#[test]
fn thresholds_written_in_both_modes() {
    for n in [3usize, 12] {
        let image = build_file_image(&attrs(n)).unwrap();
        let oh = ObjectHeader::parse(&image, 48, 8, 8).unwrap();
        assert_eq!(oh.max_compact_attrs, Some(8));
        assert_eq!(oh.min_dense_attrs, Some(6));
    }
}

#[test]
fn compact_order_is_caller_order() {
    let declared: Vec<(String, AttrValue)> = vec![
        ("zz".into(), AttrValue::Int32(1)),
        ("aa".into(), AttrValue::Int32(2)),
        ("mm".into(), AttrValue::Int32(3)),
    ];
    let image = build_file_image(&declared).unwrap();
    let read = read_root_attributes(&image);
    let names: Vec<&str> = read.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["zz", "aa", "mm"]);
}

#[test]
fn identical_configurations_produce_identical_bytes() {
    let declared = attrs(10);
    let a = build_file_image(&declared).unwrap();
    let b = build_file_image(&declared).unwrap();
    assert_eq!(a, b);
}

// ---- Failure semantics ----

#[test]
fn empty_name_fails_before_writing() {
    let declared = vec![("".to_string(), AttrValue::from("value"))];
    assert_eq!(
        build_file_image(&declared).unwrap_err(),
        FormatError::EmptyName
    );
}

#[test]
fn nil_value_fails_at_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nil_value.h5");
    let mut fw = FileWriter::create(&path).unwrap();
    fw.set_root_attribute("NilAttr", AttrValue::Nil);
    match fw.close() {
        Err(WriteError::Format(FormatError::NilValue { name })) => assert_eq!(name, "NilAttr"),
        other => panic!("expected NilValue failure, got {other:?}"),
    }
}

// ---- File-backed writer ----

#[test]
fn file_writer_roundtrip_compact_and_dense() {
    for n in [5usize, 9] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("root_attrs_{n}.h5"));

        let mut fw = FileWriter::create(&path).unwrap();
        for (name, value) in attrs(n) {
            fw.set_root_attribute(name, value);
        }
        fw.close().unwrap();

        let image = std::fs::read(&path).unwrap();
        let sb = Superblock::parse(&image, find_signature(&image).unwrap()).unwrap();
        assert_eq!(sb.eof_address, image.len() as u64);
        let read = read_root_attributes(&image);
        assert_eq!(read.len(), n);
        for i in 1..=n {
            assert_eq!(
                find(&read, &format!("Attr{i}")).read_string().unwrap(),
                format!("value{i}")
            );
        }
    }
}

#[test]
fn file_writer_last_write_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.h5");
    let mut fw = FileWriter::create(&path).unwrap();
    fw.set_root_attribute("key", "value1");
    fw.set_root_attribute("key", "value2");
    fw.close().unwrap();

    let image = std::fs::read(&path).unwrap();
    let read = read_root_attributes(&image);
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].read_string().unwrap(), "value2");
}
