//! Property tests for the quantified format invariants: checksum totality,
//! trailer coverage, and write determinism.

use proptest::prelude::*;

use ferrohdf5_format::attr_storage::AttrValue;
use ferrohdf5_format::attribute::AttributeMessage;
use ferrohdf5_format::checksum::{hashlittle, jenkins_lookup3};
use ferrohdf5_format::dataspace::Dataspace;
use ferrohdf5_format::datatype::Datatype;
use ferrohdf5_format::file_writer::build_file_image;
use ferrohdf5_format::object_header::ObjectHeader;
use ferrohdf5_format::signature::find_signature;
use ferrohdf5_format::superblock::Superblock;

proptest! {
    #[test]
    fn checksum_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert_eq!(jenkins_lookup3(&data), jenkins_lookup3(&data));
    }

    #[test]
    fn empty_input_hashes_to_zero_for_any_seed(seed in any::<u32>()) {
        prop_assert_eq!(hashlittle(b"", seed), 0);
    }

    #[test]
    fn one_byte_flip_changes_checksum(
        data in proptest::collection::vec(any::<u8>(), 1..512),
        index in any::<proptest::sample::Index>(),
    ) {
        let mut flipped = data.clone();
        let i = index.index(flipped.len());
        flipped[i] ^= 0x01;
        prop_assert_ne!(jenkins_lookup3(&data), jenkins_lookup3(&flipped));
    }

    #[test]
    fn superblock_trailer_invariant(root in 48u64..1 << 40, eof in 48u64..1 << 40) {
        let bytes = Superblock::v2(root, eof).serialize();
        let stored = u32::from_le_bytes([bytes[44], bytes[45], bytes[46], bytes[47]]);
        prop_assert_eq!(stored, jenkins_lookup3(&bytes[..44]));
        prop_assert_eq!(Superblock::parse(&bytes, 0).unwrap().root_group_address, root);
    }

    #[test]
    fn attribute_message_roundtrip(
        name in "[A-Za-z][A-Za-z0-9_]{0,24}",
        values in proptest::collection::vec(any::<i64>(), 1..16),
    ) {
        let attr = AttributeMessage {
            name: name.clone(),
            datatype: Datatype::Integer { size: 8, signed: true },
            dataspace: Dataspace::one_dimensional(values.len() as u64),
            raw_data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        };
        let bytes = attr.serialize(8).unwrap();
        let parsed = AttributeMessage::parse(&bytes, 8).unwrap();
        prop_assert_eq!(&parsed.name, &name);
        prop_assert_eq!(parsed.read_i64s().unwrap(), values);
    }

    #[test]
    fn single_attribute_file_roundtrip(
        name in "[A-Za-z][A-Za-z0-9_]{0,24}",
        value in any::<i64>(),
    ) {
        let image = build_file_image(&[(name.clone(), AttrValue::Int64(value))]).unwrap();
        let sb = Superblock::parse(&image, find_signature(&image).unwrap()).unwrap();
        let oh = ObjectHeader::parse(&image, sb.root_group_address as usize, 8, 8).unwrap();
        let attr_msg = oh
            .messages
            .iter()
            .find(|m| m.msg_type == ferrohdf5_format::message_type::MessageType::Attribute)
            .unwrap();
        let attr = AttributeMessage::parse(&attr_msg.data, 8).unwrap();
        prop_assert_eq!(&attr.name, &name);
        prop_assert_eq!(attr.read_i64s().unwrap(), vec![value]);
    }

    #[test]
    fn write_is_deterministic(n in 0usize..24) {
        let attrs: Vec<(String, AttrValue)> = (0..n)
            .map(|i| (format!("Attr{i}"), AttrValue::Int32(i as i32)))
            .collect();
        let a = build_file_image(&attrs).unwrap();
        let b = build_file_image(&attrs).unwrap();
        prop_assert_eq!(a, b);
    }
}
