// Copyright 2026 Cairn Project Authors. Licensed under Apache-2.0.

//! End-to-end tests of part assembly: directory contents, mark arithmetic,
//! frame alignment, manifest integrity, and the append path.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use cairn::part::{load_columns, read_data_file, PRIMARY_INDEX_FILE_NAME};
use cairn::{
    Block, BlockColumn, Column, ColumnAppendWriter, ColumnDesc, DataType, PartChecksums,
    PartError, PartOptions, PartWriter,
};
use itertools::Itertools;

fn dir_entries(path: &Path) -> BTreeSet<String> {
    fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

fn entry_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn read_marks(path: &Path) -> Vec<(u64, u64)> {
    let data = fs::read(path).unwrap();
    assert_eq!(data.len() % 16, 0, "mark file length must be a multiple of 16");
    let mut slice = &data[..];
    let mut marks = vec![];
    while !slice.is_empty() {
        let raw_offset = slice.read_u64::<LittleEndian>().unwrap();
        let frame_offset = slice.read_u64::<LittleEndian>().unwrap();
        marks.push((raw_offset, frame_offset));
    }
    marks
}

fn uint32_block(name: &str, values: Vec<u32>) -> Block {
    Block::new(vec![BlockColumn::new(
        name,
        DataType::UInt32,
        Column::from(values),
    )])
    .unwrap()
}

fn le_bytes_u32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn le_bytes_u64(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

#[test]
fn test_tiny_primitive_part() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("19700101_1_1_0");
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();

    writer.write(&uint32_block("n", vec![1, 2, 3])).unwrap();
    let checksums = writer.finish().unwrap();

    assert_eq!(writer.marks_count(), 1);
    assert_eq!(
        dir_entries(&part),
        entry_set(&["n.bin", "n.mrk", "primary.idx", "columns.txt", "checksums.txt"])
    );

    // one mark, at the origin of the first frame
    assert_eq!(read_marks(&part.join("n.mrk")), vec![(0, 0)]);
    // the sort-key tuple of the first granule: UInt32 1, little-endian
    assert_eq!(fs::read(part.join(PRIMARY_INDEX_FILE_NAME)).unwrap(), [1, 0, 0, 0]);
    assert_eq!(read_data_file(part.join("n.bin")).unwrap(), le_bytes_u32(&[1, 2, 3]));

    assert_eq!(writer.index(), &[Column::from(vec![1u32])]);
    assert_eq!(
        load_columns(&part).unwrap(),
        vec![ColumnDesc::new("n", DataType::UInt32)]
    );

    // the persisted manifest is what finish returned, and it validates
    assert_eq!(PartChecksums::load(&part).unwrap(), checksums);
    checksums.verify_part(&part).unwrap();
    assert_eq!(checksums.get("n.bin").unwrap().uncompressed_size, 12);
}

#[test]
fn test_exact_granule_multiple() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default(),
    )
    .unwrap();

    writer.write(&uint32_block("n", (0..16384).collect())).unwrap();
    assert_eq!(writer.marks_count(), 2);

    // zero carry: the next block would start a fresh granule with a mark
    writer.write(&uint32_block("n", (0..8192).collect())).unwrap();
    assert_eq!(writer.marks_count(), 3);

    writer.finish().unwrap();
    assert_eq!(fs::metadata(part.join("n.mrk")).unwrap().len(), 3 * 16);
}

#[test]
fn test_carry_across_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default(),
    )
    .unwrap();

    writer.write(&uint32_block("n", (0..5000).collect())).unwrap();
    assert_eq!(writer.marks_count(), 1);

    writer.write(&uint32_block("n", (0..5000).collect())).unwrap();
    assert_eq!(writer.marks_count(), 2);

    writer.finish().unwrap();

    // the second granule starts 3192 rows into the second block, mid-frame:
    // 8192 rows of UInt32 into a still-open first frame
    assert_eq!(
        read_marks(&part.join("n.mrk")),
        vec![(0, 0), (0, 8192 * 4)]
    );
    // its index entry is row 3192 of the second block
    assert_eq!(writer.index(), &[Column::from(vec![0u32, 3192])]);
}

#[test]
fn test_nullable_array_column() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let data_type = DataType::UInt8.array().nullable();
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("a", data_type.clone())],
        vec![],
        PartOptions::default_for_test(),
    )
    .unwrap();

    // rows: [1, 2], null, [3], []
    let column = Column::nullable(
        vec![0, 1, 0, 0],
        Column::array(vec![2, 0, 1, 0], Column::from(vec![1u8, 2, 3])),
    );
    let block = Block::new(vec![BlockColumn::new("a", data_type, column)]).unwrap();
    writer.write(&block).unwrap();
    let checksums = writer.finish().unwrap();

    // unsorted part: no primary.idx; three streams, each a data/marks pair
    assert_eq!(
        dir_entries(&part),
        entry_set(&[
            "a.bin",
            "a.mrk",
            "a.null",
            "a.null_mrk",
            "a%size0.bin",
            "a%size0.mrk",
            "columns.txt",
            "checksums.txt",
        ])
    );

    assert_eq!(read_data_file(part.join("a.null")).unwrap(), [0, 1, 0, 0]);
    assert_eq!(
        read_data_file(part.join("a%size0.bin")).unwrap(),
        le_bytes_u64(&[2, 0, 1, 0])
    );
    assert_eq!(read_data_file(part.join("a.bin")).unwrap(), [1, 2, 3]);

    // every stream of the part carries the same mark count
    for marks in ["a.mrk", "a.null_mrk", "a%size0.mrk"] {
        assert_eq!(fs::metadata(part.join(marks)).unwrap().len(), 16);
    }
    checksums.verify_part(&part).unwrap();
}

#[test]
fn test_sibling_arrays_share_sizes_stream() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let columns = cairn::flatten_nested(&[ColumnDesc::new(
        "t",
        DataType::Nested(vec![
            ColumnDesc::new("x", DataType::UInt8),
            ColumnDesc::new("y", DataType::UInt16),
        ]),
    )]);
    assert_eq!(
        columns.iter().map(|c| c.name.as_str()).collect_vec(),
        ["t.x", "t.y"]
    );

    let mut writer =
        PartWriter::new(&part, columns, vec![], PartOptions::default_for_test()).unwrap();

    // two rows; sibling columns of one Nested group share row shapes
    let sizes = vec![2u64, 1];
    let block = Block::new(vec![
        BlockColumn::new(
            "t.x",
            DataType::UInt8.array(),
            Column::array(sizes.clone(), Column::from(vec![1u8, 2, 3])),
        ),
        BlockColumn::new(
            "t.y",
            DataType::UInt16.array(),
            Column::array(sizes.clone(), Column::from(vec![10u16, 20, 30])),
        ),
    ])
    .unwrap();
    writer.write(&block).unwrap();
    let checksums = writer.finish().unwrap();

    // exactly one sizes pair for the whole group
    assert_eq!(
        dir_entries(&part),
        entry_set(&[
            "t%2Ex.bin",
            "t%2Ex.mrk",
            "t%2Ey.bin",
            "t%2Ey.mrk",
            "t%size0.bin",
            "t%size0.mrk",
            "columns.txt",
            "checksums.txt",
        ])
    );
    assert_eq!(
        read_data_file(part.join("t%size0.bin")).unwrap(),
        le_bytes_u64(&sizes)
    );
    assert_eq!(
        checksums.files().map(|(name, _)| name.as_str()).collect_vec(),
        [
            "t%2Ex.bin",
            "t%2Ex.mrk",
            "t%2Ey.bin",
            "t%2Ey.mrk",
            "t%size0.bin",
            "t%size0.mrk",
        ]
    );
}

#[test]
fn test_empty_part_is_erased() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");

    // no blocks at all
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    assert!(part.exists());
    let checksums = writer.finish().unwrap();
    assert!(checksums.is_empty());
    assert!(!part.exists());

    // only zero-row blocks
    let part = dir.path().join("part2");
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    writer.write(&uint32_block("n", vec![])).unwrap();
    let checksums = writer.finish().unwrap();
    assert!(checksums.is_empty());
    assert!(!part.exists());
}

#[test]
fn test_marks_dereference_into_frames() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let options = PartOptions {
        granularity: 16,
        min_frame_bytes: 256,
        max_frame_bytes: 512,
        ..PartOptions::default()
    };
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        options,
    )
    .unwrap();

    let values = (0..1000).collect_vec();
    writer.write(&uint32_block("n", values.clone())).unwrap();
    writer.finish().unwrap();

    // 1000 rows at granularity 16: 63 granules
    assert_eq!(writer.marks_count(), 63);
    let marks = read_marks(&part.join("n.mrk"));
    assert_eq!(marks.len(), 63);

    let raw = fs::read(part.join("n.bin")).unwrap();
    for (raw_offset, frame_offset) in marks {
        let (frame, _) = cairn::part::decompress_frame_at(&raw, raw_offset as usize).unwrap();
        // the mark's first row starts inside the frame, never at its end
        assert!(
            frame_offset < frame.len() as u64,
            "mark ({raw_offset}, {frame_offset}) points past its frame of {} bytes",
            frame.len()
        );
    }

    assert_eq!(read_data_file(part.join("n.bin")).unwrap(), le_bytes_u32(&values));
}

#[test]
fn test_write_with_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let mut writer = PartWriter::new(
        &part,
        vec![
            ColumnDesc::new("n", DataType::UInt32),
            ColumnDesc::new("s", DataType::String),
        ],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();

    let block = Block::new(vec![
        BlockColumn::new("n", DataType::UInt32, Column::from(vec![3u32, 1, 2])),
        BlockColumn::new(
            "s",
            DataType::String,
            Column::from(vec!["c".to_string(), "a".to_string(), "b".to_string()]),
        ),
    ])
    .unwrap();
    writer.write_with_permutation(&block, &[1, 2, 0]).unwrap();
    writer.finish().unwrap();

    assert_eq!(read_data_file(part.join("n.bin")).unwrap(), le_bytes_u32(&[1, 2, 3]));
    // varint length + bytes, in permuted order
    assert_eq!(
        read_data_file(part.join("s.bin")).unwrap(),
        [1, b'a', 1, b'b', 1, b'c']
    );
    assert_eq!(fs::read(part.join(PRIMARY_INDEX_FILE_NAME)).unwrap(), [1, 0, 0, 0]);
    assert_eq!(writer.index(), &[Column::from(vec![1u32])]);
}

#[test]
fn test_permutation_length_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = PartWriter::new(
        dir.path().join("part"),
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    let block = uint32_block("n", vec![3, 1, 2]);
    assert!(matches!(
        writer.write_with_permutation(&block, &[1, 0]),
        Err(PartError::BadArguments(_))
    ));
}

#[test]
fn test_nullable_string_column() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let data_type = DataType::String.nullable();
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("v", data_type.clone())],
        vec![],
        PartOptions::default_for_test(),
    )
    .unwrap();

    let column = Column::nullable(
        vec![0, 1],
        Column::from(vec!["hi".to_string(), String::new()]),
    );
    writer
        .write(&Block::new(vec![BlockColumn::new("v", data_type, column)]).unwrap())
        .unwrap();
    writer.finish().unwrap();

    assert_eq!(read_data_file(part.join("v.null")).unwrap(), [0, 1]);
    // null slots keep their default value in the dense stream
    assert_eq!(read_data_file(part.join("v.bin")).unwrap(), [2, b'h', b'i', 0]);
}

#[test]
fn test_multi_level_array() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let data_type = DataType::UInt8.array().array();
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("m", data_type.clone())],
        vec![],
        PartOptions::default_for_test(),
    )
    .unwrap();

    // rows: [[1], [2, 3]], []
    let column = Column::array(
        vec![2, 0],
        Column::array(vec![1, 2], Column::from(vec![1u8, 2, 3])),
    );
    writer
        .write(&Block::new(vec![BlockColumn::new("m", data_type, column)]).unwrap())
        .unwrap();
    let checksums = writer.finish().unwrap();

    assert_eq!(
        dir_entries(&part),
        entry_set(&[
            "m.bin",
            "m.mrk",
            "m%size0.bin",
            "m%size0.mrk",
            "m%size1.bin",
            "m%size1.mrk",
            "columns.txt",
            "checksums.txt",
        ])
    );
    assert_eq!(
        read_data_file(part.join("m%size0.bin")).unwrap(),
        le_bytes_u64(&[2, 0])
    );
    assert_eq!(
        read_data_file(part.join("m%size1.bin")).unwrap(),
        le_bytes_u64(&[1, 2])
    );
    assert_eq!(read_data_file(part.join("m.bin")).unwrap(), [1, 2, 3]);
    checksums.verify_part(&part).unwrap();
}

#[test]
fn test_duplicate_sort_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = PartWriter::new(
        dir.path().join("part"),
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into(), "n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    assert!(matches!(
        writer.write(&uint32_block("n", vec![1])),
        Err(PartError::DuplicateSortKeyColumn(name)) if name == "n"
    ));
}

#[test]
fn test_write_suffix_not_supported() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = PartWriter::new(
        dir.path().join("part"),
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec![],
        PartOptions::default_for_test(),
    )
    .unwrap();
    assert!(matches!(
        writer.write_suffix(),
        Err(PartError::NotImplemented(_))
    ));

    let mut append = ColumnAppendWriter::new(
        dir.path().join("part"),
        PartOptions::default_for_test(),
        false,
    )
    .unwrap();
    assert!(matches!(
        append.write_suffix(),
        Err(PartError::NotImplemented(_))
    ));
}

#[test]
fn test_write_after_finish_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = PartWriter::new(
        dir.path().join("part"),
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    writer.write(&uint32_block("n", vec![1])).unwrap();
    writer.finish().unwrap();

    assert!(matches!(
        writer.write(&uint32_block("n", vec![2])),
        Err(PartError::AlreadyFinished)
    ));
    assert!(matches!(writer.finish(), Err(PartError::AlreadyFinished)));
}

#[test]
fn test_configuration_rejected_at_construction() {
    let dir = tempfile::tempdir().unwrap();
    let columns = vec![ColumnDesc::new("n", DataType::UInt32)];

    let mut options = PartOptions::default_for_test();
    options.granularity = 0;
    assert!(matches!(
        PartWriter::new(dir.path().join("p1"), columns.clone(), vec![], options),
        Err(PartError::BadArguments(_))
    ));

    let mut options = PartOptions::default_for_test();
    options.min_frame_bytes = options.max_frame_bytes + 1;
    assert!(matches!(
        PartWriter::new(dir.path().join("p2"), columns.clone(), vec![], options),
        Err(PartError::BadArguments(_))
    ));

    // the type algebra is validated up front as well
    let nested = vec![ColumnDesc::new(
        "t",
        DataType::Nested(vec![ColumnDesc::new("x", DataType::UInt8)]),
    )];
    assert!(matches!(
        PartWriter::new(
            dir.path().join("p3"),
            nested,
            vec![],
            PartOptions::default_for_test()
        ),
        Err(PartError::BadArguments(_))
    ));
    assert!(matches!(
        PartWriter::new(
            dir.path().join("p4"),
            vec![ColumnDesc::new("a", DataType::UInt8.nullable().array())],
            vec![],
            PartOptions::default_for_test()
        ),
        Err(PartError::BadArguments(_))
    ));
}

#[test]
fn test_append_columns_into_existing_part() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");

    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec!["n".into()],
        PartOptions::default_for_test(),
    )
    .unwrap();
    writer.write(&uint32_block("n", vec![1, 2, 3])).unwrap();
    let mut manifest = writer.finish().unwrap();

    let mut append =
        ColumnAppendWriter::new(&part, PartOptions::default_for_test(), true).unwrap();
    append.write(&uint32_block("v", vec![7, 8, 9])).unwrap();
    let appended = append.finish().unwrap();

    assert_eq!(
        appended.files().map(|(name, _)| name.as_str()).collect_vec(),
        ["v.bin", "v.mrk"]
    );
    assert_eq!(read_data_file(part.join("v.bin")).unwrap(), le_bytes_u32(&[7, 8, 9]));
    assert_eq!(read_marks(&part.join("v.mrk")), vec![(0, 0)]);

    // the caller folds the new columns into the part's manifest
    manifest.merge(appended);
    manifest.verify_part(&part).unwrap();

    // the descriptor still lists only the columns the part was created with
    assert_eq!(
        load_columns(&part).unwrap(),
        vec![ColumnDesc::new("n", DataType::UInt32)]
    );

    // the instance is reusable: streams re-initialize on the next write
    append.write(&uint32_block("w", vec![4])).unwrap();
    let second = append.finish().unwrap();
    assert_eq!(
        second.files().map(|(name, _)| name.as_str()).collect_vec(),
        ["w.bin", "w.mrk"]
    );
}

#[test]
fn test_append_array_column_escapes_manifest_names() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    fs::create_dir_all(&part).unwrap();

    let mut append =
        ColumnAppendWriter::new(&part, PartOptions::default_for_test(), false).unwrap();
    let block = Block::new(vec![BlockColumn::new(
        "t.x",
        DataType::UInt8.array(),
        Column::array(vec![1, 2], Column::from(vec![1u8, 2, 3])),
    )])
    .unwrap();
    append.write(&block).unwrap();
    let checksums = append.finish().unwrap();

    // on disk the sizes stream uses the escaped nested root plus the raw
    // suffix; in the returned manifest the whole stream key is escaped again
    assert_eq!(
        dir_entries(&part),
        entry_set(&["t%2Ex.bin", "t%2Ex.mrk", "t%size0.bin", "t%size0.mrk"])
    );
    assert_eq!(
        checksums.files().map(|(name, _)| name.as_str()).collect_vec(),
        ["t%25size0.bin", "t%25size0.mrk", "t%2Ex.bin", "t%2Ex.mrk"]
    );
}

#[test]
fn test_unsorted_part_has_no_index_but_counts_marks() {
    let dir = tempfile::tempdir().unwrap();
    let part = dir.path().join("part");
    let mut writer = PartWriter::new(
        &part,
        vec![ColumnDesc::new("n", DataType::UInt32)],
        vec![],
        PartOptions::default(),
    )
    .unwrap();
    writer.write(&uint32_block("n", (0..20000).collect())).unwrap();
    writer.finish().unwrap();

    assert_eq!(writer.marks_count(), 3);
    assert!(!part.join(PRIMARY_INDEX_FILE_NAME).exists());
    assert!(writer.index().is_empty());
    assert_eq!(fs::metadata(part.join("n.mrk")).unwrap().len(), 3 * 16);
}
