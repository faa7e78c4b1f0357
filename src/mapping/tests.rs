use super::*;
use crate::csfile::{ElementType, FieldDesc, FieldSchema, FieldType, RecordTable, Value};
use crate::merge::MergedTable;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn fld(name: &str) -> FieldDesc {
    FieldDesc {
        name: name.to_string(),
        ty: FieldType {
            element: ElementType::Float(8),
            count: 1,
        },
    }
}

/// A fully populated source table with `n` particles spread over three
/// micrographs.
fn full_source(n: usize) -> MergedTable {
    let names = [
        "uid",
        fields::MICROGRAPH_PATH,
        fields::CENTER_X_FRAC,
        fields::CENTER_Y_FRAC,
        fields::MICROGRAPH_SHAPE,
        fields::PIXEL_SIZE,
        fields::BLOB_PATH,
        fields::BLOB_IDX,
        fields::POSE_3D,
        fields::DF1,
        fields::DF2,
        fields::DF_ANGLE,
        fields::CLASS_3D,
    ];
    let schema = FieldSchema::new(names.iter().map(|n| fld(n)).collect());
    let rows = (0..n)
        .map(|i| {
            vec![
                Value::UInt(100 + i as u64),
                Value::Text(format!("J1/motioncorrected/mic_{:03}.mrc", i % 3)),
                Value::Float(0.5),
                Value::Float(0.25),
                Value::UIntVec(vec![200, 300]),
                Value::Float(1.1),
                Value::Text("J2/extract/stack.mrc".to_string()),
                Value::UInt(i as u64),
                Value::FloatVec(vec![0.0, 0.0, 0.0]),
                Value::Float(12000.0 + i as f64),
                Value::Float(11000.0),
                Value::Float(std::f64::consts::FRAC_PI_4),
                Value::UInt((i % 3) as u64),
            ]
        })
        .collect();
    MergedTable::from_base(&RecordTable::new(schema, rows)).unwrap()
}

#[test]
fn test_halfway_coordinate_lands_mid_image() {
    assert_eq!(absolute_coords(0.5, 0.5, (100.0, 100.0), false), (50.0, 50.0));
}

#[test]
fn test_coordinates_without_swap() {
    let merged = full_source(1);
    let table = map_particles(&merged, false).unwrap();
    // x_frac 0.5 over width 300, y_frac 0.25 over height 200
    assert_eq!(
        table.value(0, columns::COORDINATE_X).and_then(StarValue::as_f64),
        Some(150.0)
    );
    assert_eq!(
        table.value(0, columns::COORDINATE_Y).and_then(StarValue::as_f64),
        Some(50.0)
    );
}

#[test]
fn test_coordinates_with_swap() {
    let merged = full_source(1);
    let table = map_particles(&merged, true).unwrap();
    // roles exchanged: y_frac scales the height into X
    assert_eq!(
        table.value(0, columns::COORDINATE_X).and_then(StarValue::as_f64),
        Some(50.0)
    );
    assert_eq!(
        table.value(0, columns::COORDINATE_Y).and_then(StarValue::as_f64),
        Some(150.0)
    );
}

#[test]
fn test_image_name_is_one_based() {
    let merged = full_source(3);
    let table = map_particles(&merged, false).unwrap();
    assert_eq!(
        table.value(0, columns::IMAGE_NAME).and_then(StarValue::as_str),
        Some("000001@J2/extract/stack.mrc")
    );
    assert_eq!(
        table.value(2, columns::IMAGE_NAME).and_then(StarValue::as_str),
        Some("000003@J2/extract/stack.mrc")
    );
}

#[test]
fn test_angles_and_ctf_units() {
    let merged = full_source(1);
    let table = map_particles(&merged, false).unwrap();
    // zero pose maps to zero Euler angles
    for col in [columns::ANGLE_ROT, columns::ANGLE_TILT, columns::ANGLE_PSI] {
        let angle = table.value(0, col).and_then(StarValue::as_f64).unwrap();
        assert!(angle.abs() < 1e-12, "{col} = {angle}");
    }
    let df_angle = table
        .value(0, columns::DEFOCUS_ANGLE)
        .and_then(StarValue::as_f64)
        .unwrap();
    assert!((df_angle - 45.0).abs() < 1e-12);
    assert_eq!(
        table.value(0, columns::DEFOCUS_U).and_then(StarValue::as_f64),
        Some(12000.0)
    );
}

#[test]
fn test_class_and_optics_group_are_one_based() {
    let merged = full_source(2);
    let table = map_particles(&merged, false).unwrap();
    // no exposure groups in the source: everything lands in group 1
    assert_eq!(
        table.value(0, columns::OPTICS_GROUP).and_then(StarValue::as_i64),
        Some(1)
    );
    // source class 0 becomes class 1
    assert_eq!(
        table.value(0, columns::CLASS_NUMBER).and_then(StarValue::as_i64),
        Some(1)
    );
    assert_eq!(
        table.value(1, columns::CLASS_NUMBER).and_then(StarValue::as_i64),
        Some(2)
    );
}

#[test]
fn test_missing_required_field() {
    let schema = FieldSchema::new(vec![fld("uid"), fld(fields::CENTER_X_FRAC)]);
    let rows = vec![vec![Value::UInt(1), Value::Float(0.5)]];
    let merged = MergedTable::from_base(&RecordTable::new(schema, rows)).unwrap();

    let err = map_particles(&merged, false).unwrap_err();
    match err {
        MapError::MissingRequiredField { src_field: source, .. } => {
            assert_eq!(source, fields::MICROGRAPH_PATH);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_partially_supplied_required_field() {
    // the pixel size arrives via a patch that misses one base record
    let base = RecordTable::new(
        FieldSchema::new(vec![
            fld("uid"),
            fld(fields::MICROGRAPH_PATH),
            fld(fields::CENTER_X_FRAC),
            fld(fields::CENTER_Y_FRAC),
            fld(fields::MICROGRAPH_SHAPE),
        ]),
        (0..2)
            .map(|i| {
                vec![
                    Value::UInt(i),
                    Value::Text("J1/mic.mrc".to_string()),
                    Value::Float(0.5),
                    Value::Float(0.5),
                    Value::UIntVec(vec![100, 100]),
                ]
            })
            .collect(),
    );
    let patch = RecordTable::new(
        FieldSchema::new(vec![fld("uid"), fld(fields::PIXEL_SIZE)]),
        vec![vec![Value::UInt(0), Value::Float(1.0)]],
    );
    let mut merged = MergedTable::from_base(&base).unwrap();
    merged.apply(&patch).unwrap();

    let err = map_particles(&merged, false).unwrap_err();
    assert!(matches!(
        err,
        MapError::MissingFieldValue { uid: 1, .. }
    ));
}

#[test]
fn test_class_selection() {
    // source classes 0,1,2,4,4 become destination classes 1,2,3,5,5
    let schema = FieldSchema::new(vec![
        fld("uid"),
        fld(fields::MICROGRAPH_PATH),
        fld(fields::CENTER_X_FRAC),
        fld(fields::CENTER_Y_FRAC),
        fld(fields::MICROGRAPH_SHAPE),
        fld(fields::PIXEL_SIZE),
        fld(fields::CLASS_3D),
    ]);
    let rows = [0u64, 1, 2, 4, 4]
        .iter()
        .enumerate()
        .map(|(i, class)| {
            vec![
                Value::UInt(i as u64),
                Value::Text("J1/mic.mrc".to_string()),
                Value::Float(0.5),
                Value::Float(0.5),
                Value::UIntVec(vec![100, 100]),
                Value::Float(1.0),
                Value::UInt(*class),
            ]
        })
        .collect();
    let merged = MergedTable::from_base(&RecordTable::new(schema, rows)).unwrap();

    let mut table = map_particles(&merged, false).unwrap();
    let allowed: BTreeSet<i64> = [2, 5].into_iter().collect();
    let dropped = select_classes(&mut table, &allowed).unwrap();

    assert_eq!(dropped, 2);
    assert_eq!(table.len(), 3);
    let classes: Vec<i64> = (0..table.len())
        .map(|i| {
            table
                .value(i, columns::CLASS_NUMBER)
                .and_then(StarValue::as_i64)
                .unwrap()
        })
        .collect();
    assert_eq!(classes, vec![2, 5, 5]);
}

#[test]
fn test_class_selection_without_classes() {
    let schema = FieldSchema::new(vec![
        fld("uid"),
        fld(fields::MICROGRAPH_PATH),
        fld(fields::CENTER_X_FRAC),
        fld(fields::CENTER_Y_FRAC),
        fld(fields::MICROGRAPH_SHAPE),
        fld(fields::PIXEL_SIZE),
    ]);
    let rows = vec![vec![
        Value::UInt(1),
        Value::Text("J1/mic.mrc".to_string()),
        Value::Float(0.5),
        Value::Float(0.5),
        Value::UIntVec(vec![100, 100]),
        Value::Float(1.0),
    ]];
    let merged = MergedTable::from_base(&RecordTable::new(schema, rows)).unwrap();

    let mut table = map_particles(&merged, false).unwrap();
    let allowed: BTreeSet<i64> = [1].into_iter().collect();
    assert!(matches!(
        select_classes(&mut table, &allowed),
        Err(MapError::NoClassAssignments)
    ));
}

#[test]
fn test_swap_affects_in_plane_angle() {
    let merged = full_source(1);
    let swapped = map_particles(&merged, true).unwrap();
    let psi = swapped
        .value(0, columns::ANGLE_PSI)
        .and_then(StarValue::as_f64)
        .unwrap();
    // zero pose reflected across the swapped axes
    assert!((psi - 90.0).abs() < 1e-12);
}

proptest! {
    #[test]
    fn prop_swap_angle_is_involution(psi in -360.0f64..360.0) {
        let twice = swap_in_plane_angle(swap_in_plane_angle(psi));
        prop_assert!((twice - psi).abs() < 1e-12);
    }

    #[test]
    fn prop_swapped_coords_match_transposed_image(
        x in 0.0f64..1.0,
        y in 0.0f64..1.0,
        height in 1u32..8192,
        width in 1u32..8192,
    ) {
        let shape = (f64::from(height), f64::from(width));
        let transposed = (f64::from(width), f64::from(height));
        // swapping the axis roles is the same as converting against the
        // transposed image with the fractions exchanged
        prop_assert_eq!(
            absolute_coords(x, y, shape, true),
            absolute_coords(y, x, transposed, false)
        );
    }

    #[test]
    fn prop_index_base_conversion(n in 0i64..1_000_000) {
        let label = stack_image_name(n, "stack.mrc");
        // a source index of 0 maps to 1, N-1 maps to N
        let (index, stack) = label.split_once('@').unwrap();
        prop_assert_eq!(index.parse::<i64>().unwrap(), n + 1);
        prop_assert_eq!(stack, "stack.mrc");
    }
}
