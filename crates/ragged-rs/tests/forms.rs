use ragged_rs::array::{build, LayoutForm};
use ragged_rs::ops::value_equal;
use ragged_rs::{ArrayView, Buffer, DType, Error};

fn list_of_f64_form() -> LayoutForm {
    LayoutForm::ListOffset {
        content: Box::new(LayoutForm::Flat { dtype: DType::F64 }),
    }
}

#[test]
fn forms_round_trip_through_json() {
    let form = LayoutForm::IndexedOption {
        content: Box::new(list_of_f64_form()),
    };
    let json = form.to_json();
    assert!(json.contains(r#""kind":"indexed-option""#), "json: {json}");
    assert!(json.contains(r#""kind":"list-offset""#), "json: {json}");
    assert_eq!(LayoutForm::from_json(&json).unwrap(), form);
}

#[test]
fn malformed_json_is_rejected() {
    assert!(matches!(
        LayoutForm::from_json(r#"{"kind":"no-such-node"}"#),
        Err(Error::Structural { .. })
    ));
}

#[test]
fn build_assembles_buffers_in_preorder() -> anyhow::Result<()> {
    let view = build(
        &list_of_f64_form(),
        vec![
            Buffer::from_vec(vec![0i64, 2, 3]),
            Buffer::from_vec(vec![1.0f64, 2.0, 3.0]),
        ],
    )?;
    let expected = ArrayView::list_of_f64(&[vec![1.0, 2.0], vec![3.0]]);
    assert!(value_equal(&view, &expected));
    Ok(())
}

#[test]
fn build_rejects_metadata_with_the_wrong_dtype() {
    let result = build(
        &list_of_f64_form(),
        vec![
            Buffer::from_vec(vec![0i32, 2, 3]),
            Buffer::from_vec(vec![1.0f64, 2.0, 3.0]),
        ],
    );
    match result {
        Err(Error::Structural { reason, .. }) => {
            assert!(reason.contains("int64"), "unexpected reason: {reason}");
        }
        other => panic!("expected a structural failure, got {other:?}"),
    }
}

#[test]
fn build_validates_the_assembled_layout() {
    // Offsets reach past the three supplied values.
    let result = build(
        &list_of_f64_form(),
        vec![
            Buffer::from_vec(vec![0i64, 2, 9]),
            Buffer::from_vec(vec![1.0f64, 2.0, 3.0]),
        ],
    );
    assert!(matches!(result, Err(Error::Structural { .. })));
}

#[test]
fn build_rejects_a_buffer_count_mismatch() {
    let result = build(&list_of_f64_form(), vec![Buffer::from_vec(vec![0i64, 1])]);
    assert!(matches!(result, Err(Error::Structural { .. })));
}

#[test]
fn buffer_counts_follow_the_form_shape() {
    assert_eq!(LayoutForm::Flat { dtype: DType::I32 }.buffer_count(), 1);
    assert_eq!(list_of_f64_form().buffer_count(), 2);
    let union = LayoutForm::Union {
        contents: vec![
            LayoutForm::Flat { dtype: DType::F64 },
            LayoutForm::Flat { dtype: DType::I64 },
        ],
    };
    assert_eq!(union.buffer_count(), 4);
    let record = LayoutForm::Record {
        fields: vec![
            ("x".to_string(), Box::new(list_of_f64_form())),
            ("y".to_string(), Box::new(LayoutForm::Flat { dtype: DType::F64 })),
        ],
    };
    assert_eq!(record.buffer_count(), 3);
}

#[test]
fn union_forms_resolve_through_their_tags() {
    let form = LayoutForm::Union {
        contents: vec![
            LayoutForm::Flat { dtype: DType::F64 },
            LayoutForm::Flat { dtype: DType::I64 },
        ],
    };
    let view = ArrayView::from_parts(
        &form,
        vec![
            Buffer::from_vec(vec![0i8, 1, 0]),
            Buffer::from_vec(vec![0i64, 0, 1]),
            Buffer::from_vec(vec![1.5f64, 2.5]),
            Buffer::from_vec(vec![7i64]),
        ],
    )
    .unwrap();
    assert_eq!(view.len(), 3);
    use ragged_rs::{ArrayElement, Scalar};
    assert!(matches!(
        view.get(0).unwrap(),
        ArrayElement::Scalar(Scalar::Float(v)) if v == 1.5
    ));
    assert!(matches!(
        view.get(1).unwrap(),
        ArrayElement::Scalar(Scalar::Int(7))
    ));
    assert!(matches!(
        view.get(2).unwrap(),
        ArrayElement::Scalar(Scalar::Float(v)) if v == 2.5
    ));
}
