mod common;

use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use common::MockBackend;
use half::f16;
use ndarray::{Array, Array4};
use proptest::prelude::*;

use ane_rs::{AneError, Model, TILE_ALIGN};

/// Descriptor whose padded layout equals its logical shape.
fn dense(n: u64, c: u64, h: u64, w: u64) -> [u64; 6] {
    [n, c, h, w, h * w * 2, w * 2]
}

fn ramp(shape: (usize, usize, usize, usize), offset: f32) -> Array4<f16> {
    let numel = shape.0 * shape.1 * shape.2 * shape.3;
    Array::from_iter((0..numel).map(|i| f16::from_f32(i as f32 + offset)))
        .into_shape_with_order(shape)
        .unwrap()
}

#[test]
fn load_reads_slot_layout_once() -> Result<()> {
    let backend = MockBackend::new(
        vec![dense(1, 3, 8, 8), dense(1, 1, 4, 4)],
        vec![[1, 16, 2, 2, 128, 64]],
    );
    let state = backend.state.clone();
    let model = Model::with_backend(Box::new(backend))?;

    assert_eq!(model.src_count(), 2);
    assert_eq!(model.dst_count(), 1);
    assert_eq!(model.src_nchw()[0].shape(), [1, 3, 8, 8]);
    assert_eq!(model.dst_nchw()[0].shape(), [1, 16, 2, 2]);
    assert_eq!(model.src_size(), &[TILE_ALIGN, TILE_ALIGN]);
    // 1 * 16 * 128 bytes = 0x800, rounded up
    assert_eq!(model.dst_size(), &[TILE_ALIGN]);

    let state = state.lock().unwrap();
    assert_eq!(state.calls, vec!["init", "info", "nchw"]);
    Ok(())
}

#[test]
fn predict_rejects_wrong_input_count() -> Result<()> {
    let backend = MockBackend::new(
        vec![dense(1, 1, 2, 2), dense(1, 1, 2, 2)],
        vec![dense(1, 1, 2, 2)],
    );
    let state = backend.state.clone();
    let mut model = Model::with_backend(Box::new(backend))?;

    let tiles = vec![vec![0u8; TILE_ALIGN]];
    let err = model.predict(&tiles).unwrap_err();
    assert!(matches!(err, AneError::Validation(_)), "got {err}");

    let state = state.lock().unwrap();
    assert_eq!(state.count("send"), 0);
    assert_eq!(state.count("exec"), 0);
    Ok(())
}

#[test]
fn predict_rejects_short_tile() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 1, 2, 2)], vec![dense(1, 1, 2, 2)]);
    let state = backend.state.clone();
    let mut model = Model::with_backend(Box::new(backend))?;

    let err = model.predict(&[vec![0u8; 16]]).unwrap_err();
    assert!(matches!(err, AneError::Validation(_)));
    assert_eq!(state.lock().unwrap().count("send"), 0);
    Ok(())
}

#[test]
fn predict_runs_send_exec_read_in_order() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 1, 2, 2)], vec![dense(1, 1, 2, 2)]);
    let state = backend.state.clone();
    let mut model = Model::with_backend(Box::new(backend))?;

    let outputs = model.predict(&[vec![7u8; TILE_ALIGN]])?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].len(), TILE_ALIGN);
    assert!(outputs[0].iter().all(|&b| b == 7));

    let state = state.lock().unwrap();
    assert_eq!(&state.calls[3..], &["send", "exec", "read"]);
    Ok(())
}

#[test]
fn predict_outputs_do_not_alias() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 1, 2, 2)], vec![dense(1, 1, 2, 2)]);
    let mut model = Model::with_backend(Box::new(backend))?;

    let first = model.predict(&[vec![1u8; TILE_ALIGN]])?;
    let second = model.predict(&[vec![2u8; TILE_ALIGN]])?;

    assert!(first[0].iter().all(|&b| b == 1));
    assert!(second[0].iter().all(|&b| b == 2));
    assert_ne!(first[0].as_ptr(), second[0].as_ptr());
    Ok(())
}

#[test]
fn tile2arr_crops_to_logical_shape() -> Result<()> {
    let backend = MockBackend::new(vec![], vec![[1, 3, 4, 4, 16, 8]]);
    let model = Model::with_backend(Box::new(backend))?;

    let tile = vec![0u8; model.dst_size()[0]];
    let arr = model.tile2arr(&tile, 0)?;
    assert_eq!(arr.shape(), &[1, 3, 4, 4]);
    Ok(())
}

#[test]
fn tile2arr_skips_row_padding() -> Result<()> {
    // 2x2 plane stored in 64-byte rows (32 halves per row), 2 rows per plane
    let backend = MockBackend::new(vec![], vec![[1, 1, 2, 2, 128, 64]]);
    let model = Model::with_backend(Box::new(backend))?;

    let mut tile = vec![0u8; model.dst_size()[0]];
    for (row, col, value) in [(0, 0, 1.0f32), (0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0)] {
        let offset = (row * 32 + col) * 2;
        tile[offset..offset + 2].copy_from_slice(&f16::from_f32(value).to_le_bytes());
    }
    // Padding past the logical width must not leak into the result.
    tile[4..6].copy_from_slice(&f16::from_f32(99.0).to_le_bytes());

    let arr = model.tile2arr(&tile, 0)?;
    let values: Vec<f32> = arr.iter().map(|v| v.to_f32()).collect();
    assert_eq!(values.len(), 4);
    for (v, exp) in values.iter().zip([1.0, 2.0, 3.0, 4.0]) {
        assert_abs_diff_eq!(*v, exp, epsilon = 1e-3);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tile_round_trip_through_identity_tiler(
        n in 1usize..=2,
        c in 1usize..=4,
        h in 1usize..=8,
        w in 1usize..=8,
        offset in -64.0f32..64.0,
    ) {
        let desc = dense(n as u64, c as u64, h as u64, w as u64);
        let backend = MockBackend::new(vec![desc], vec![desc]);
        let model = Model::with_backend(Box::new(backend)).unwrap();

        let arr = ramp((n, c, h, w), offset);
        let tile = model.arr2tile(&arr, 0).unwrap();
        prop_assert_eq!(tile.len(), model.src_size()[0]);

        let back = model.tile2arr(&tile, 0).unwrap();
        prop_assert_eq!(back.shape(), &[n, c, h, w]);
        prop_assert_eq!(back, arr);
    }
}

#[test]
fn arr2tile_validates_shape_and_slot() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 2, 3, 4)], vec![dense(1, 2, 3, 4)]);
    let state = backend.state.clone();
    let model = Model::with_backend(Box::new(backend))?;

    let wrong = Array4::<f16>::zeros((1, 2, 4, 3));
    let err = model.arr2tile(&wrong, 0).unwrap_err();
    assert!(matches!(err, AneError::Validation(_)));

    let right = Array4::<f16>::zeros((1, 2, 3, 4));
    assert!(matches!(
        model.arr2tile(&right, 1).unwrap_err(),
        AneError::Validation(_)
    ));

    assert_eq!(state.lock().unwrap().count("tile"), 0);
    Ok(())
}

#[test]
fn batch_helpers_require_one_entry_per_slot() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 1, 2, 2)], vec![dense(1, 1, 2, 2)]);
    let model = Model::with_backend(Box::new(backend))?;

    let arrays: Vec<Array4<f16>> = vec![];
    assert!(model.tile(&arrays).is_err());

    let tiles = vec![vec![0u8; TILE_ALIGN]; 2];
    assert!(model.untile(&tiles).is_err());
    Ok(())
}

#[test]
fn infer_echoes_inputs_through_mock_device() -> Result<()> {
    let backend = MockBackend::new(
        vec![dense(1, 3, 4, 4), dense(1, 1, 2, 8)],
        vec![dense(1, 3, 4, 4), dense(1, 1, 2, 8)],
    );
    let mut model = Model::with_backend(Box::new(backend))?;

    let inputs = vec![
        ramp((1, 3, 4, 4), 0.0).into_dyn(),
        ramp((1, 1, 2, 8), 100.0).into_dyn(),
    ];
    let result = model.infer(&inputs)?;

    assert_eq!(result.outputs.len(), 2);
    for (output, input) in result.outputs.iter().zip(&inputs) {
        assert_eq!(output.shape(), input.shape());
        let input = input.view().into_dimensionality::<ndarray::Ix4>()?;
        assert_eq!(output.view(), input);
    }
    assert!(result.latency_ms >= 0.0);
    Ok(())
}

#[test]
fn dropping_model_frees_context_once() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 1, 2, 2)], vec![]);
    let state = backend.state.clone();
    let model = Model::with_backend(Box::new(backend))?;
    assert_eq!(state.lock().unwrap().freed, 0);

    drop(model);
    let state = state.lock().unwrap();
    assert_eq!(state.created, 1);
    assert_eq!(state.freed, 1);
    Ok(())
}

#[test]
fn impossible_slot_count_fails_and_releases_context() -> Result<()> {
    let backend = MockBackend::new(vec![], vec![]);
    let state = backend.state.clone();
    state.lock().unwrap().counts = Some((33, 1));

    let err = Model::with_backend(Box::new(backend))
        .err()
        .context("33 input slots should be rejected")?;
    assert!(matches!(err, AneError::Native(_)));
    assert_eq!(state.lock().unwrap().freed, 1);
    Ok(())
}

#[test]
fn oversized_descriptor_fails_and_releases_context() -> Result<()> {
    let backend = MockBackend::new(vec![], vec![[1 << 40, 1 << 20, 1, 1, 1 << 10, 2]]);
    let state = backend.state.clone();

    let err = Model::with_backend(Box::new(backend))
        .err()
        .context("an output tile larger than usize should be rejected")?;
    assert!(matches!(err, AneError::Native(_)), "got {err}");
    assert_eq!(state.lock().unwrap().freed, 1);
    Ok(())
}

#[test]
fn summary_lists_every_slot() -> Result<()> {
    let backend = MockBackend::new(vec![dense(1, 3, 8, 8)], vec![[1, 16, 2, 2, 128, 64]]);
    let model = Model::with_backend(Box::new(backend))?;

    let summary = model.summary();
    assert!(summary.library.is_none());
    assert_eq!(summary.inputs.len(), 1);
    assert_eq!(summary.outputs[0].shape, [1, 16, 2, 2]);
    assert_eq!(summary.outputs[0].tile_size, TILE_ALIGN);

    let json = serde_json::to_value(&summary)?;
    assert_eq!(json["dst_count"], 1);
    assert_eq!(json["outputs"][0]["nchw"]["p"], 128);
    Ok(())
}
