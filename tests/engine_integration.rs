use std::cell::RefCell;
use std::rc::Rc;

use cola_rs::{
    ArraySink, CallbackSink, ColaConfig, ColaEngine, ColaError, SegmentationPlan, WindowKind,
};
use ndarray::{Array2, ArrayD, ArrayViewD, Axis, IxDyn, Slice};

fn ones(shape: &[usize]) -> ArrayD<f64> {
    ArrayD::from_elem(IxDyn(shape), 1.0)
}

fn identity(spans: Vec<ArrayD<f64>>) -> Vec<ArrayD<f64>> {
    spans
}

/// Deterministic non-constant test signal, channels x time.
fn wavy_signal(n_channels: usize, n_total: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_channels, n_total), |(c, t)| {
        (0.3 * t as f64 + c as f64).sin() + 0.1 * c as f64
    })
}

/// Stream `signal` through an identity engine in feeds of the given sizes
/// and return the reconstruction.
fn reconstruct(config: ColaConfig, signal: &Array2<f64>, chunk_sizes: &[usize]) -> ArrayD<f64> {
    let (n_channels, n_total) = signal.dim();
    assert_eq!(chunk_sizes.iter().sum::<usize>(), n_total);

    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[n_channels, n_total]))]).unwrap();
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();
    let mut fed = 0;
    for &size in chunk_sizes {
        let chunk = signal.slice_axis(Axis(1), Slice::from(fed..fed + size));
        engine.feed(&[chunk.into_dyn()]).unwrap();
        fed += size;
    }
    assert!(engine.is_complete());
    assert_eq!(engine.sink().position(), n_total);
    engine.into_sink().into_arrays().remove(0)
}

#[test]
fn test_plan_matches_expected_layout() {
    let plan = SegmentationPlan::new(27, 10, 5).unwrap();
    assert_eq!(plan.segments(), vec![(0, 10), (5, 15), (10, 20), (15, 27)]);
}

#[test]
fn test_triangular_identity_reconstruction() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let signal = Array2::ones((2, 27));
    let out = reconstruct(config, &signal, &[27]);
    for value in out.iter() {
        assert!((value - 1.0).abs() < 1e-10);
    }
}

#[test]
fn test_hann_identity_reconstruction() {
    let config = ColaConfig::new(256, 128, 1000);
    let signal = Array2::from_elem((3, 1000), 0.75);
    let out = reconstruct(config, &signal, &[100; 10]);
    for value in out.iter() {
        assert!((value - 0.75).abs() < 1e-10);
    }
}

#[test]
fn test_chunk_size_invariance_is_bit_exact() {
    let signal = wavy_signal(2, 27);
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);

    let reference = reconstruct(config.clone(), &signal, &[27]);
    let partitions: &[&[usize]] = &[
        &[1; 27],
        &[5, 5, 5, 5, 7],
        &[3, 10, 14],
        &[26, 1],
        &[9, 9, 9],
    ];
    for partition in partitions {
        let out = reconstruct(config.clone(), &signal, partition);
        for (a, b) in out.iter().zip(reference.iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "partition {:?}", partition);
        }
    }
}

#[test]
fn test_total_flushed_matches_n_total() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let flushes: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let flushes_in = Rc::clone(&flushes);
    let sink = CallbackSink::new(move |chunks: &[ArrayViewD<'_, f64>]| {
        flushes_in
            .borrow_mut()
            .push(chunks[0].shape()[chunks[0].ndim() - 1]);
    });
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();
    for _ in 0..9 {
        engine.feed(&[ones(&[1, 3]).view()]).unwrap();
    }
    assert!(engine.is_complete());
    // One flush per processed window, in temporal order, and the final
    // flush carries the absorbed remainder.
    assert_eq!(*flushes.borrow(), vec![5, 5, 5, 12]);
    assert_eq!(flushes.borrow().iter().sum::<usize>(), 27);
}

#[test]
fn test_overfeed_is_rejected_and_flushed_output_kept() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[1, 27]))]).unwrap();
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();

    engine.feed(&[ones(&[1, 20]).view()]).unwrap();
    let flushed_before = engine.sink().position();
    assert_eq!(flushed_before, 15);

    let err = engine.feed(&[ones(&[1, 10]).view()]).unwrap_err();
    assert!(matches!(err, ColaError::Bounds(_)));
    assert_eq!(engine.sink().position(), flushed_before);
}

#[test]
fn test_leading_shape_change_rejected() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[2, 27]))]).unwrap();
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();

    engine.feed(&[ones(&[2, 5]).view()]).unwrap();
    let err = engine.feed(&[ones(&[3, 5]).view()]).unwrap_err();
    assert!(matches!(err, ColaError::ShapeMismatch(_)));
}

#[test]
fn test_stream_count_change_rejected() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[2, 27]))]).unwrap();
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();

    engine.feed(&[ones(&[2, 5]).view()]).unwrap();
    let err = engine
        .feed(&[ones(&[2, 5]).view(), ones(&[2, 5]).view()])
        .unwrap_err();
    assert!(matches!(err, ColaError::ShapeMismatch(_)));
}

#[test]
fn test_construction_rejects_invalid_config() {
    let sink = || ArraySink::new(vec![ArrayD::zeros(IxDyn(&[1, 27]))]).unwrap();

    let err = ColaEngine::new(ColaConfig::new(0, 0, 27), identity, sink()).unwrap_err();
    assert!(matches!(err, ColaError::Configuration(_)));

    let err = ColaEngine::new(ColaConfig::new(10, 10, 27), identity, sink()).unwrap_err();
    assert!(matches!(err, ColaError::Configuration(_)));

    let err = ColaEngine::new(ColaConfig::new(10, 5, 9), identity, sink()).unwrap_err();
    assert!(matches!(err, ColaError::Configuration(_)));
}

#[test]
fn test_uneven_window_step_rejected_at_construction() {
    // A triangular window with step 7 has uneven step-bin sums.
    let config = ColaConfig::new(10, 3, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[1, 27]))]).unwrap();
    let err = ColaEngine::new(config, identity, sink).unwrap_err();
    assert!(matches!(err, ColaError::Validation(_)));
}

#[test]
fn test_custom_window_reconstruction() {
    let config = ColaConfig::new(8, 4, 24).with_window(WindowKind::Custom(vec![0.5; 8]));
    let signal = wavy_signal(1, 24);
    let out = reconstruct(config, &signal, &[10, 10, 4]);
    for (got, want) in out.iter().zip(signal.iter()) {
        assert!((got - want).abs() < 1e-10);
    }
}

#[test]
fn test_two_streams_one_output() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::new(vec![ArrayD::zeros(IxDyn(&[1, 27]))]).unwrap();
    let sum_streams = |mut spans: Vec<ArrayD<f64>>| {
        let second = spans.pop().unwrap();
        let mut first = spans.pop().unwrap();
        first += &second;
        vec![first]
    };
    let mut engine = ColaEngine::new(config, sum_streams, sink).unwrap();

    for _ in 0..3 {
        let a = ones(&[1, 9]);
        let b = ArrayD::from_elem(IxDyn(&[1, 9]), 2.0);
        engine.feed(&[a.view(), b.view()]).unwrap();
    }
    assert!(engine.is_complete());

    let out = engine.into_sink().into_arrays().remove(0);
    for value in out.iter() {
        assert!((value - 3.0).abs() < 1e-10);
    }
}

#[test]
fn test_channel_picks_applied_on_every_write() {
    let config = ColaConfig::new(10, 5, 27).with_window(WindowKind::Triangular);
    let sink = ArraySink::with_picks(vec![ArrayD::zeros(IxDyn(&[4, 27]))], vec![0, 2]).unwrap();
    let mut engine = ColaEngine::new(config, identity, sink).unwrap();
    engine.feed(&[ones(&[2, 27]).view()]).unwrap();
    assert!(engine.is_complete());

    let out = engine.into_sink().into_arrays().remove(0);
    for t in 0..27 {
        assert!((out[[0, t]] - 1.0).abs() < 1e-10);
        assert_eq!(out[[1, t]], 0.0);
        assert!((out[[2, t]] - 1.0).abs() < 1e-10);
        assert_eq!(out[[3, t]], 0.0);
    }
}

#[test]
fn test_single_sample_feeds_match_reference() {
    let signal = wavy_signal(1, 40);
    let config = ColaConfig::new(16, 8, 40);

    let reference = reconstruct(config.clone(), &signal, &[40]);
    let trickled = reconstruct(config, &signal, &[1; 40]);
    for (a, b) in trickled.iter().zip(reference.iter()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
